// src/database/models.rs
use chrono::{DateTime, Utc};

use crate::geo::Coordinate;
use crate::models::{
    ApplicationStatus, DemandPin, Event, EventStatus, KitchenType, Ping, TruckLocation,
    VendorApplication,
};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TruckRow {
    id: String,
    lat: f64,
    lng: f64,
    is_live: bool,
    visible: bool,
    last_active: DateTime<Utc>,
    session_start_time: DateTime<Utc>,
    kitchen_type: String,
    truck_name: String,
    cuisine: String,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PingRow {
    ping_id: String,
    user_id: String,
    username: String,
    lat: f64,
    lng: f64,
    cuisine_type: String,
    created_at: DateTime<Utc>,
    address: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct DemandPinRow {
    id: String,
    user_id: String,
    username: String,
    lat: f64,
    lng: f64,
    cuisine_request: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EventRow {
    id: String,
    title: String,
    lat: Option<f64>,
    lng: Option<f64>,
    status: String,
    organizer_id: String,
    start_date: Option<String>,
    start_time: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ApplicationRow {
    id: String,
    event_id: String,
    business_name: String,
    contact_email: String,
    equipment_type: Option<String>,
    status: String,
}

// Rows were validated on insert, so positions are stored as-is
impl From<TruckRow> for TruckLocation {
    fn from(row: TruckRow) -> Self {
        Self {
            id: row.id,
            coordinate: Coordinate {
                lat: row.lat,
                lng: row.lng,
            },
            is_live: row.is_live,
            visible: row.visible,
            last_active: row.last_active,
            session_start_time: row.session_start_time,
            kitchen_type: KitchenType::from(row.kitchen_type.as_str()),
            truck_name: row.truck_name,
            cuisine: row.cuisine,
        }
    }
}

impl From<PingRow> for Ping {
    fn from(row: PingRow) -> Self {
        Self {
            ping_id: row.ping_id,
            user_id: row.user_id,
            username: row.username,
            coordinate: Coordinate {
                lat: row.lat,
                lng: row.lng,
            },
            cuisine_type: row.cuisine_type,
            timestamp: row.created_at,
            address: row.address,
        }
    }
}

impl From<DemandPinRow> for DemandPin {
    fn from(row: DemandPinRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            username: row.username,
            coordinate: Coordinate {
                lat: row.lat,
                lng: row.lng,
            },
            cuisine_request: row.cuisine_request,
            timestamp: row.created_at,
        }
    }
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            coordinate: match (row.lat, row.lng) {
                (Some(lat), Some(lng)) => Coordinate::try_new(lat, lng),
                _ => None,
            },
            status: EventStatus::from(row.status.as_str()),
            organizer_id: row.organizer_id,
            date: row.start_date,
            time: row.start_time,
        }
    }
}

impl From<ApplicationRow> for VendorApplication {
    fn from(row: ApplicationRow) -> Self {
        Self {
            id: row.id,
            event_id: row.event_id,
            business_name: row.business_name,
            contact_email: row.contact_email,
            equipment_type: row.equipment_type,
            status: ApplicationStatus::from(row.status.as_str()),
        }
    }
}
