//! Data models.
//!
//! Each collection has a canonical record used by the map logic and a raw
//! record shaped like the documents the realtime store emits. Raw records are
//! lenient about field naming and number encoding; `normalize` turns them into
//! canonical records or drops them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampMilliSeconds};

use crate::cuisine::Cuisine;
use crate::geo::Coordinate;

/// Kind of mobile kitchen a vendor operates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KitchenType {
    #[default]
    Truck,
    Trailer,
    Cart,
    Popup,
}

impl KitchenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KitchenType::Truck => "truck",
            KitchenType::Trailer => "trailer",
            KitchenType::Cart => "cart",
            KitchenType::Popup => "popup",
        }
    }
}

impl From<&str> for KitchenType {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "trailer" => KitchenType::Trailer,
            "cart" => KitchenType::Cart,
            "popup" | "pop-up" => KitchenType::Popup,
            _ => KitchenType::Truck,
        }
    }
}

/// Live location of a vendor, keyed by the owner's user id.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TruckLocation {
    pub id: String,
    #[serde(flatten)]
    pub coordinate: Coordinate,
    pub is_live: bool,
    pub visible: bool,
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub last_active: DateTime<Utc>,
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub session_start_time: DateTime<Utc>,
    pub kitchen_type: KitchenType,
    pub truck_name: String,
    pub cuisine: String,
}

/// Customer food request
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ping {
    pub ping_id: String,
    pub user_id: String,
    pub username: String,
    #[serde(flatten)]
    pub coordinate: Coordinate,
    pub cuisine_type: String,
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub timestamp: DateTime<Utc>,
    pub address: Option<String>,
}

/// Map-dropped marker of unmet demand
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemandPin {
    pub id: String,
    pub user_id: String,
    pub username: String,
    #[serde(flatten)]
    pub coordinate: Coordinate,
    pub cuisine_request: String,
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Draft,
    Published,
    Upcoming,
    Active,
    Live,
    Completed,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "draft",
            EventStatus::Published => "published",
            EventStatus::Upcoming => "upcoming",
            EventStatus::Active => "active",
            EventStatus::Live => "live",
            EventStatus::Completed => "completed",
            EventStatus::Cancelled => "cancelled",
        }
    }
}

impl From<&str> for EventStatus {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "published" => EventStatus::Published,
            "upcoming" => EventStatus::Upcoming,
            "active" => EventStatus::Active,
            "live" => EventStatus::Live,
            "completed" => EventStatus::Completed,
            "cancelled" | "canceled" => EventStatus::Cancelled,
            _ => EventStatus::Draft,
        }
    }
}

/// Organizer-run event
///
/// `coordinate` is `None` when the stored position is missing or invalid;
/// such events are kept but never shown on the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    pub coordinate: Option<Coordinate>,
    pub status: EventStatus,
    pub organizer_id: String,
    pub date: Option<String>,
    pub time: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Waitlisted,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Waitlisted => "waitlisted",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ApplicationStatus {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "approved" => ApplicationStatus::Approved,
            "rejected" => ApplicationStatus::Rejected,
            "waitlisted" => ApplicationStatus::Waitlisted,
            _ => ApplicationStatus::Pending,
        }
    }
}

/// A vendor's application to serve at an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorApplication {
    #[serde(default)]
    pub id: String,
    pub event_id: String,
    pub business_name: String,
    pub contact_email: String,
    #[serde(default)]
    pub equipment_type: Option<String>,
    #[serde(default)]
    pub status: ApplicationStatus,
}

impl Cuisine for TruckLocation {
    fn cuisine_label(&self) -> &str {
        &self.cuisine
    }
}

impl Cuisine for Ping {
    fn cuisine_label(&self) -> &str {
        &self.cuisine_type
    }
}

impl Cuisine for DemandPin {
    fn cuisine_label(&self) -> &str {
        &self.cuisine_request
    }
}

/// Truck location document as stored
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTruckLocation {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(flatten)]
    pub position: RawPosition,
    #[serde(default)]
    pub is_live: bool,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub last_active: Option<RawTimestamp>,
    #[serde(default)]
    pub session_start_time: Option<RawTimestamp>,
    #[serde(default)]
    pub kitchen_type: Option<String>,
    #[serde(default)]
    pub truck_name: Option<String>,
    #[serde(default)]
    pub cuisine: Option<String>,
}

impl RawTruckLocation {
    /// Canonical record, or `None` when position or `lastActive` is unusable.
    ///
    /// `doc_id` is the document key, used when the payload has no `id`.
    pub fn normalize(self, doc_id: &str) -> Option<TruckLocation> {
        let coordinate = self.position.resolve()?;
        let last_active = self.last_active.as_ref().and_then(RawTimestamp::resolve)?;
        let session_start_time = self
            .session_start_time
            .as_ref()
            .and_then(RawTimestamp::resolve)
            .unwrap_or(last_active);

        Some(TruckLocation {
            id: non_empty_or(self.id, doc_id),
            coordinate,
            is_live: self.is_live,
            visible: self.visible,
            last_active,
            session_start_time,
            kitchen_type: self
                .kitchen_type
                .as_deref()
                .map(KitchenType::from)
                .unwrap_or_default(),
            truck_name: self.truck_name.unwrap_or_default(),
            cuisine: self.cuisine.unwrap_or_default(),
        })
    }
}

/// Ping document as stored
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPing {
    #[serde(default, alias = "id")]
    pub ping_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(flatten)]
    pub position: RawPosition,
    #[serde(default)]
    pub cuisine_type: Option<String>,
    #[serde(default, alias = "createdAt")]
    pub timestamp: Option<RawTimestamp>,
    #[serde(default)]
    pub address: Option<String>,
}

impl RawPing {
    pub fn normalize(self, doc_id: &str) -> Option<Ping> {
        let coordinate = self.position.resolve()?;
        let timestamp = self.timestamp.as_ref().and_then(RawTimestamp::resolve)?;

        Some(Ping {
            ping_id: non_empty_or(self.ping_id, doc_id),
            user_id: self.user_id.unwrap_or_default(),
            username: self.username.unwrap_or_default(),
            coordinate,
            cuisine_type: self.cuisine_type.unwrap_or_default(),
            timestamp,
            address: self.address,
        })
    }
}

/// Demand pin document as stored
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDemandPin {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(flatten)]
    pub position: RawPosition,
    #[serde(default)]
    pub cuisine_request: Option<String>,
    #[serde(default, alias = "createdAt")]
    pub timestamp: Option<RawTimestamp>,
}

impl RawDemandPin {
    pub fn normalize(self, doc_id: &str) -> Option<DemandPin> {
        let coordinate = self.position.resolve()?;
        let timestamp = self.timestamp.as_ref().and_then(RawTimestamp::resolve)?;

        Some(DemandPin {
            id: non_empty_or(self.id, doc_id),
            user_id: self.user_id.unwrap_or_default(),
            username: self.username.unwrap_or_default(),
            coordinate,
            cuisine_request: self.cuisine_request.unwrap_or_default(),
            timestamp,
        })
    }
}

/// Event document as stored
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(flatten)]
    pub position: RawPosition,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub organizer_id: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
}

impl RawEvent {
    /// Events are never dropped; an unusable position becomes `None`.
    pub fn normalize(self, doc_id: &str) -> Event {
        Event {
            id: non_empty_or(self.id, doc_id),
            title: self.title.unwrap_or_default(),
            coordinate: self.position.resolve(),
            status: self
                .status
                .as_deref()
                .map(EventStatus::from)
                .unwrap_or_default(),
            organizer_id: self.organizer_id.unwrap_or_default(),
            date: self.date,
            time: self.time,
        }
    }
}

fn non_empty_or(value: Option<String>, fallback: &str) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// Lenient field shapes found in stored documents
mod raw_helpers {
    use chrono::{DateTime, Utc};
    use serde::Deserialize;

    use crate::geo::Coordinate;

    /// A number that may have been stored as a string
    #[derive(Debug, Clone, PartialEq, Deserialize)]
    #[serde(untagged)]
    pub enum RawNumber {
        Number(f64),
        Text(String),
    }

    impl RawNumber {
        pub fn value(&self) -> Option<f64> {
            match self {
                RawNumber::Number(n) => Some(*n),
                RawNumber::Text(s) => s.trim().parse::<f64>().ok(),
            }
        }
    }

    /// Timestamp as epoch milliseconds, a store timestamp object or RFC 3339 text
    #[derive(Debug, Clone, PartialEq, Deserialize)]
    #[serde(untagged)]
    pub enum RawTimestamp {
        Millis(f64),
        Store {
            #[serde(alias = "_seconds")]
            seconds: i64,
            #[serde(default, alias = "_nanoseconds")]
            nanoseconds: u32,
        },
        Text(String),
    }

    impl RawTimestamp {
        pub fn resolve(&self) -> Option<DateTime<Utc>> {
            match self {
                RawTimestamp::Millis(ms) if ms.is_finite() => {
                    DateTime::from_timestamp_millis(*ms as i64)
                }
                RawTimestamp::Millis(_) => None,
                RawTimestamp::Store {
                    seconds,
                    nanoseconds,
                } => DateTime::from_timestamp(*seconds, *nanoseconds),
                RawTimestamp::Text(s) => {
                    let s = s.trim();
                    DateTime::parse_from_rfc3339(s)
                        .map(|dt| dt.with_timezone(&Utc))
                        .ok()
                        .or_else(|| s.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis))
                }
            }
        }
    }

    /// Nested `location` object
    #[derive(Debug, Clone, Default, PartialEq, Deserialize)]
    pub struct RawLatLng {
        #[serde(default, alias = "latitude", alias = "_latitude")]
        pub lat: Option<RawNumber>,
        #[serde(default, alias = "longitude", alias = "_longitude")]
        pub lng: Option<RawNumber>,
    }

    impl RawLatLng {
        fn resolve(&self) -> Option<Coordinate> {
            let lat = self.lat.as_ref()?.value()?;
            let lng = self.lng.as_ref()?.value()?;
            Coordinate::try_new(lat, lng)
        }
    }

    /// Position fields of a document, in any of the accepted namings
    #[derive(Debug, Clone, Default, PartialEq, Deserialize)]
    pub struct RawPosition {
        #[serde(default, alias = "latitude")]
        pub lat: Option<RawNumber>,
        #[serde(default, alias = "longitude")]
        pub lng: Option<RawNumber>,
        #[serde(default)]
        pub location: Option<RawLatLng>,
    }

    impl RawPosition {
        /// Top-level fields win over the nested `location` object.
        pub fn resolve(&self) -> Option<Coordinate> {
            let top = RawLatLng {
                lat: self.lat.clone(),
                lng: self.lng.clone(),
            };
            top.resolve()
                .or_else(|| self.location.as_ref().and_then(RawLatLng::resolve))
        }
    }
}

pub use raw_helpers::{RawLatLng, RawNumber, RawPosition, RawTimestamp};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parse_truck_location() {
        let s = r#"{
            "lat": 29.7604,
            "lng": -95.3698,
            "isLive": true,
            "visible": true,
            "lastActive": 1734361116000,
            "kitchenType": "trailer",
            "truckName": "Smoke Signals",
            "cuisine": "BBQ"
        }"#;
        let raw: RawTruckLocation = serde_json::from_str(s).unwrap();
        let truck = raw.normalize("owner-1").unwrap();
        let last_active = Utc.timestamp_millis_opt(1734361116000).unwrap();

        let expected = TruckLocation {
            id: "owner-1".to_string(),
            coordinate: Coordinate {
                lat: 29.7604,
                lng: -95.3698,
            },
            is_live: true,
            visible: true,
            last_active,
            session_start_time: last_active,
            kitchen_type: KitchenType::Trailer,
            truck_name: "Smoke Signals".to_string(),
            cuisine: "BBQ".to_string(),
        };
        assert_eq!(truck, expected);
    }

    #[test]
    fn truck_without_last_active_is_dropped() {
        let raw: RawTruckLocation =
            serde_json::from_str(r#"{"lat": 1.0, "lng": 2.0, "visible": true}"#).unwrap();
        assert!(raw.normalize("owner-1").is_none());
    }

    #[test]
    fn ping_field_namings_resolve_alike() {
        let flat = r#"{"userId":"u1","lat":30.1,"lng":-97.2,"cuisineType":"tacos","timestamp":1734361116000}"#;
        let long = r#"{"userId":"u1","latitude":"30.1","longitude":"-97.2","cuisineType":"tacos","timestamp":{"seconds":1734361116,"nanoseconds":0}}"#;
        let nested = r#"{"userId":"u1","location":{"lat":30.1,"lng":-97.2},"cuisineType":"tacos","timestamp":"2024-12-16T14:58:36Z"}"#;

        let pings: Vec<Ping> = [flat, long, nested]
            .iter()
            .map(|s| {
                serde_json::from_str::<RawPing>(s)
                    .unwrap()
                    .normalize("p1")
                    .unwrap()
            })
            .collect();

        assert_eq!(pings[0], pings[1]);
        assert_eq!(pings[1], pings[2]);
        assert_eq!(pings[0].ping_id, "p1");
        assert_eq!(pings[0].timestamp.timestamp(), 1734361116);
    }

    #[test]
    fn ping_with_bad_coordinates_or_timestamp_is_dropped() {
        let bad_lat = r#"{"lat":"north","lng":-97.2,"timestamp":1734361116000}"#;
        let no_ts = r#"{"lat":30.1,"lng":-97.2}"#;
        let bad_ts = r#"{"lat":30.1,"lng":-97.2,"timestamp":"yesterday"}"#;

        for s in [bad_lat, no_ts, bad_ts] {
            let raw: RawPing = serde_json::from_str(s).unwrap();
            assert!(raw.normalize("p").is_none(), "kept {s}");
        }
    }

    #[test]
    fn demand_pin_uses_long_names() {
        let s = r#"{
            "id": "pin-9",
            "userId": "u2",
            "username": "hungry",
            "latitude": 30.27,
            "longitude": -97.74,
            "cuisineRequest": "Ramen please",
            "timestamp": {"_seconds": 1734361116, "_nanoseconds": 500000000}
        }"#;
        let pin = serde_json::from_str::<RawDemandPin>(s)
            .unwrap()
            .normalize("ignored")
            .unwrap();
        assert_eq!(pin.id, "pin-9");
        assert_eq!(pin.coordinate, Coordinate { lat: 30.27, lng: -97.74 });
        assert_eq!(pin.timestamp.timestamp_millis(), 1734361116500);
    }

    #[test]
    fn event_keeps_invalid_coordinates_as_none() {
        let s = r#"{"title":"Truck Rally","status":"Published","organizerId":"org","latitude":null}"#;
        let event = serde_json::from_str::<RawEvent>(s).unwrap().normalize("e1");
        assert_eq!(event.id, "e1");
        assert_eq!(event.status, EventStatus::Published);
        assert!(event.coordinate.is_none());
    }

    #[test]
    fn enums_from_loose_strings() {
        assert_eq!(KitchenType::from("Pop-Up"), KitchenType::Popup);
        assert_eq!(KitchenType::from("spaceship"), KitchenType::Truck);
        assert_eq!(EventStatus::from("canceled"), EventStatus::Cancelled);
        assert_eq!(ApplicationStatus::from("WAITLISTED"), ApplicationStatus::Waitlisted);
    }

    #[test]
    fn truck_serializes_with_millis() {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let truck = TruckLocation {
            id: "t".to_string(),
            coordinate: Coordinate { lat: 1.0, lng: 2.0 },
            is_live: true,
            visible: true,
            last_active: ts,
            session_start_time: ts,
            kitchen_type: KitchenType::Cart,
            truck_name: "Cart".to_string(),
            cuisine: "coffee".to_string(),
        };
        let json = serde_json::to_value(&truck).unwrap();
        assert_eq!(json["lastActive"], 1_700_000_000_000i64);
        assert_eq!(json["lat"], 1.0);
        assert_eq!(json["kitchenType"], "cart");
    }
}
