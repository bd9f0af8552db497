// src/database.rs
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use tracing::{debug, info};

use crate::{
    aggregator::{PingQuota, QuotaDecision, RELEVANCE_WINDOW},
    config::DatabaseConfig,
    errors::GrubanaError,
    map::{FeedRecord, MapState},
    models::{ApplicationStatus, DemandPin, Event, Ping, TruckLocation, VendorApplication},
};

mod models;

use models::{ApplicationRow, DemandPinRow, EventRow, PingRow, TruckRow};

/// What storing a vendor application record changed
#[derive(Debug, Clone, PartialEq)]
pub enum ApplicationUpdate {
    Created,
    StatusChanged(VendorApplication),
    Unchanged,
}

/// Postgres store for map records
#[derive(Clone)]
pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    /// Wrap an existing pool and run pending migrations
    pub async fn new(pool: Pool<Postgres>) -> Result<Self, GrubanaError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn from_config(config: &DatabaseConfig) -> Result<Self, GrubanaError> {
        config.validate()?;
        info!(
            "Connecting to database with {} connections",
            config.max_connections
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        Self::new(pool).await
    }

    /// Persist a feed record
    ///
    /// Pings are stored without a quota check here; customer submissions go
    /// through [`Self::submit_ping`]. Returns false when a ping was already
    /// stored, or a vendor application record changed nothing.
    pub async fn process_record(&self, record: &FeedRecord) -> Result<bool, GrubanaError> {
        match record {
            FeedRecord::Truck(truck) => self.upsert_truck(truck).await.map(|_| true),
            FeedRecord::Ping(ping) => self.insert_ping(ping).await,
            FeedRecord::DemandPin(pin) => self.upsert_demand_pin(pin).await.map(|_| true),
            FeedRecord::Event(event) => self.upsert_event(event).await.map(|_| true),
            FeedRecord::Application(application) => self
                .record_application(application)
                .await
                .map(|update| update != ApplicationUpdate::Unchanged),
        }
    }

    /// Insert or update a truck location. Trucks are never deleted.
    pub async fn upsert_truck(&self, truck: &TruckLocation) -> Result<(), GrubanaError> {
        sqlx::query(
            "INSERT INTO truck_locations (
                id, lat, lng, is_live, visible, last_active,
                session_start_time, kitchen_type, truck_name, cuisine
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                lat = EXCLUDED.lat,
                lng = EXCLUDED.lng,
                is_live = EXCLUDED.is_live,
                visible = EXCLUDED.visible,
                last_active = EXCLUDED.last_active,
                session_start_time = EXCLUDED.session_start_time,
                kitchen_type = EXCLUDED.kitchen_type,
                truck_name = EXCLUDED.truck_name,
                cuisine = EXCLUDED.cuisine",
        )
        .bind(&truck.id)
        .bind(truck.coordinate.lat)
        .bind(truck.coordinate.lng)
        .bind(truck.is_live)
        .bind(truck.visible)
        .bind(truck.last_active)
        .bind(truck.session_start_time)
        .bind(truck.kitchen_type.as_str())
        .bind(&truck.truck_name)
        .bind(&truck.cuisine)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a ping without a quota check. Returns false if it already existed.
    async fn insert_ping(&self, ping: &Ping) -> Result<bool, GrubanaError> {
        let result = Self::insert_ping_query(ping).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    fn insert_ping_query(
        ping: &Ping,
    ) -> sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments> {
        sqlx::query(
            "INSERT INTO pings (
                ping_id, user_id, username, lat, lng, cuisine_type, created_at, address
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (ping_id) DO NOTHING",
        )
        .bind(&ping.ping_id)
        .bind(&ping.user_id)
        .bind(&ping.username)
        .bind(ping.coordinate.lat)
        .bind(ping.coordinate.lng)
        .bind(&ping.cuisine_type)
        .bind(ping.timestamp)
        .bind(&ping.address)
    }

    /// Store a ping if the sender is within `quota`.
    ///
    /// Check and insert run in one transaction holding a per-user advisory
    /// lock, so concurrent submissions from one user cannot both pass. A ping
    /// already stored under the same id is not counted against itself.
    pub async fn submit_ping(
        &self,
        ping: &Ping,
        quota: &PingQuota,
        now: DateTime<Utc>,
    ) -> Result<QuotaDecision, GrubanaError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&ping.user_id)
            .execute(&mut *tx)
            .await?;

        let history: Vec<Ping> = sqlx::query_as::<_, PingRow>(
            "SELECT ping_id, user_id, username, lat, lng, cuisine_type, created_at, address
            FROM pings
            WHERE user_id = $1 AND created_at >= $2 AND ping_id <> $3
            ORDER BY created_at",
        )
        .bind(&ping.user_id)
        .bind(now - quota.window)
        .bind(&ping.ping_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(Ping::from)
        .collect();

        let decision = quota.check(&history, &ping.user_id, now);
        if decision.is_accepted() {
            Self::insert_ping_query(ping).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        debug!(
            "Ping {} from {}: accepted={}",
            ping.ping_id,
            ping.user_id,
            decision.is_accepted()
        );
        Ok(decision)
    }

    pub async fn upsert_demand_pin(&self, pin: &DemandPin) -> Result<(), GrubanaError> {
        sqlx::query(
            "INSERT INTO demand_pins (
                id, user_id, username, lat, lng, cuisine_request, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                lat = EXCLUDED.lat,
                lng = EXCLUDED.lng,
                cuisine_request = EXCLUDED.cuisine_request,
                created_at = EXCLUDED.created_at",
        )
        .bind(&pin.id)
        .bind(&pin.user_id)
        .bind(&pin.username)
        .bind(pin.coordinate.lat)
        .bind(pin.coordinate.lng)
        .bind(&pin.cuisine_request)
        .bind(pin.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn upsert_event(&self, event: &Event) -> Result<(), GrubanaError> {
        sqlx::query(
            "INSERT INTO events (
                id, title, lat, lng, status, organizer_id, start_date, start_time
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                lat = EXCLUDED.lat,
                lng = EXCLUDED.lng,
                status = EXCLUDED.status,
                organizer_id = EXCLUDED.organizer_id,
                start_date = EXCLUDED.start_date,
                start_time = EXCLUDED.start_time",
        )
        .bind(&event.id)
        .bind(&event.title)
        .bind(event.coordinate.map(|c| c.lat))
        .bind(event.coordinate.map(|c| c.lng))
        .bind(event.status.as_str())
        .bind(&event.organizer_id)
        .bind(&event.date)
        .bind(&event.time)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a new application. Returns false if the id is already known.
    pub async fn create_application(
        &self,
        application: &VendorApplication,
    ) -> Result<bool, GrubanaError> {
        let result = sqlx::query(
            "INSERT INTO vendor_applications (
                id, event_id, business_name, contact_email, equipment_type, status
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING",
        )
        .bind(&application.id)
        .bind(&application.event_id)
        .bind(&application.business_name)
        .bind(&application.contact_email)
        .bind(&application.equipment_type)
        .bind(ApplicationStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Store an application record from the feed.
    ///
    /// An unknown id creates a pending application. For a known id a
    /// non-pending status is an organizer decision and goes through
    /// [`Self::update_application_status`]; pending records are redeliveries.
    pub async fn record_application(
        &self,
        application: &VendorApplication,
    ) -> Result<ApplicationUpdate, GrubanaError> {
        if self.create_application(application).await? {
            return Ok(ApplicationUpdate::Created);
        }
        if application.status == ApplicationStatus::Pending {
            return Ok(ApplicationUpdate::Unchanged);
        }

        let (updated, changed) = self
            .transition_application(&application.id, application.status)
            .await?;
        Ok(if changed {
            ApplicationUpdate::StatusChanged(updated)
        } else {
            ApplicationUpdate::Unchanged
        })
    }

    /// Apply an organizer decision, rejecting illegal transitions.
    ///
    /// Setting the status an application already has is a no-op.
    pub async fn update_application_status(
        &self,
        id: &str,
        next: ApplicationStatus,
    ) -> Result<VendorApplication, GrubanaError> {
        self.transition_application(id, next)
            .await
            .map(|(application, _)| application)
    }

    async fn transition_application(
        &self,
        id: &str,
        next: ApplicationStatus,
    ) -> Result<(VendorApplication, bool), GrubanaError> {
        let mut tx = self.pool.begin().await?;

        let mut application: VendorApplication = sqlx::query_as::<_, ApplicationRow>(
            "SELECT id, event_id, business_name, contact_email, equipment_type, status
            FROM vendor_applications WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?
        .into();

        if application.status == next {
            tx.commit().await?;
            return Ok((application, false));
        }
        application.transition(next)?;

        sqlx::query("UPDATE vendor_applications SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(next.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Application {} is now {}", id, next);
        Ok((application, true))
    }

    pub async fn get_event(&self, id: &str) -> Result<Option<Event>, GrubanaError> {
        let row = sqlx::query_as::<_, EventRow>(
            "SELECT id, title, lat, lng, status, organizer_id, start_date, start_time
            FROM events WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Event::from))
    }

    /// Rebuild the map snapshot from stored records relevant at `now`
    pub async fn load_state(&self, now: DateTime<Utc>) -> Result<MapState, GrubanaError> {
        let since = now - RELEVANCE_WINDOW;
        let mut state = MapState::new();

        let trucks = sqlx::query_as::<_, TruckRow>(
            "SELECT id, lat, lng, is_live, visible, last_active, session_start_time,
                kitchen_type, truck_name, cuisine
            FROM truck_locations",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in trucks {
            state.apply(FeedRecord::Truck(row.into()));
        }

        let pings = sqlx::query_as::<_, PingRow>(
            "SELECT ping_id, user_id, username, lat, lng, cuisine_type, created_at, address
            FROM pings WHERE created_at > $1",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        for row in pings {
            state.apply(FeedRecord::Ping(row.into()));
        }

        let pins = sqlx::query_as::<_, DemandPinRow>(
            "SELECT id, user_id, username, lat, lng, cuisine_request, created_at
            FROM demand_pins WHERE created_at > $1",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        for row in pins {
            state.apply(FeedRecord::DemandPin(row.into()));
        }

        let events = sqlx::query_as::<_, EventRow>(
            "SELECT id, title, lat, lng, status, organizer_id, start_date, start_time
            FROM events",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in events {
            state.apply(FeedRecord::Event(row.into()));
        }

        info!("Loaded map state from database");
        Ok(state)
    }
}
