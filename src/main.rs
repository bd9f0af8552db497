//! Grubana map service

use chrono::Utc;
use tokio::signal;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use grubana_map::{
    aggregator::{PingQuota, QuotaDecision},
    config::AppConfig,
    database::{ApplicationUpdate, Database},
    errors::GrubanaError,
    events::{Notification, Recipient},
    map::{FeedRecord, MapQuery, MapState},
    models::{Ping, VendorApplication},
    mqtt::{MqttClient, MqttClientBuilder},
    visibility::VisibilityPolicy,
};

#[tokio::main]
async fn main() -> Result<(), GrubanaError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    #[cfg(feature = "dotenvy")]
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = AppConfig::load()?;
    config.validate()?;

    let database = Database::from_config(&config.database).await?;
    let state = database.load_state(Utc::now()).await?;

    let mqtt_client = MqttClientBuilder::new(&config.mqtt)?
        .connect(&config.mqtt.topics)
        .await?;

    let service = MapService {
        client: mqtt_client,
        database,
        state,
        policy: config.map.visibility_policy()?,
        quota: config.map.ping_quota()?,
        view_topic: config.mqtt.view_topic.clone(),
        notification_topic: config.mqtt.notification_topic.clone(),
    };
    if service.policy.debug_show_all {
        warn!("debug_show_all is enabled, every truck will be published");
    }

    let shutdown_signal = signal::ctrl_c();

    tokio::select! {
        result = service.run(config.map.publish_interval) => {
            info!("Map service completed: {:?}", result);
        }
        _ = shutdown_signal => {
            info!("Received shutdown signal");
        }
    }

    Ok(())
}

struct MapService {
    client: MqttClient,
    database: Database,
    state: MapState,
    policy: VisibilityPolicy,
    quota: PingQuota,
    view_topic: String,
    notification_topic: String,
}

impl MapService {
    async fn run(mut self, publish_interval: std::time::Duration) -> Result<(), GrubanaError> {
        let mut tick = interval(publish_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                message = self.client.recv() => {
                    match message {
                        Ok(Some(record)) => {
                            let collection = record.collection();
                            if let Err(e) = self.handle_record(record).await {
                                error!("Failed to process {} record: {}", collection, e);
                            }
                        }
                        Ok(None) => break, // Channel closed
                        Err(e) => {
                            error!("MQTT receive error: {}", e);
                            break;
                        }
                    }
                }
                _ = tick.tick() => {
                    if let Err(e) = self.publish_view().await {
                        error!("Failed to publish map view: {}", e);
                    }
                }
            }
        }

        Ok(())
    }

    async fn handle_record(&mut self, record: FeedRecord) -> Result<(), GrubanaError> {
        match record {
            FeedRecord::Ping(ping) => self.submit_ping(ping).await,
            FeedRecord::Application(application) => self.receive_application(application).await,
            other => {
                self.database.process_record(&other).await?;
                self.state.apply(other);
                Ok(())
            }
        }
    }

    async fn submit_ping(&mut self, ping: Ping) -> Result<(), GrubanaError> {
        let decision = self
            .database
            .submit_ping(&ping, &self.quota, Utc::now())
            .await?;

        match &decision {
            QuotaDecision::Accepted { remaining } => {
                info!(
                    "Accepted ping {} from {} ({} left today)",
                    ping.ping_id, ping.user_id, remaining
                );
                self.state.apply(FeedRecord::Ping(ping));
            }
            QuotaDecision::Rejected { recent, .. } => {
                warn!(
                    "Rejected ping {} from {}: {} pings in window",
                    ping.ping_id,
                    ping.user_id,
                    recent.len()
                );
                let notice = Notification {
                    recipient: Recipient::User(ping.user_id.clone()),
                    subject: "Daily ping limit reached".to_string(),
                    body: decision.user_message().unwrap_or_default(),
                };
                self.client
                    .publish_json(&self.notification_topic, &notice)
                    .await?;
            }
        }
        Ok(())
    }

    async fn receive_application(
        &mut self,
        application: VendorApplication,
    ) -> Result<(), GrubanaError> {
        match self.database.record_application(&application).await {
            Ok(ApplicationUpdate::Created) => {}
            Ok(ApplicationUpdate::StatusChanged(updated)) => {
                debug!(
                    "Application {} from {} moved to {}",
                    updated.id, updated.business_name, updated.status
                );
                return Ok(());
            }
            Ok(ApplicationUpdate::Unchanged) => {
                debug!("Application {} already recorded", application.id);
                return Ok(());
            }
            Err(e @ GrubanaError::InvalidTransition { .. }) => {
                warn!("Ignoring update of application {}: {}", application.id, e);
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let event = match self.state.event(&application.event_id) {
            Some(event) => Some(event.clone()),
            None => self.database.get_event(&application.event_id).await?,
        };
        if event.is_none() {
            warn!(
                "Application {} refers to unknown event {}",
                application.id, application.event_id
            );
        }

        for notification in application.creation_notifications(event.as_ref()) {
            self.client
                .publish_json(&self.notification_topic, &notification)
                .await?;
        }
        info!(
            "Recorded application {} from {}",
            application.id, application.business_name
        );
        Ok(())
    }

    async fn publish_view(&mut self) -> Result<(), GrubanaError> {
        let now = Utc::now();
        self.state.evict_stale(now);
        let view = self.state.view(&self.policy, &MapQuery::at(now));
        debug!(
            "Publishing view: {} trucks, {} heat points",
            view.trucks.len(),
            view.heat_map.len()
        );
        self.client.publish_json(&self.view_topic, &view).await
    }
}
