//! MQTT feed client
//!
//! Records arrive on `grubana/{collection}/{id}` with the stored document as
//! JSON payload. Map views and notifications are published back on the
//! configured output topics.

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use serde::Serialize;

use crate::{
    config::MqttConfig,
    errors::GrubanaError,
    map::FeedRecord,
    models::{RawDemandPin, RawEvent, RawPing, RawTruckLocation, VendorApplication},
};

/// Topic namespace of the realtime feed
pub const TOPIC_ROOT: &str = "grubana";

/// MQTT client for the realtime feed
pub struct MqttClientBuilder {
    client: AsyncClient,
    event_loop: EventLoop,
    tx: mpsc::Sender<Result<FeedRecord, GrubanaError>>,
    rx: mpsc::Receiver<Result<FeedRecord, GrubanaError>>,
}

pub struct MqttClient {
    client: AsyncClient,
    rx: mpsc::Receiver<Result<FeedRecord, GrubanaError>>,
    _handle: tokio::task::JoinHandle<Result<(), GrubanaError>>,
}

impl MqttClientBuilder {
    /// Create a new MQTT client
    pub fn new(config: &MqttConfig) -> Result<Self, GrubanaError> {
        config.validate()?;

        let mut mqtt_options = MqttOptions::new(&config.client_id, &config.uri, config.port);

        mqtt_options.set_transport(Transport::wss_with_default_config());
        mqtt_options.set_keep_alive(Duration::from_secs(5));
        mqtt_options.set_max_packet_size(1024 * 1024, 1024 * 1024);

        let (client, event_loop) = AsyncClient::new(mqtt_options, 100);

        let (tx, rx) = mpsc::channel(100);

        Ok(Self {
            client,
            event_loop,
            tx,
            rx,
        })
    }

    /// Connect to MQTT broker and subscribe to topics
    ///
    /// Subscriptions are (re-)established in the event loop on every ConnAck.
    pub async fn connect(self, topics: &[String]) -> Result<MqttClient, GrubanaError> {
        let topics = topics.to_vec();

        let _handle = tokio::spawn(Self::process_events(
            self.tx,
            self.event_loop,
            self.client.clone(),
            topics,
        ));

        Ok(MqttClient {
            client: self.client,
            rx: self.rx,
            _handle,
        })
    }

    async fn subscribe(client: AsyncClient, topics: &[String]) -> Result<(), GrubanaError> {
        for topic in topics.iter() {
            info!("Subscribing to topic: {}", topic);
            client.subscribe(topic, QoS::AtLeastOnce).await?;
        }
        Ok(())
    }

    /// Process MQTT events
    ///
    /// `rumqttc` reconnects on its own but drops subscriptions, so they are
    /// renewed here. A failed subscription ends the loop with an error.
    async fn process_events(
        tx: mpsc::Sender<Result<FeedRecord, GrubanaError>>,
        mut event_loop: EventLoop,
        client: AsyncClient,
        topics: Vec<String>,
    ) -> Result<(), GrubanaError> {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to MQTT broker, subscribing to topics");
                    if let Err(e) = Self::subscribe(client.clone(), &topics).await {
                        error!("Failed to subscribe: {}", e);
                        break Err(e);
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match parse_message(&publish.topic, &publish.payload) {
                        Ok(record) => {
                            if let Err(e) = tx.send(Ok(record)).await {
                                error!("Failed to send message: {}", e);
                            }
                        }
                        Err(e) => {
                            warn!("Failed to parse message on {}: {}", publish.topic, e);
                        }
                    }
                }
                Err(e) => {
                    error!("MQTT Error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
                _ => continue,
            }
        }
    }
}

/// Parse an incoming message based on its topic
pub fn parse_message(topic: &str, payload: &[u8]) -> Result<FeedRecord, GrubanaError> {
    let parts: Vec<&str> = topic.split('/').collect();

    if parts.len() != 3 || parts[0] != TOPIC_ROOT || parts[2].is_empty() {
        return Err(GrubanaError::InvalidTopic(topic.to_string()));
    }

    let id = parts[2];
    let malformed = |collection: &'static str| GrubanaError::MalformedRecord {
        collection,
        id: id.to_string(),
    };

    match parts[1] {
        "trucks" => {
            let raw: RawTruckLocation = serde_json::from_slice(payload)?;
            raw.normalize(id)
                .map(FeedRecord::Truck)
                .ok_or_else(|| malformed("trucks"))
        }
        "pings" => {
            let raw: RawPing = serde_json::from_slice(payload)?;
            raw.normalize(id)
                .map(FeedRecord::Ping)
                .ok_or_else(|| malformed("pings"))
        }
        "demandPins" => {
            let raw: RawDemandPin = serde_json::from_slice(payload)?;
            raw.normalize(id)
                .map(FeedRecord::DemandPin)
                .ok_or_else(|| malformed("demandPins"))
        }
        "events" => {
            let raw: RawEvent = serde_json::from_slice(payload)?;
            Ok(FeedRecord::Event(raw.normalize(id)))
        }
        "vendorApplications" => {
            let mut application: VendorApplication = serde_json::from_slice(payload)?;
            if application.id.is_empty() {
                application.id = id.to_string();
            }
            Ok(FeedRecord::Application(application))
        }
        other => Err(GrubanaError::UnknownCollection(other.to_string())),
    }
}

impl MqttClient {
    /// Receive next record
    pub async fn recv(&mut self) -> Result<Option<FeedRecord>, GrubanaError> {
        self.rx.recv().await.transpose()
    }

    /// Publish `value` as JSON on `topic`
    pub async fn publish_json<T: Serialize>(
        &self,
        topic: &str,
        value: &T,
    ) -> Result<(), GrubanaError> {
        let payload = serde_json::to_vec(value)?;
        debug!("Publishing {} bytes to {}", payload.len(), topic);
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use crate::geo::Coordinate;
    use crate::models::{ApplicationStatus, EventStatus, KitchenType, Ping, TruckLocation};

    use super::*;

    #[test]
    fn parse_truck_message() {
        let topic = "grubana/trucks/owner-42";
        let payload = r#"{
            "lat": 30.2672,
            "lng": -97.7431,
            "isLive": true,
            "visible": true,
            "lastActive": 1717243200000,
            "sessionStartTime": 1717236000000,
            "kitchenType": "cart",
            "truckName": "Brew Cart",
            "cuisine": "Cafe"
        }"#
        .as_bytes();

        let record = parse_message(topic, payload).unwrap();

        let expected = FeedRecord::Truck(TruckLocation {
            id: "owner-42".to_string(),
            coordinate: Coordinate {
                lat: 30.2672,
                lng: -97.7431,
            },
            is_live: true,
            visible: true,
            last_active: DateTime::from_timestamp_millis(1717243200000).unwrap(),
            session_start_time: DateTime::from_timestamp_millis(1717236000000).unwrap(),
            kitchen_type: KitchenType::Cart,
            truck_name: "Brew Cart".to_string(),
            cuisine: "Cafe".to_string(),
        });

        assert_eq!(record, expected);
    }

    #[test]
    fn parse_ping_message() {
        let topic = "grubana/pings/p-1";
        let payload = r#"{
            "userId": "cust-1",
            "username": "snacker",
            "location": {"latitude": 30.25, "longitude": -97.75},
            "cuisineType": "bbq",
            "timestamp": 1717243200000,
            "address": "100 Congress Ave"
        }"#
        .as_bytes();

        let record = parse_message(topic, payload).unwrap();

        let expected = FeedRecord::Ping(Ping {
            ping_id: "p-1".to_string(),
            user_id: "cust-1".to_string(),
            username: "snacker".to_string(),
            coordinate: Coordinate {
                lat: 30.25,
                lng: -97.75,
            },
            cuisine_type: "bbq".to_string(),
            timestamp: DateTime::from_timestamp_millis(1717243200000).unwrap(),
            address: Some("100 Congress Ave".to_string()),
        });

        assert_eq!(record, expected);
    }

    #[test]
    fn parse_event_and_application() {
        let event = parse_message(
            "grubana/events/e-9",
            br#"{"title":"Rally","status":"live","latitude":30.0,"longitude":-97.0}"#,
        )
        .unwrap();
        match event {
            FeedRecord::Event(e) => {
                assert_eq!(e.id, "e-9");
                assert_eq!(e.status, EventStatus::Live);
                assert!(e.is_visible_to_customers());
            }
            other => panic!("unexpected record {other:?}"),
        }

        let application = parse_message(
            "grubana/vendorApplications/a-1",
            br#"{"eventId":"e-9","businessName":"Tacos","contactEmail":"t@example.com"}"#,
        )
        .unwrap();
        match application {
            FeedRecord::Application(a) => {
                assert_eq!(a.id, "a-1");
                assert_eq!(a.status, ApplicationStatus::Pending);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_topics() {
        for topic in ["trucks/1", "other/trucks/1", "grubana/trucks/", "grubana/trucks/1/x"] {
            assert!(matches!(
                parse_message(topic, b"{}"),
                Err(GrubanaError::InvalidTopic(_))
            ));
        }
        assert!(matches!(
            parse_message("grubana/menus/1", b"{}"),
            Err(GrubanaError::UnknownCollection(_))
        ));
    }

    #[test]
    fn malformed_record_is_an_error() {
        let result = parse_message("grubana/pings/p-2", br#"{"lat":"x","lng":1.0}"#);
        assert!(matches!(
            result,
            Err(GrubanaError::MalformedRecord {
                collection: "pings",
                ..
            })
        ));
    }
}
