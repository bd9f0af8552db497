//! Errors for the Grubana map service
use thiserror::Error;

use crate::models::ApplicationStatus;

#[derive(Error, Debug)]
pub enum GrubanaError {
    #[error("MQTT connection failed")]
    MqttConnectionError(#[from] rumqttc::ConnectionError),

    #[error("MQTT client error")]
    MqttClientError(#[from] rumqttc::ClientError),

    #[error("Serialization error")]
    SerdeError(#[from] serde_json::Error),

    #[error("Configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("IO error")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {message}")]
    ConfigurationError { message: String },

    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Malformed {collection} record: {id}")]
    MalformedRecord { collection: &'static str, id: String },

    #[error("Illegal application status change from {from} to {to}")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },

    #[error("Database migration error")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),
}
