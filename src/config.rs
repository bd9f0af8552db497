//! Application configuration

use std::path::Path;
use std::time::Duration;

use chrono::TimeDelta;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;

use crate::aggregator::{PingQuota, DAILY_PING_LIMIT};
use crate::errors::GrubanaError;
use crate::geo::{DistanceCutoff, DistanceUnit};
use crate::visibility::VisibilityPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub mqtt: MqttConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub map: MapConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MqttConfig {
    pub uri: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    pub client_id: String,
    pub topics: Vec<String>,
    pub view_topic: String,
    pub notification_topic: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MapConfig {
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub grace_period: Duration,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub online_window: Duration,
    /// No distance cutoff when absent
    pub max_distance: Option<f64>,
    pub distance_unit: DistanceUnit,
    pub debug_show_all: bool,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub publish_interval: Duration,
    pub ping_limit: usize,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub ping_window: Duration,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(15 * 60),
            online_window: Duration::from_secs(8 * 60 * 60),
            max_distance: None,
            distance_unit: DistanceUnit::Miles,
            debug_show_all: false,
            publish_interval: Duration::from_secs(5),
            ping_limit: DAILY_PING_LIMIT,
            ping_window: Duration::from_secs(24 * 60 * 60),
        }
    }
}

fn default_mqtt_port() -> u16 {
    443
}

fn default_max_connections() -> u32 {
    5
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/default")
    }

    /// Load from an optional config file, overridden by `GRUBANA__*` variables
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_string_lossy().into_owned();
        let config = Config::builder()
            .add_source(File::with_name(&path).required(false))
            .add_source(
                Environment::with_prefix("GRUBANA")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("mqtt.topics"),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), GrubanaError> {
        self.mqtt.validate()?;
        self.database.validate()?;
        self.map.validate()?;
        Ok(())
    }
}

impl MqttConfig {
    pub fn validate(&self) -> Result<(), GrubanaError> {
        if self.uri.trim().is_empty() {
            return Err(config_error("MQTT uri cannot be empty"));
        }
        if self.topics.is_empty() {
            return Err(config_error("At least one MQTT topic is required"));
        }
        if self.view_topic.trim().is_empty() || self.notification_topic.trim().is_empty() {
            return Err(config_error("Output topics cannot be empty"));
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), GrubanaError> {
        if self.url.trim().is_empty() {
            return Err(config_error("Database url cannot be empty"));
        }
        if self.max_connections == 0 {
            return Err(config_error("Database pool needs at least one connection"));
        }
        Ok(())
    }
}

impl MapConfig {
    pub fn validate(&self) -> Result<(), GrubanaError> {
        if self.grace_period.is_zero() || self.online_window.is_zero() {
            return Err(config_error("Visibility windows must be greater than zero"));
        }
        if self.publish_interval.is_zero() {
            return Err(config_error("Publish interval must be greater than zero"));
        }
        if self.ping_limit == 0 || self.ping_window.is_zero() {
            return Err(config_error("Ping quota must allow at least one ping"));
        }
        if let Some(max) = self.max_distance {
            if !max.is_finite() || max <= 0.0 {
                return Err(config_error("Maximum distance must be a positive number"));
            }
        }
        Ok(())
    }

    pub fn visibility_policy(&self) -> Result<VisibilityPolicy, GrubanaError> {
        Ok(VisibilityPolicy {
            grace_period: to_time_delta(self.grace_period, "grace_period")?,
            online_window: to_time_delta(self.online_window, "online_window")?,
            max_distance: self.max_distance.map(|max| DistanceCutoff {
                max,
                unit: self.distance_unit,
            }),
            debug_show_all: self.debug_show_all,
        })
    }

    pub fn ping_quota(&self) -> Result<PingQuota, GrubanaError> {
        Ok(PingQuota {
            limit: self.ping_limit,
            window: to_time_delta(self.ping_window, "ping_window")?,
        })
    }
}

fn to_time_delta(duration: Duration, name: &str) -> Result<TimeDelta, GrubanaError> {
    TimeDelta::from_std(duration).map_err(|e| GrubanaError::ConfigurationError {
        message: format!("{name} out of range: {e}"),
    })
}

fn config_error(message: &str) -> GrubanaError {
    GrubanaError::ConfigurationError {
        message: message.to_string(),
    }
}
