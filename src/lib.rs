//! Live map logic for the Grubana food truck marketplace
//!
//! Truck visibility, cuisine filtering and ping aggregation are pure
//! functions over already-fetched records; the feed, database and config
//! modules host them in the `grubana-map` service.

pub mod aggregator;
pub mod config;
pub mod cuisine;
pub mod database;
pub mod errors;
pub mod events;
pub mod geo;
pub mod map;
pub mod models;
pub mod mqtt;
pub mod visibility;
