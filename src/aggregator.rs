//! Ping and demand pin aggregation for the map and heat-map.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::debug;

use crate::cuisine::{Cuisine, CuisineFilter, CuisineKey};
use crate::geo::{Coordinate, DistanceCutoff};
use crate::models::{DemandPin, Ping, RawDemandPin, RawPing};

/// How long a ping or demand pin stays relevant
pub const RELEVANCE_WINDOW: TimeDelta = TimeDelta::hours(24);
/// Pings a customer may send per rolling window
pub const DAILY_PING_LIMIT: usize = 3;

/// A timestamped, located, cuisine-tagged record.
pub trait MapPoint: Cuisine {
    fn coordinate(&self) -> Coordinate;
    fn timestamp(&self) -> DateTime<Utc>;

    /// Relevant while strictly younger than `window`.
    fn is_relevant(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        self.timestamp() > now - window
    }
}

impl MapPoint for Ping {
    fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl MapPoint for DemandPin {
    fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl<T: MapPoint + ?Sized> MapPoint for &T {
    fn coordinate(&self) -> Coordinate {
        (**self).coordinate()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        (**self).timestamp()
    }
}

/// Normalize raw pings and keep those inside the relevance window.
///
/// Each item pairs the document id with its payload.
pub fn collect_pings<I>(raw: I, now: DateTime<Utc>) -> Vec<Ping>
where
    I: IntoIterator<Item = (String, RawPing)>,
{
    raw.into_iter()
        .filter_map(|(id, r)| {
            let ping = r.normalize(&id);
            if ping.is_none() {
                debug!("Dropping malformed ping {}", id);
            }
            ping
        })
        .filter(|p| p.is_relevant(now, RELEVANCE_WINDOW))
        .collect()
}

/// Normalize raw demand pins and keep those inside the relevance window.
pub fn collect_demand_pins<I>(raw: I, now: DateTime<Utc>) -> Vec<DemandPin>
where
    I: IntoIterator<Item = (String, RawDemandPin)>,
{
    raw.into_iter()
        .filter_map(|(id, r)| {
            let pin = r.normalize(&id);
            if pin.is_none() {
                debug!("Dropping malformed demand pin {}", id);
            }
            pin
        })
        .filter(|p| p.is_relevant(now, RELEVANCE_WINDOW))
        .collect()
}

/// Points still inside the 24 hour relevance window
pub fn relevant<T, I>(points: I, now: DateTime<Utc>) -> Vec<T>
where
    T: MapPoint,
    I: IntoIterator<Item = T>,
{
    points
        .into_iter()
        .filter(|p| p.is_relevant(now, RELEVANCE_WINDOW))
        .collect()
}

/// Points within `cutoff` of `center`, e.g. pings around a truck
pub fn within_radius<T, I>(points: I, center: &Coordinate, cutoff: DistanceCutoff) -> Vec<T>
where
    T: MapPoint,
    I: IntoIterator<Item = T>,
{
    points
        .into_iter()
        .filter(|p| cutoff.contains(center, &p.coordinate()))
        .collect()
}

/// Weighted heat-map input point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatPoint {
    #[serde(flatten)]
    pub coordinate: Coordinate,
    pub weight: f64,
    pub cuisine: CuisineKey,
}

impl HeatPoint {
    pub fn from_point<T: MapPoint>(point: &T) -> Self {
        Self {
            coordinate: point.coordinate(),
            weight: 1.0,
            cuisine: point.cuisine_key(),
        }
    }
}

/// Relevant, non-excluded points as heat-map input. Every point weighs 1.0.
pub fn heat_map_points<T, I>(
    points: I,
    now: DateTime<Utc>,
    filter: &CuisineFilter,
) -> Vec<HeatPoint>
where
    T: MapPoint,
    I: IntoIterator<Item = T>,
{
    points
        .into_iter()
        .filter(|p| p.is_relevant(now, RELEVANCE_WINDOW) && filter.allows(p.cuisine_label()))
        .map(|p| HeatPoint::from_point(&p))
        .collect()
}

/// Bucket heat points by cuisine key
pub fn group_by_cuisine<I>(points: I) -> BTreeMap<CuisineKey, Vec<HeatPoint>>
where
    I: IntoIterator<Item = HeatPoint>,
{
    let mut groups: BTreeMap<CuisineKey, Vec<HeatPoint>> = BTreeMap::new();
    for point in points {
        groups.entry(point.cuisine.clone()).or_default().push(point);
    }
    groups
}

/// Total weight per cuisine
pub fn cuisine_weights<'a, I>(points: I) -> BTreeMap<CuisineKey, f64>
where
    I: IntoIterator<Item = &'a HeatPoint>,
{
    let mut weights = BTreeMap::new();
    for point in points {
        *weights.entry(point.cuisine.clone()).or_insert(0.0) += point.weight;
    }
    weights
}

/// Outcome of a ping submission against the daily quota
#[derive(Debug, Clone, PartialEq)]
pub enum QuotaDecision {
    Accepted {
        remaining: usize,
    },
    /// The limit is reached; `recent` holds the pings counted against it,
    /// oldest first.
    Rejected {
        recent: Vec<Ping>,
        retry_at: DateTime<Utc>,
    },
}

impl QuotaDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, QuotaDecision::Accepted { .. })
    }

    /// Message shown to the customer when rejected
    pub fn user_message(&self) -> Option<String> {
        match self {
            QuotaDecision::Accepted { .. } => None,
            QuotaDecision::Rejected { retry_at, .. } if *retry_at == DateTime::<Utc>::MAX_UTC => {
                Some("Pings are not accepted at the moment.".to_string())
            }
            QuotaDecision::Rejected { recent, retry_at } => Some(format!(
                "You have already sent {} pings in the last 24 hours. You can send another after {}.",
                recent.len(),
                retry_at.format("%Y-%m-%d %H:%M UTC")
            )),
        }
    }
}

/// Rolling per-user ping limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingQuota {
    pub limit: usize,
    pub window: TimeDelta,
}

impl Default for PingQuota {
    fn default() -> Self {
        Self {
            limit: DAILY_PING_LIMIT,
            window: RELEVANCE_WINDOW,
        }
    }
}

impl PingQuota {
    /// Decide whether `user_id` may send another ping at `now`.
    ///
    /// Counts the user's pings with `timestamp >= now - window` in `history`.
    pub fn check<'a, I>(&self, history: I, user_id: &str, now: DateTime<Utc>) -> QuotaDecision
    where
        I: IntoIterator<Item = &'a Ping>,
    {
        let since = now - self.window;
        let mut recent: Vec<Ping> = history
            .into_iter()
            .filter(|p| p.user_id == user_id && p.timestamp >= since)
            .cloned()
            .collect();

        if recent.len() < self.limit {
            return QuotaDecision::Accepted {
                remaining: self.limit - recent.len() - 1,
            };
        }

        recent.sort_by_key(|p| p.timestamp);
        // The oldest counted ping that must expire to drop below the limit.
        // A zero limit never admits a ping, whatever expires.
        let retry_at = match self.limit {
            0 => DateTime::<Utc>::MAX_UTC,
            limit => recent[recent.len() - limit].timestamp + self.window,
        };
        QuotaDecision::Rejected { recent, retry_at }
    }
}
