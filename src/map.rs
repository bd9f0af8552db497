//! Current map snapshot and the views computed from it.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_with::{serde_as, TimestampMilliSeconds};
use tracing::debug;

use crate::aggregator::{self, HeatPoint, MapPoint, RELEVANCE_WINDOW};
use crate::cuisine::{CuisineFilter, CuisineKey};
use crate::events;
use crate::geo::{Coordinate, DistanceCutoff};
use crate::models::{DemandPin, Event, Ping, TruckLocation, VendorApplication};
use crate::visibility::VisibilityPolicy;

/// A normalized record received from the realtime feed
#[derive(Debug, Clone, PartialEq)]
pub enum FeedRecord {
    Truck(TruckLocation),
    Ping(Ping),
    DemandPin(DemandPin),
    Event(Event),
    Application(VendorApplication),
}

impl FeedRecord {
    pub fn collection(&self) -> &'static str {
        match self {
            FeedRecord::Truck(_) => "trucks",
            FeedRecord::Ping(_) => "pings",
            FeedRecord::DemandPin(_) => "demandPins",
            FeedRecord::Event(_) => "events",
            FeedRecord::Application(_) => "vendorApplications",
        }
    }
}

/// Latest record per id of every map collection.
#[derive(Debug, Default, Clone)]
pub struct MapState {
    trucks: HashMap<String, TruckLocation>,
    pings: HashMap<String, Ping>,
    demand_pins: HashMap<String, DemandPin>,
    events: HashMap<String, Event>,
}

/// What a viewer is asking for
#[derive(Debug, Clone)]
pub struct MapQuery {
    pub now: DateTime<Utc>,
    pub viewer: Option<Coordinate>,
    pub filter: CuisineFilter,
    /// Restrict pings and demand pins to this radius around the viewer
    pub point_radius: Option<DistanceCutoff>,
}

impl MapQuery {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            viewer: None,
            filter: CuisineFilter::default(),
            point_radius: None,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapView {
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub generated_at: DateTime<Utc>,
    pub trucks: Vec<TruckLocation>,
    pub events: Vec<Event>,
    pub pings: Vec<Ping>,
    pub demand_pins: Vec<DemandPin>,
    pub heat_map: Vec<HeatPoint>,
    pub cuisine_weights: BTreeMap<CuisineKey, f64>,
}

impl MapState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a record. Returns false for records that are not map content.
    pub fn apply(&mut self, record: FeedRecord) -> bool {
        match record {
            FeedRecord::Truck(t) => {
                self.trucks.insert(t.id.clone(), t);
            }
            FeedRecord::Ping(p) => {
                self.pings.insert(p.ping_id.clone(), p);
            }
            FeedRecord::DemandPin(p) => {
                self.demand_pins.insert(p.id.clone(), p);
            }
            FeedRecord::Event(e) => {
                self.events.insert(e.id.clone(), e);
            }
            FeedRecord::Application(_) => return false,
        }
        true
    }

    pub fn truck(&self, id: &str) -> Option<&TruckLocation> {
        self.trucks.get(id)
    }

    pub fn event(&self, id: &str) -> Option<&Event> {
        self.events.get(id)
    }

    pub fn pings(&self) -> impl Iterator<Item = &Ping> {
        self.pings.values()
    }

    /// Forget pings and demand pins that left the relevance window.
    ///
    /// They can never become relevant again, so views are unaffected.
    pub fn evict_stale(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.pings.len() + self.demand_pins.len();
        self.pings.retain(|_, p| p.is_relevant(now, RELEVANCE_WINDOW));
        self.demand_pins
            .retain(|_, p| p.is_relevant(now, RELEVANCE_WINDOW));
        let evicted = before - self.pings.len() - self.demand_pins.len();
        if evicted > 0 {
            debug!("Evicted {} stale map points", evicted);
        }
        evicted
    }

    /// Compute the view for `query` without touching the state.
    pub fn view(&self, policy: &VisibilityPolicy, query: &MapQuery) -> MapView {
        let mut trucks: Vec<TruckLocation> = policy
            .visible_trucks(self.trucks.values(), query.now, query.viewer.as_ref())
            .into_iter()
            .cloned()
            .collect();
        trucks.sort_by(|a, b| a.id.cmp(&b.id));

        let mut events: Vec<Event> = events::visible_events(self.events.values())
            .into_iter()
            .cloned()
            .collect();
        events.sort_by(|a, b| a.id.cmp(&b.id));

        let mut pings = self.select_points(self.pings.values(), query);
        pings.sort_by(|a, b| (a.timestamp, &a.ping_id).cmp(&(b.timestamp, &b.ping_id)));

        let mut demand_pins = self.select_points(self.demand_pins.values(), query);
        demand_pins.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));

        let heat_map: Vec<HeatPoint> = pings
            .iter()
            .map(HeatPoint::from_point)
            .chain(demand_pins.iter().map(HeatPoint::from_point))
            .collect();
        let cuisine_weights = aggregator::cuisine_weights(&heat_map);

        MapView {
            generated_at: query.now,
            trucks,
            events,
            pings,
            demand_pins,
            heat_map,
            cuisine_weights,
        }
    }

    fn select_points<'a, T, I>(&self, points: I, query: &MapQuery) -> Vec<T>
    where
        T: MapPoint + Clone + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let relevant = aggregator::relevant(points, query.now);
        let near = match (query.point_radius, query.viewer.as_ref()) {
            (Some(cutoff), Some(viewer)) => aggregator::within_radius(relevant, viewer, cutoff),
            _ => relevant,
        };
        query
            .filter
            .filter_by_cuisine(near)
            .into_iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventStatus, KitchenType};
    use chrono::{TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn here() -> Coordinate {
        Coordinate {
            lat: 30.2672,
            lng: -97.7431,
        }
    }

    fn truck(id: &str, visible: bool) -> TruckLocation {
        TruckLocation {
            id: id.to_string(),
            coordinate: here(),
            is_live: visible,
            visible,
            last_active: now() - TimeDelta::minutes(3),
            session_start_time: now() - TimeDelta::hours(1),
            kitchen_type: KitchenType::Truck,
            truck_name: id.to_string(),
            cuisine: "bbq".to_string(),
        }
    }

    fn ping(id: &str, age: TimeDelta, cuisine: &str) -> Ping {
        Ping {
            ping_id: id.to_string(),
            user_id: "u".to_string(),
            username: "u".to_string(),
            coordinate: here(),
            cuisine_type: cuisine.to_string(),
            timestamp: now() - age,
            address: None,
        }
    }

    fn state() -> MapState {
        let mut state = MapState::new();
        state.apply(FeedRecord::Truck(truck("b-truck", true)));
        state.apply(FeedRecord::Truck(truck("a-hidden", false)));
        state.apply(FeedRecord::Ping(ping("p1", TimeDelta::hours(1), "Cafe")));
        state.apply(FeedRecord::Ping(ping("p2", TimeDelta::hours(2), "tacos")));
        state.apply(FeedRecord::Ping(ping("p3", TimeDelta::hours(26), "coffee")));
        state.apply(FeedRecord::DemandPin(DemandPin {
            id: "d1".to_string(),
            user_id: "u2".to_string(),
            username: "u2".to_string(),
            coordinate: here(),
            cuisine_request: "coffee".to_string(),
            timestamp: now() - TimeDelta::hours(3),
        }));
        state.apply(FeedRecord::Event(Event {
            id: "e1".to_string(),
            title: "Rally".to_string(),
            coordinate: Some(here()),
            status: EventStatus::Live,
            organizer_id: "org".to_string(),
            date: None,
            time: None,
        }));
        state.apply(FeedRecord::Event(Event {
            id: "e2".to_string(),
            title: "Draft".to_string(),
            coordinate: Some(here()),
            status: EventStatus::Draft,
            organizer_id: "org".to_string(),
            date: None,
            time: None,
        }));
        state
    }

    #[test]
    fn view_applies_all_rules() {
        let view = state().view(&VisibilityPolicy::default(), &MapQuery::at(now()));

        assert_eq!(view.trucks.len(), 1);
        assert_eq!(view.trucks[0].id, "b-truck");
        assert_eq!(view.events.len(), 1);
        assert_eq!(view.events[0].id, "e1");
        let ids: Vec<&str> = view.pings.iter().map(|p| p.ping_id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p1"]);
        assert_eq!(view.demand_pins.len(), 1);
        assert_eq!(view.heat_map.len(), 3);
        assert_eq!(view.cuisine_weights[&CuisineKey::from("coffee")], 2.0);
    }

    #[test]
    fn view_respects_cuisine_filter() {
        let mut query = MapQuery::at(now());
        query.filter = CuisineFilter::new(["coffee"]);
        let view = state().view(&VisibilityPolicy::default(), &query);

        assert_eq!(view.pings.len(), 1);
        assert_eq!(view.pings[0].ping_id, "p2");
        assert!(view.demand_pins.is_empty());
        assert!(!view.cuisine_weights.contains_key(&CuisineKey::from("coffee")));
    }

    #[test]
    fn point_radius_uses_viewer() {
        let mut query = MapQuery::at(now());
        query.point_radius = Some(DistanceCutoff::kilometers(5.0));
        query.viewer = Some(Coordinate {
            lat: 29.7604,
            lng: -95.3698,
        });
        let view = state().view(&VisibilityPolicy::default(), &query);
        assert!(view.pings.is_empty());
        assert!(view.heat_map.is_empty());
    }

    #[test]
    fn upsert_replaces_truck() {
        let mut state = state();
        let mut offline = truck("b-truck", true);
        offline.visible = false;
        offline.is_live = false;
        assert!(state.apply(FeedRecord::Truck(offline)));

        let view = state.view(&VisibilityPolicy::default(), &MapQuery::at(now()));
        assert!(view.trucks.is_empty());
        assert!(state.truck("b-truck").is_some());
    }

    #[test]
    fn evict_stale_keeps_views_identical() {
        let mut state = state();
        let policy = VisibilityPolicy::default();
        let before = state.view(&policy, &MapQuery::at(now()));
        assert_eq!(state.evict_stale(now()), 1);
        assert_eq!(state.view(&policy, &MapQuery::at(now())), before);
    }

    #[test]
    fn view_serializes_camel_case() {
        let view = state().view(&VisibilityPolicy::default(), &MapQuery::at(now()));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["generatedAt"], now().timestamp_millis());
        assert_eq!(json["heatMap"][0]["weight"], 1.0);
        assert_eq!(json["cuisineWeights"]["coffee"], 2.0);
    }
}
