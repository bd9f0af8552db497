//! Truck visibility rules.

use chrono::{DateTime, TimeDelta, Utc};

use crate::geo::{Coordinate, DistanceCutoff};
use crate::models::TruckLocation;

/// Time after the last location update during which a truck still counts as active
pub const GRACE_PERIOD: TimeDelta = TimeDelta::minutes(15);
/// Session length after which a truck must explicitly go live again
pub const ONLINE_WINDOW: TimeDelta = TimeDelta::hours(8);
/// Radius used by the owner dashboard map
pub const DASHBOARD_RADIUS_MILES: f64 = 30.0;

/// Parameters for deciding whether a truck is rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityPolicy {
    pub grace_period: TimeDelta,
    pub online_window: TimeDelta,
    /// Applied only when the viewer position is known.
    pub max_distance: Option<DistanceCutoff>,
    /// Show every truck regardless of the rules. Debugging only.
    pub debug_show_all: bool,
}

impl Default for VisibilityPolicy {
    fn default() -> Self {
        Self {
            grace_period: GRACE_PERIOD,
            online_window: ONLINE_WINDOW,
            max_distance: None,
            debug_show_all: false,
        }
    }
}

impl VisibilityPolicy {
    /// Policy of the owner dashboard: default windows with a 30 mile cutoff
    pub fn dashboard() -> Self {
        Self {
            max_distance: Some(DistanceCutoff::miles(DASHBOARD_RADIUS_MILES)),
            ..Self::default()
        }
    }

    pub fn with_max_distance(mut self, cutoff: Option<DistanceCutoff>) -> Self {
        self.max_distance = cutoff;
        self
    }

    /// Opt into showing every truck. Not for production views.
    pub fn with_debug_show_all(mut self, show_all: bool) -> Self {
        self.debug_show_all = show_all;
        self
    }

    /// Whether `truck` is shown to a viewer at `viewer` (if known) at `now`.
    pub fn should_show(
        &self,
        truck: &TruckLocation,
        now: DateTime<Utc>,
        viewer: Option<&Coordinate>,
    ) -> bool {
        if self.debug_show_all {
            return true;
        }

        let time_since_active = now - truck.last_active;
        let session_duration = now - truck.session_start_time;
        let is_recently_active = time_since_active <= self.grace_period;
        let within_session_window = session_duration < self.online_window;

        if !(truck.visible && (is_recently_active || within_session_window)) {
            return false;
        }

        match (self.max_distance, viewer) {
            (Some(cutoff), Some(viewer)) => cutoff.contains(viewer, &truck.coordinate),
            _ => true,
        }
    }

    /// Trucks from a snapshot that pass [`Self::should_show`]
    pub fn visible_trucks<'a, I>(
        &self,
        trucks: I,
        now: DateTime<Utc>,
        viewer: Option<&Coordinate>,
    ) -> Vec<&'a TruckLocation>
    where
        I: IntoIterator<Item = &'a TruckLocation>,
    {
        trucks
            .into_iter()
            .filter(|t| self.should_show(t, now, viewer))
            .collect()
    }
}
