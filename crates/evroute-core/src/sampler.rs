//! Fixed-interval sampling of a decoded directions path.

use crate::models::{LatLng, Waypoint};
use crate::spatial::interpolate;

/// Default sampling interval in meters.
pub const DEFAULT_INTERVAL_M: f64 = 30_000.0;

/// Emitted points closer than this to the terminal vertex are merged with it.
const TERMINAL_MERGE_M: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathSampler {
    interval_m: f64,
}

impl Default for PathSampler {
    fn default() -> Self {
        Self {
            interval_m: DEFAULT_INTERVAL_M,
        }
    }
}

impl PathSampler {
    /// Non-positive or non-finite intervals fall back to the default.
    pub fn new(interval_m: f64) -> Self {
        if interval_m.is_finite() && interval_m > 0.0 {
            Self { interval_m }
        } else {
            Self::default()
        }
    }

    pub fn interval_m(&self) -> f64 {
        self.interval_m
    }

    /// Sample `path` every `interval_m` meters of great-circle distance.
    ///
    /// The first vertex is always the first sample and the last vertex is
    /// always the terminal sample, so only the final spacing may be shorter
    /// than the interval.
    pub fn sample(&self, path: &[LatLng]) -> Vec<LatLng> {
        let Some(&first) = path.first() else {
            return Vec::new();
        };

        let mut points = vec![first];
        let mut budget = self.interval_m;

        for pair in path.windows(2) {
            let mut start = pair[0];
            let end = pair[1];
            let mut remaining = start.distance_to(&end);

            while remaining >= budget && remaining > 0.0 {
                let point = interpolate(start, end, budget / remaining);
                points.push(point);
                start = point;
                remaining -= budget;
                budget = self.interval_m;
            }
            budget -= remaining;
        }

        if path.len() > 1 {
            let last = path[path.len() - 1];
            let tail = points.len() - 1;
            if points[tail].distance_to(&last) > TERMINAL_MERGE_M {
                points.push(last);
            } else if tail > 0 {
                points[tail] = last;
            }
        }

        points
    }

    /// Sample `path` and attach the distance between consecutive samples.
    pub fn waypoints(&self, path: &[LatLng]) -> Vec<Waypoint> {
        to_waypoints(&self.sample(path))
    }
}

/// Turn plain sample points into un-annotated waypoints.
pub fn to_waypoints(points: &[LatLng]) -> Vec<Waypoint> {
    let mut previous: Option<LatLng> = None;
    points
        .iter()
        .map(|&point| {
            let distance = previous.map(|prev| prev.distance_to(&point)).unwrap_or(0.0);
            previous = Some(point);
            Waypoint::new(point, distance)
        })
        .collect()
}
