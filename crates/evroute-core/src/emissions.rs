//! Grid-mix based CO2 estimates for the energy a trip consumes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default radius around a location used for the grid-mix lookup.
pub const DEFAULT_GRID_RADIUS_M: f64 = 20_000.0;

/// Lifecycle emission factors per primary fuel, kg CO2 per MWh.
const FUEL_EMISSION_FACTORS: &[(&str, f64)] = &[
    ("Hydro", 4.0),
    ("Solar", 45.0),
    ("Gas", 450.0),
    ("Other", 0.0),
    ("Oil", 890.0),
    ("Wind", 11.0),
    ("Nuclear", 12.0),
    ("Coal", 1001.0),
    ("Waste", 670.0),
    ("Biomass", 230.0),
    ("Wave and Tidal", 17.0),
    ("Petcoke", 1025.0),
    ("Geothermal", 38.0),
    ("Storage", 0.0),
    ("Cogeneration", 0.0),
];

/// kg CO2 per MWh for a fuel; unknown fuels contribute nothing.
pub fn fuel_emission_factor(fuel: &str) -> f64 {
    FUEL_EMISSION_FACTORS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(fuel))
        .map(|(_, factor)| *factor)
        .unwrap_or(0.0)
}

/// Fraction of local installed capacity per primary fuel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationMix(BTreeMap<String, f64>);

impl GenerationMix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mix from absolute capacities (MW per fuel), normalizing to fractions.
    pub fn from_capacities<I, S>(capacities: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut totals: BTreeMap<String, f64> = BTreeMap::new();
        for (fuel, capacity) in capacities {
            if capacity.is_finite() && capacity > 0.0 {
                *totals.entry(fuel.into()).or_insert(0.0) += capacity;
            }
        }
        let sum: f64 = totals.values().sum();
        if sum <= 0.0 {
            return Self::default();
        }
        for value in totals.values_mut() {
            *value /= sum;
        }
        Self(totals)
    }

    pub fn insert(&mut self, fuel: impl Into<String>, fraction: f64) {
        self.0.insert(fuel.into(), fraction);
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|fraction| *fraction <= 0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(fuel, fraction)| (fuel.as_str(), *fraction))
    }

    /// Capacity-weighted emission factor in kg CO2 per MWh, `None` without generation.
    pub fn emission_factor_kg_per_mwh(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(
            self.iter()
                .filter(|(_, fraction)| fraction.is_finite())
                .map(|(fuel, fraction)| fraction * fuel_emission_factor(fuel))
                .sum(),
        )
    }
}

/// Convert a grid factor to kg CO2 per meter driven.
pub fn kg_co2_per_meter(factor_kg_per_mwh: f64, efficiency_wh_per_m: f64) -> f64 {
    factor_kg_per_mwh * efficiency_wh_per_m * 1e-6
}

/// Running emissions total for one planning run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EmissionsLedger {
    /// Distance driven since the last flush.
    pub uncharged_distance_m: f64,
    pub total_kg_co2: f64,
}

impl EmissionsLedger {
    pub fn add_distance(&mut self, distance_m: f64) {
        if distance_m.is_finite() && distance_m > 0.0 {
            self.uncharged_distance_m += distance_m;
        }
    }

    /// Take the pending distance, resetting it to zero.
    pub fn take_uncharged(&mut self) -> f64 {
        std::mem::take(&mut self.uncharged_distance_m)
    }

    pub fn record(&mut self, kg_co2: f64) {
        if kg_co2.is_finite() {
            self.total_kg_co2 += kg_co2;
        }
    }
}
