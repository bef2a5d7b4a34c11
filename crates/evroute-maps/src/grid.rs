//! Grid generation mix from a power plant capacity dataset.
//!
//! Expects the column layout of the WRI Global Power Plant Database; only
//! `latitude`, `longitude`, `primary_fuel` and `capacity_mw` are read.

use async_trait::async_trait;
use evroute_core::spatial::EARTH_RADIUS_M;
use evroute_core::{GenerationMix, GridMixProvider, LatLng, ProviderError};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read power plant dataset: {0}")]
    Csv(#[from] csv::Error),
    #[error("power plant dataset has no usable rows")]
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowerPlant {
    pub position: LatLng,
    pub primary_fuel: String,
    pub capacity_mw: f64,
}

#[derive(Debug, Deserialize)]
struct PlantRecord {
    #[serde(deserialize_with = "csv::invalid_option")]
    latitude: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    longitude: Option<f64>,
    primary_fuel: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    capacity_mw: Option<f64>,
}

impl PlantRecord {
    fn into_plant(self) -> Option<PowerPlant> {
        let position = LatLng::new(self.latitude?, self.longitude?);
        let capacity_mw = self.capacity_mw?;
        let fuel = self.primary_fuel.trim();
        if !position.is_valid() || !(capacity_mw.is_finite() && capacity_mw > 0.0) || fuel.is_empty()
        {
            return None;
        }
        Some(PowerPlant {
            position,
            primary_fuel: fuel.to_string(),
            capacity_mw,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PowerPlantDataset {
    plants: Vec<PowerPlant>,
}

impl PowerPlantDataset {
    pub fn new(plants: Vec<PowerPlant>) -> Self {
        Self { plants }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)?;
        Self::from_csv(reader)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        Self::from_csv(csv::ReaderBuilder::new().has_headers(true).from_reader(reader))
    }

    fn from_csv<R: Read>(mut reader: csv::Reader<R>) -> Result<Self, DatasetError> {
        let mut plants = Vec::new();
        let mut skipped = 0usize;
        for record in reader.deserialize::<PlantRecord>() {
            match record?.into_plant() {
                Some(plant) => plants.push(plant),
                None => skipped += 1,
            }
        }
        if plants.is_empty() {
            return Err(DatasetError::Empty);
        }
        tracing::info!(plants = plants.len(), skipped, "loaded power plant dataset");
        Ok(Self::new(plants))
    }

    pub fn len(&self) -> usize {
        self.plants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plants.is_empty()
    }

    /// Capacity share per fuel over plants within `radius_m` of `location`.
    pub fn mix_within(&self, location: LatLng, radius_m: f64) -> GenerationMix {
        // Cheap latitude band check before the haversine.
        let lat_band_deg = (radius_m / EARTH_RADIUS_M).to_degrees();
        GenerationMix::from_capacities(
            self.plants
                .iter()
                .filter(|plant| (plant.position.lat - location.lat).abs() <= lat_band_deg)
                .filter(|plant| plant.position.distance_to(&location) <= radius_m)
                .map(|plant| (plant.primary_fuel.clone(), plant.capacity_mw)),
        )
    }
}

#[async_trait]
impl GridMixProvider for PowerPlantDataset {
    async fn generation_mix(
        &self,
        location: LatLng,
        radius_m: f64,
    ) -> Result<GenerationMix, ProviderError> {
        Ok(self.mix_within(location, radius_m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
country,name,capacity_mw,latitude,longitude,primary_fuel,commissioning_year
USA,Coal Plant,300,37.00,-122.00,Coal,1980
USA,Wind Farm,100,37.05,-122.05,Wind,2010
USA,Far Gas,500,40.00,-100.00,Gas,
USA,Broken,,37.01,-122.01,Solar,2015
USA,Nowhere,50,not-a-number,-122.00,Hydro,1950
";

    #[test]
    fn skips_unusable_rows() {
        let dataset = PowerPlantDataset::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(dataset.len(), 3);
    }

    #[test]
    fn mix_only_counts_plants_in_radius() {
        let dataset = PowerPlantDataset::from_reader(SAMPLE.as_bytes()).unwrap();
        let mix = dataset.mix_within(LatLng::new(37.0, -122.0), 20_000.0);
        let shares: Vec<_> = mix.iter().collect();
        assert_eq!(shares, vec![("Coal", 0.75), ("Wind", 0.25)]);
    }

    #[test]
    fn empty_area_has_empty_mix() {
        let dataset = PowerPlantDataset::from_reader(SAMPLE.as_bytes()).unwrap();
        let mix = dataset.mix_within(LatLng::new(0.0, 0.0), 20_000.0);
        assert!(mix.is_empty());
        assert_eq!(mix.emission_factor_kg_per_mwh(), None);
    }

    #[test]
    fn dataset_without_rows_is_rejected() {
        let header_only = "capacity_mw,latitude,longitude,primary_fuel\n";
        assert!(matches!(
            PowerPlantDataset::from_reader(header_only.as_bytes()),
            Err(DatasetError::Empty)
        ));
    }

    #[tokio::test]
    async fn serves_as_grid_provider() {
        let dataset = PowerPlantDataset::new(vec![PowerPlant {
            position: LatLng::new(10.0, 10.0),
            primary_fuel: "Solar".into(),
            capacity_mw: 5.0,
        }]);
        let mix = dataset
            .generation_mix(LatLng::new(10.0, 10.01), 20_000.0)
            .await
            .unwrap();
        assert_eq!(mix.emission_factor_kg_per_mwh(), Some(45.0));
    }
}
