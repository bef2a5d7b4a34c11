//! Server configuration from environment.

use anyhow::{Context, Result};
use evroute_core::annotator::{AnnotatorConfig, StationSelection, DEFAULT_CANDIDATES};
use evroute_core::{PlannerConfig, PolicyKind};
use evroute_maps::google::DEFAULT_BASE_URL;
use evroute_maps::RetryPolicy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    /// Inline key; takes precedence over `maps_api_key_file`.
    pub maps_api_key: Option<String>,
    pub maps_api_key_file: PathBuf,
    pub maps_base_url: String,
    pub power_plant_csv: PathBuf,
    pub sample_interval_m: f64,
    pub station_radius_m: f64,
    pub grid_radius_m: f64,
    pub station_selection: StationSelection,
    pub annotation_concurrency: usize,
    pub max_replans: u32,
    /// Zero disables the per-plan deadline.
    pub plan_timeout_s: u64,
    pub policy: PolicyKind,
    pub provider_max_attempts: u32,
    pub provider_timeout_s: u64,
    pub station_cache_ttl_s: u64,
    pub station_cache_max: usize,
    pub rate_limit_rps: u32,
    pub rate_limit_enabled: bool,
    pub trust_proxy: bool,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        let candidates = env_or("EV_STATION_CANDIDATES", DEFAULT_CANDIDATES);
        let station_selection = match env::var("EV_STATION_SELECTION").as_deref().map(str::trim) {
            Ok("first") => StationSelection::FirstCandidate,
            _ => StationSelection::NearestToDestination { candidates },
        };
        let policy = match env::var("EV_POLICY").as_deref().map(str::trim) {
            Ok("learned") => PolicyKind::Learned {
                model_path: env::var("EV_POLICY_MODEL")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("policy_model.json")),
            },
            _ => PolicyKind::Lookahead,
        };

        Self {
            server_port: env_or("EV_PORT", 3000),
            maps_api_key: env::var("GOOGLE_MAPS_API_KEY")
                .ok()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
            maps_api_key_file: env::var("EV_API_KEY_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("APIKey.txt")),
            maps_base_url: env::var("EV_MAPS_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            power_plant_csv: env::var("EV_POWER_PLANT_CSV")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("global_power_plant_database.csv")),
            sample_interval_m: env_or("EV_SAMPLE_INTERVAL_M", 30_000.0),
            station_radius_m: env_or("EV_STATION_RADIUS_M", 10_000.0),
            grid_radius_m: env_or("EV_GRID_RADIUS_M", 20_000.0),
            station_selection,
            annotation_concurrency: env_or("EV_ANNOTATION_CONCURRENCY", 4),
            max_replans: env_or("EV_MAX_REPLANS", 25),
            plan_timeout_s: env_or("EV_PLAN_TIMEOUT_S", 120),
            policy,
            provider_max_attempts: env_or("EV_PROVIDER_MAX_ATTEMPTS", 3),
            provider_timeout_s: env_or("EV_PROVIDER_TIMEOUT_S", 10),
            station_cache_ttl_s: env_or("EV_STATION_CACHE_TTL_S", 3600),
            station_cache_max: env_or("EV_STATION_CACHE_MAX", 10_000),
            rate_limit_rps: env_or("EV_RATE_LIMIT_RPS", 2),
            rate_limit_enabled: env_flag("EV_RATE_LIMIT_ENABLED", true),
            trust_proxy: env_flag("EV_TRUST_PROXY", false),
        }
    }

    /// The Maps API key from the environment or, failing that, the key file.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = &self.maps_api_key {
            return Ok(key.clone());
        }
        let raw = std::fs::read_to_string(&self.maps_api_key_file).with_context(|| {
            format!(
                "GOOGLE_MAPS_API_KEY not set and key file {} unreadable",
                self.maps_api_key_file.display()
            )
        })?;
        let key = raw.trim();
        anyhow::ensure!(
            !key.is_empty(),
            "key file {} is empty",
            self.maps_api_key_file.display()
        );
        Ok(key.to_string())
    }

    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            sample_interval_m: self.sample_interval_m,
            annotator: AnnotatorConfig {
                search_radius_m: self.station_radius_m,
                selection: self.station_selection,
                concurrency: self.annotation_concurrency.max(1),
            },
            grid_radius_m: self.grid_radius_m,
            max_replans: self.max_replans,
            deadline: (self.plan_timeout_s > 0).then(|| Duration::from_secs(self.plan_timeout_s)),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.provider_max_attempts.max(1),
            ..RetryPolicy::default()
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_s.max(1))
    }

    pub fn station_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.station_cache_ttl_s)
    }
}
