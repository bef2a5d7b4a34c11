//! Fit the learned charge policy from simulated trips.
//!
//! Episodes replay either a real annotated route (with --from/--to) or an
//! offline corridor with evenly spaced stations.

use anyhow::{bail, Context};
use clap::Parser;
use evroute_cli::{init_tracing, parse_lat_lng, Corridor, MapsArgs};
use evroute_core::{
    simulate_episodes, training_samples, AnnotatorConfig, DirectionsProvider, EpisodeOutcome,
    LatLng, LearnedPolicy, PathSampler, SimulationConfig, StationAnnotator, TrainingConfig,
    VehicleProfile, Waypoint,
};
use std::path::PathBuf;

/// Train the learned charge policy and save it as JSON
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Route start as "lat,lng"; needs --to and a Maps key
    #[arg(long, value_parser = parse_lat_lng, requires = "to")]
    from: Option<LatLng>,

    #[arg(long, value_parser = parse_lat_lng, requires = "from")]
    to: Option<LatLng>,

    #[arg(long, default_value_t = 75.0)]
    battery_kwh: f64,

    #[arg(long, default_value_t = 400.0)]
    range_km: f64,

    #[arg(long, default_value_t = 30.0)]
    sample_interval_km: f64,

    /// Corridor length when no route is given
    #[arg(long, default_value_t = 1200.0)]
    corridor_km: f64,

    /// Station on every n-th corridor waypoint
    #[arg(long, default_value_t = 3)]
    station_every: usize,

    #[arg(long, default_value_t = 5.0)]
    detour_km: f64,

    #[arg(long, default_value_t = 200)]
    episodes: usize,

    #[arg(long, default_value_t = 0.3)]
    charge_probability: f64,

    #[arg(long, default_value_t = 7)]
    seed: u64,

    #[arg(long, default_value_t = 500)]
    epochs: usize,

    #[arg(long, default_value_t = 0.5)]
    learning_rate: f64,

    #[arg(long, short, default_value = "policy_model.json")]
    output: PathBuf,

    #[command(flatten)]
    maps: MapsArgs,
}

async fn route_waypoints(args: &Args, from: LatLng, to: LatLng) -> anyhow::Result<Vec<Waypoint>> {
    let (directions, places) = args.maps.providers()?;
    let route = directions
        .directions(from, to)
        .await
        .context("fetching directions")?;
    let path = route.path()?;
    let waypoints = PathSampler::new(args.sample_interval_km * 1000.0).waypoints(&path);
    let annotator = StationAnnotator::new(places, directions, AnnotatorConfig::default());
    annotator
        .annotate(waypoints, to)
        .await
        .context("annotating stations")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let vehicle = VehicleProfile::from_battery(args.battery_kwh, Some(args.range_km))?;
    let waypoints = match (args.from, args.to) {
        (Some(from), Some(to)) => route_waypoints(&args, from, to).await?,
        _ => Corridor {
            length_km: args.corridor_km,
            interval_km: args.sample_interval_km,
            station_every: args.station_every,
            detour_km: args.detour_km,
        }
        .waypoints(),
    };
    let stations = waypoints.iter().filter(|w| w.has_station()).count();
    println!(
        "Simulating {} episodes over {} waypoints ({} with stations)",
        args.episodes,
        waypoints.len(),
        stations
    );

    let episodes = simulate_episodes(
        &waypoints,
        &vehicle,
        &SimulationConfig {
            episodes: args.episodes,
            charge_probability: args.charge_probability,
            seed: args.seed,
        },
    );
    let stranded = episodes
        .iter()
        .filter(|e| matches!(e.outcome, EpisodeOutcome::Stranded { .. }))
        .count();
    println!(
        "  completed: {}, stranded: {}",
        episodes.len() - stranded,
        stranded
    );

    let samples = training_samples(&episodes);
    if samples.is_empty() {
        bail!("no training samples: the route has no annotated waypoints");
    }

    let model = LearnedPolicy::train(
        &samples,
        &TrainingConfig {
            epochs: args.epochs,
            learning_rate: args.learning_rate,
            ..TrainingConfig::default()
        },
    )?;
    println!(
        "Trained on {} samples, accuracy {:.1}%",
        samples.len(),
        model.accuracy(&samples) * 100.0
    );

    model
        .save(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!("Saved model to {}", args.output.display());
    Ok(())
}
