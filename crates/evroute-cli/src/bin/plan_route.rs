//! Plan one EV trip against Google Maps and print the route as JSON.

use anyhow::Context;
use clap::Parser;
use evroute_cli::{init_tracing, parse_lat_lng, MapsArgs};
use evroute_core::{
    LatLng, PlanRequest, PlannerConfig, PolicyKind, RoutePlanner, VehicleProfile,
};
use evroute_maps::PowerPlantDataset;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Plan an EV route with charging stops and CO2 emissions
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Start as "lat,lng"
    #[arg(long, value_parser = parse_lat_lng)]
    from: LatLng,

    /// Destination as "lat,lng"
    #[arg(long, value_parser = parse_lat_lng)]
    to: LatLng,

    /// Battery capacity in kWh
    #[arg(long, default_value_t = 75.0)]
    battery_kwh: f64,

    /// Advertised range in km; derived from a 139 Wh/km consumption if omitted
    #[arg(long)]
    range_km: Option<f64>,

    #[arg(long, default_value = "global_power_plant_database.csv")]
    power_plants: PathBuf,

    /// Learned policy model (JSON); the lookahead rule is used without one
    #[arg(long)]
    model: Option<PathBuf>,

    #[arg(long, default_value_t = 30.0)]
    sample_interval_km: f64,

    /// Give up after this many seconds (0 = no limit)
    #[arg(long, default_value_t = 120)]
    deadline_s: u64,

    #[command(flatten)]
    maps: MapsArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let vehicle = VehicleProfile::from_battery(args.battery_kwh, args.range_km)?;
    let (directions, places) = args.maps.providers()?;
    let grid = PowerPlantDataset::from_path(&args.power_plants)
        .with_context(|| format!("loading {}", args.power_plants.display()))?;
    let policy = match &args.model {
        Some(path) => PolicyKind::Learned {
            model_path: path.clone(),
        },
        None => PolicyKind::Lookahead,
    }
    .build()?;

    let config = PlannerConfig {
        sample_interval_m: args.sample_interval_km * 1000.0,
        deadline: (args.deadline_s > 0).then(|| Duration::from_secs(args.deadline_s)),
        ..PlannerConfig::default()
    };
    let planner = RoutePlanner::new(directions, places, Arc::new(grid), policy, config);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    eprintln!(
        "Planning {} -> {} ({:.0} km range, {} policy)",
        args.from,
        args.to,
        vehicle.range_capacity_m() / 1000.0,
        planner.policy_name()
    );

    let request = PlanRequest {
        origin: args.from,
        destination: args.to,
        vehicle,
    };
    match planner.plan(&request, &cancel).await {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            eprintln!(
                "{} charging stops, {:.1} km, {:.3} kg CO2",
                outcome.route.charging_stops.len(),
                outcome.route.total_distance_m() / 1000.0,
                outcome.total_emissions_kg_co2()
            );
            Ok(())
        }
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&err.partial)?);
            Err(anyhow::anyhow!("{} ({})", err.kind, err.kind.code()))
        }
    }
}
