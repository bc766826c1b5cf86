//! Watch command - drive the request pipeline with a simulated sensor.
//!
//! Emits a random-walk position (and optionally heading) stream into a
//! session manager and prints what survives the configured filters. This
//! is the quickest way to see the distance and degree-change filters at
//! work without real hardware.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, ValueEnum};
use rand::Rng;
use tracing::info;

use geostream::observers::DeliveryContext;
use geostream::policy::{Accuracy, Frequency};
use geostream::prelude::*;

use crate::error::CliError;

/// Degrees of latitude per meter, good enough for a simulation.
const DEGREES_PER_METER: f64 = 1.0 / 111_195.0;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum AccuracyArg {
    Any,
    City,
    Neighborhood,
    Block,
    House,
    Room,
}

impl From<AccuracyArg> for Accuracy {
    fn from(arg: AccuracyArg) -> Self {
        match arg {
            AccuracyArg::Any => Accuracy::Any,
            AccuracyArg::City => Accuracy::City,
            AccuracyArg::Neighborhood => Accuracy::Neighborhood,
            AccuracyArg::Block => Accuracy::Block,
            AccuracyArg::House => Accuracy::House,
            AccuracyArg::Room => Accuracy::Room,
        }
    }
}

/// Arguments for the watch command.
#[derive(Args)]
pub struct WatchArgs {
    /// Accuracy policy for the location request.
    #[arg(long, value_enum, default_value_t = AccuracyArg::Any)]
    pub accuracy: AccuracyArg,

    /// Minimum distance in meters a fix must move to be delivered.
    #[arg(long)]
    pub min_distance: Option<f64>,

    /// Also watch the heading stream through this degree-change filter.
    #[arg(long)]
    pub heading_filter: Option<f64>,

    /// Seconds without an accepted fix before the request times out.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Stop after the first delivered fix.
    #[arg(long)]
    pub one_shot: bool,

    /// Number of simulated samples to emit.
    #[arg(long, default_value_t = 60)]
    pub samples: u32,

    /// Milliseconds between simulated samples.
    #[arg(long, default_value_t = 250)]
    pub interval_ms: u64,

    /// Starting latitude of the random walk.
    #[arg(long, default_value_t = 53.5511)]
    pub latitude: f64,

    /// Starting longitude of the random walk.
    #[arg(long, default_value_t = 9.9937)]
    pub longitude: f64,
}

/// Run the watch command.
pub fn run(args: WatchArgs) -> Result<(), CliError> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(watch(args));
    Ok(())
}

async fn watch(args: WatchArgs) {
    let manager = SessionManager::new(SessionConfig::default());
    manager.on_profile_changed(|profile| {
        info!(
            accuracy = %profile.accuracy,
            background = profile.background,
            heading = profile.heading,
            "session profile changed"
        );
    });

    let delivered = Arc::new(AtomicU64::new(0));

    let mut builder = LocationRequest::builder()
        .accuracy(args.accuracy.into())
        .name("watch");
    if let Some(meters) = args.min_distance {
        builder = builder.minimum_distance(meters);
    }
    if let Some(secs) = args.timeout {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    if args.one_shot {
        builder = builder.frequency(Frequency::OneShot);
    }
    let location = builder.build(&manager);

    let delivered_count = Arc::clone(&delivered);
    location.on_update(DeliveryContext::Inline, move |update| {
        delivered_count.fetch_add(1, Ordering::Relaxed);
        println!(
            "fix   {:>9.5}, {:>9.5}  (+/- {:.0} m)",
            update.location.latitude,
            update.location.longitude,
            update.location.horizontal_accuracy
        );
    });
    location.on_failure(DeliveryContext::Inline, |failure| {
        println!("fail  {}", failure.error);
    });
    location.resume();

    let heading = match args.heading_filter {
        Some(filter) => match HeadingRequest::builder().filter(filter).build(&manager) {
            Ok(request) => {
                request.on_heading(DeliveryContext::Inline, |update| {
                    println!("head  {:>6.1} deg", update.heading.true_heading);
                });
                request.resume();
                Some(request)
            }
            Err(error) => {
                println!("heading unavailable: {error}");
                None
            }
        },
        None => None,
    };

    let mut latitude = args.latitude;
    let mut longitude = args.longitude;
    let mut track = 0.0f64;
    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval_ms));

    for _ in 0..args.samples {
        ticker.tick().await;

        let (step_m, drift_m, accuracy_m, turn) = {
            let mut rng = rand::rng();
            (
                rng.random_range(0.0..30.0),
                rng.random_range(-5.0..5.0),
                rng.random_range(2.0..60.0),
                rng.random_range(-15.0..15.0),
            )
        };
        latitude += step_m * DEGREES_PER_METER;
        longitude += drift_m * DEGREES_PER_METER;
        track = (track + turn).rem_euclid(360.0);

        manager.dispatch_location(LocationSample::new(latitude, longitude, accuracy_m));
        if heading.is_some() {
            manager.dispatch_heading(HeadingSample::new(track));
        }

        if args.one_shot && !location.is_in_queue() {
            break;
        }
    }

    println!(
        "done: {} fixes delivered, final state {}",
        delivered.load(Ordering::Relaxed),
        location.state()
    );
}
