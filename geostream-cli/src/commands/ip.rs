//! Ip command - one-shot approximate positioning over IP geolocation.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio::sync::mpsc;

use geostream::ip::IpApiService;
use geostream::observers::DeliveryContext;
use geostream::policy::Accuracy;
use geostream::prelude::*;

use crate::error::CliError;

/// Arguments for the ip command.
#[derive(Args)]
pub struct IpArgs {
    /// Lookup endpoint (ip-api.com JSON schema).
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Seconds to wait before giving up.
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,
}

enum Outcome {
    Fix(LocationSample),
    Failed(SensorError),
}

/// Run the ip command.
pub fn run(args: IpArgs) -> Result<(), CliError> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(lookup(args))
}

async fn lookup(args: IpArgs) -> Result<(), CliError> {
    let manager = SessionManager::new(SessionConfig::default());
    let service = match args.endpoint {
        Some(endpoint) => IpApiService::with_endpoint(endpoint),
        None => IpApiService::new(),
    };

    let request = LocationRequest::builder()
        .accuracy(Accuracy::IpLookup(Arc::new(service)))
        .timeout(Duration::from_secs(args.timeout))
        .name("ip lookup")
        .build(&manager);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let tx_update = tx.clone();
    request.on_update(DeliveryContext::Inline, move |update| {
        let _ = tx_update.send(Outcome::Fix(update.location.clone()));
    });
    request.on_failure(DeliveryContext::Inline, move |failure| {
        let _ = tx.send(Outcome::Failed(failure.error.clone()));
    });
    request.resume();

    match rx.recv().await {
        Some(Outcome::Fix(fix)) => {
            println!(
                "approximate position: {:.4}, {:.4} (+/- {:.0} m)",
                fix.latitude, fix.longitude, fix.horizontal_accuracy
            );
            Ok(())
        }
        Some(Outcome::Failed(error)) => Err(CliError::Sensor(error)),
        None => Err(CliError::Other("lookup produced no result".to_string())),
    }
}
