use anyhow::Result;
use std::time::Duration;
use tracing::Instrument;

mod aggregation;
mod cli;
mod fetcher;
mod identity;
mod metrics;
mod normalizer;
mod report;
mod scheduler;
mod sources;
mod sync;

use common::explorer::ExplorerClient;
use sources::{AddressBalance, ExplorerListing};
use sync::Pipeline;

#[tokio::main]
async fn main() -> Result<()> {
    let config = common::config::Config::load()?;

    let identity = common::observability::ServiceIdentity::new("vebtc-tracker", &config);
    let (dispatch, _otel_guard) =
        common::observability::build_dispatch(&identity, &config.general.log_level);
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;

    let cmd = cli::parse_args(std::env::args()).map_err(anyhow::Error::msg)?;
    let pipeline = Pipeline::from_config(&config);

    // Offline commands only read the store.
    if matches!(cmd, cli::Command::Summary | cli::Command::Distribution) {
        return cli::run_command(&pipeline, &cmd);
    }

    tracing::info!(command = ?cmd, "vebtc tracker starting");

    if let Some(port) = config.observability.prometheus_port {
        metrics::install_prometheus(port)?;
        metrics::describe();
        tracing::info!(port, "prometheus exporter listening");
    }

    let client = ExplorerClient::new(
        &config.explorer.base_url,
        Duration::from_secs(config.explorer.request_timeout_secs),
    )?;
    let locks = ExplorerListing::token_transfers(&client, &config.explorer.contract_address);
    let votes = ExplorerListing::logs(&client, &config.explorer.vote_contract_address);
    let balance = AddressBalance::new(&client, &config.explorer.contract_address);
    tracing::info!(locks = locks.url(), votes = votes.url(), "explorer endpoints");

    if cmd == cli::Command::Run {
        let outcome = pipeline
            .run_once(&locks, &votes, &balance)
            .instrument(tracing::info_span!("job_run", job = "sync"))
            .await;
        println!("{}", outcome.digest());
        return Ok(());
    }

    let (tick_tx, mut tick_rx) = tokio::sync::mpsc::channel::<()>(1);
    let _tickers = scheduler::start(vec![scheduler::JobSpec {
        name: "sync".to_string(),
        interval: Duration::from_secs(config.schedule.interval_secs),
        tick: tick_tx,
        run_immediately: true,
    }]);

    loop {
        tokio::select! {
            tick = tick_rx.recv() => {
                if tick.is_none() {
                    break;
                }
                let outcome = pipeline
                    .run_once(&locks, &votes, &balance)
                    .instrument(tracing::info_span!("job_run", job = "sync"))
                    .await;
                if outcome.is_partial() {
                    tracing::warn!(summary = %outcome.digest(), "sync finished with fetch errors");
                }
            }
            res = tokio::signal::ctrl_c() => {
                res?;
                tracing::info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}
