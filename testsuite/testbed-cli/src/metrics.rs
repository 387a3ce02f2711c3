// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result, bail};
use axum::{Extension, Json, Router, http::StatusCode, response::IntoResponse, routing::get};
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use std::{
    collections::HashSet,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use testbed::{Committee, display};
use tokio::{net::TcpListener, sync::RwLock, time::sleep};
use tracing::info;
use url::Url;
use validator_metrics::{DEFAULT_THRESHOLDS_FILE, MetricsCollector, MetricsTable, MetricsThresholds};

#[derive(Subcommand, Debug)]
pub enum MetricsCommand {
    /// Scrape once and print the table
    Collect {
        #[clap(flatten)]
        args: MetricsArgs,
        /// Also write the table to this CSV file
        #[clap(long)]
        csv: Option<PathBuf>,
    },
    /// Redraw the table until interrupted
    Watch {
        #[clap(flatten)]
        args: MetricsArgs,
        #[clap(long, default_value_t = 5)]
        interval_secs: u64,
    },
    /// Serve the latest table as JSON
    Serve {
        #[clap(flatten)]
        args: MetricsArgs,
        #[clap(long, default_value_t = 5)]
        interval_secs: u64,
        #[clap(long, default_value = "0.0.0.0:9400")]
        listen: SocketAddr,
    },
}

#[derive(Parser, Debug)]
pub struct MetricsArgs {
    /// Committee file listing each authority's metrics address
    #[clap(long, default_value = ".proto/.committee.json")]
    committee: PathBuf,
    /// Metrics to collect, with their alert thresholds
    #[clap(long, default_value = DEFAULT_THRESHOLDS_FILE)]
    thresholds: PathBuf,
    /// Per-endpoint fetch timeout
    #[clap(long, default_value_t = 4)]
    timeout_secs: u64,
    /// Columns per printed block
    #[clap(long, default_value_t = 6)]
    chunk_size: usize,
}

/// Everything needed to scrape the committee repeatedly.
struct Scraper {
    collector: MetricsCollector,
    endpoints: IndexMap<String, Url>,
    thresholds: MetricsThresholds,
    metric_names: HashSet<String>,
    chunk_size: usize,
}

impl Scraper {
    fn new(args: &MetricsArgs) -> Result<Self> {
        let committee = Committee::load(&args.committee)
            .with_context(|| format!("Failed to load committee {}", args.committee.display()))?;
        let endpoints = committee.metrics_endpoints();
        if endpoints.is_empty() {
            bail!("No authority of {} exposes a metrics address", args.committee.display());
        }
        let thresholds = MetricsThresholds::load(&args.thresholds)?;
        let metric_names = thresholds.metric_names();
        Ok(Self {
            collector: MetricsCollector::new(Duration::from_secs(args.timeout_secs))?,
            endpoints,
            thresholds,
            metric_names,
            chunk_size: args.chunk_size,
        })
    }

    async fn collect(&self) -> MetricsTable {
        self.collector.collect(&self.endpoints, &self.metric_names).await
    }

    fn print(&self, table: &MetricsTable) {
        let (consensus, channels) = table.split_columns();
        display::heading("Consensus metrics");
        display::info(&table.render(&consensus, self.chunk_size));
        if !channels.is_empty() {
            display::heading("Channel metrics");
            display::info(&table.render(&channels, self.chunk_size));
        }
        for authority in table.authorities() {
            let Some(row) = table.row(authority) else {
                continue;
            };
            if row.is_empty() {
                display::warn(&format!("{}: no metrics", authority));
            }
            for (metric, value, threshold) in self.thresholds.exceeded(row) {
                display::warn(&format!(
                    "{}: {} is {} (threshold {})",
                    authority, metric, value, threshold
                ));
            }
        }
    }
}

pub async fn run(command: MetricsCommand) -> Result<()> {
    match command {
        MetricsCommand::Collect { args, csv } => {
            let scraper = Scraper::new(&args)?;
            let table = scraper.collect().await;
            scraper.print(&table);
            if let Some(path) = csv {
                table.save_csv(&path)?;
                display::info(&format!("Wrote {}", path.display()));
            }
        },
        MetricsCommand::Watch { args, interval_secs } => {
            let scraper = Scraper::new(&args)?;
            loop {
                let table = scraper.collect().await;
                // Clear the screen and home the cursor.
                print!("\x1B[2J\x1B[1;1H");
                scraper.print(&table);
                tokio::select! {
                    _ = sleep(Duration::from_secs(interval_secs)) => {},
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        },
        MetricsCommand::Serve {
            args,
            interval_secs,
            listen,
        } => serve(Scraper::new(&args)?, Duration::from_secs(interval_secs), listen).await?,
    }
    Ok(())
}

type LatestTable = Arc<RwLock<MetricsTable>>;

fn build_router(latest: LatestTable) -> Router {
    Router::new()
        .route("/metrics", get(handle_latest))
        .layer(Extension(latest))
}

async fn handle_latest(Extension(latest): Extension<LatestTable>) -> impl IntoResponse {
    let table = latest.read().await;
    if table.is_empty() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "no data yet" })),
        );
    }
    match serde_json::to_value(&*table) {
        Ok(value) => (StatusCode::OK, Json(value)),
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": error.to_string() })),
        ),
    }
}

async fn serve(scraper: Scraper, interval: Duration, listen: SocketAddr) -> Result<()> {
    let latest = LatestTable::default();
    let refresh = latest.clone();
    tokio::spawn(async move {
        loop {
            let table = scraper.collect().await;
            *refresh.write().await = table;
            sleep(interval).await;
        }
    });

    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {}", listen))?;
    info!("Serving metrics on http://{}/metrics", listen);
    axum::serve(listener, build_router(latest)).await?;
    Ok(())
}
