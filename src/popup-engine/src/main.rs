//! Popup Engine: replays a scripted storefront visit against a set of popup
//! definitions and reports what the visitor would have seen.

mod sim;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use popup_core::config::AppConfig;
use popup_core::event_bus::SignalSink;
use popup_core::types::PopupDefinition;
use popup_web_sdk::{HttpSignalSink, HttpTransport, PopupFeed, SignalCollector};
use serde::Serialize;
use tracing::{info, warn};

use crate::sim::{Simulation, TeeSink, VisitScript};

#[derive(Parser, Debug)]
#[command(name = "popup-engine")]
#[command(about = "Storefront popup targeting engine: simulate a visit")]
#[command(version)]
struct Cli {
    /// Visit script (JSON: viewport, page, country, steps)
    #[arg(long)]
    script: PathBuf,

    /// Definitions feed file; fetched from the backend when omitted
    #[arg(long)]
    definitions: Option<PathBuf>,

    /// Shop domain (overrides config)
    #[arg(long, env = "POPUP_ENGINE__SHOP")]
    shop: Option<String>,

    /// Backend base URL (overrides config)
    #[arg(long, env = "POPUP_ENGINE__API_BASE_URL")]
    api_base_url: Option<String>,

    /// Visitor country, skipping the geo lookup
    #[arg(long)]
    country: Option<String>,

    /// Never touch the network: no feed fetch, geo lookup, event posts or subscribe calls
    #[arg(long, default_value_t = false)]
    offline: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    shop: String,
    displayed: Vec<String>,
    popups: Vec<popup_web_sdk::PopupMetrics>,
    summary: popup_web_sdk::ShopSummary,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "popup_engine=info,popup_targeting=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(shop) = cli.shop {
        config.shop = shop;
    }
    if let Some(url) = cli.api_base_url {
        config.api_base_url = url;
    }

    info!(
        shop = %config.shop,
        api_base_url = %config.api_base_url,
        offline = cli.offline,
        "Configuration loaded"
    );

    let raw_script = std::fs::read_to_string(&cli.script)
        .with_context(|| format!("reading visit script {}", cli.script.display()))?;
    let mut script: VisitScript =
        serde_json::from_str(&raw_script).context("parsing visit script")?;
    if cli.country.is_some() {
        script.country = cli.country;
    }

    let transport = if cli.offline {
        None
    } else {
        Some(Arc::new(HttpTransport::new(&config)?))
    };

    let definitions = load_definitions(cli.definitions.as_ref(), transport.as_deref(), &config.shop).await?;
    info!(count = definitions.len(), "Popup definitions ready");

    let collector = Arc::new(SignalCollector::new());
    let (remote, delivery) = match &transport {
        Some(transport) => {
            let (sink, handle) =
                HttpSignalSink::spawn(transport.clone(), config.transport.queue_capacity);
            (Some(Arc::new(sink) as Arc<dyn SignalSink>), Some(handle))
        }
        None => (None, None),
    };
    let sink = Arc::new(TeeSink {
        collector: collector.clone(),
        remote,
    });

    let mut simulation = Simulation::new(config.clone(), &script, definitions, sink, transport);
    let displayed = simulation.run(&script).await?;
    info!(phase = ?simulation.engine().phase(), displayed = displayed.len(), "Visit finished");

    // dropping the simulation drops the last sender, letting delivery drain
    drop(simulation);
    if let Some(handle) = delivery {
        if let Err(e) = handle.await {
            warn!(error = %e, "Signal delivery task failed");
        }
    }

    let report = Report {
        summary: collector.shop_summary(&config.shop),
        popups: collector.all_metrics(),
        shop: config.shop,
        displayed,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn load_definitions(
    path: Option<&PathBuf>,
    transport: Option<&HttpTransport>,
    shop: &str,
) -> anyhow::Result<Vec<PopupDefinition>> {
    if let Some(path) = path {
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("reading definitions {}", path.display()))?;
        return Ok(PopupFeed::parse(&body)?.into_definitions());
    }
    match transport {
        Some(transport) => Ok(transport.fetch_definitions(shop).await?),
        None => anyhow::bail!("--definitions is required with --offline"),
    }
}
