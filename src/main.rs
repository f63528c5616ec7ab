//! Bridge Quote Engine - command line front end
//!
//! Lists routes, fetches ranked quotes across bridge providers and looks up
//! transaction status.

use anyhow::{Context, Result};
use bridge_quote_engine::chain::ProviderId;
use bridge_quote_engine::metrics::MetricsServer;
use bridge_quote_engine::quote::{Quote, QuoteSnapshot, UpdateKind};
use bridge_quote_engine::{BridgeEngine, Route, Settings, SortOrder};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "bridge-quote-engine", version, about = "Cross-chain bridge quote engine")]
struct Cli {
    /// Configuration file (defaults to $BRIDGE_CONFIG or config/default.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Emit JSON logs and JSON output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List chains, tokens and the providers serving each chain pair
    Routes {
        /// Only show routes leaving this chain
        #[arg(long)]
        from: Option<String>,
    },
    /// Fetch and rank quotes for a transfer
    Quote {
        /// Source chain id
        #[arg(long)]
        from: String,
        /// Destination chain id
        #[arg(long)]
        to: String,
        /// Source token symbol
        #[arg(long)]
        token: String,
        /// Destination token symbol (defaults to the source token)
        #[arg(long)]
        to_token: Option<String>,
        /// Amount of the source token
        #[arg(long)]
        amount: String,
        /// best-rate or fastest
        #[arg(long, default_value = "best-rate")]
        sort: SortOrder,
        /// Keep running and print auto-refreshed quotes until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// Look up a submitted transaction
    Status {
        /// Provider id (e.g. wormhole)
        #[arg(long)]
        provider: String,
        /// Transaction hash
        hash: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.json);

    // Load configuration
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    info!("Loaded configuration for chains: {:?}", settings.chain_ids());

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {:#}", e);
            }
        }))
    } else {
        None
    };

    let engine = BridgeEngine::from_settings(&settings);

    let result = match cli.command {
        Command::Routes { from } => print_routes(&engine, from.as_deref(), cli.json),
        Command::Quote {
            from,
            to,
            token,
            to_token,
            amount,
            sort,
            watch,
        } => {
            let to_token = to_token.unwrap_or_else(|| token.clone());
            let route = Route::new(from, to, token, to_token, &amount)?;
            run_quote(&engine, route, sort, watch, cli.json).await
        }
        Command::Status { provider, hash } => {
            let status = engine
                .orchestrator
                .check_status(&ProviderId::new(provider), &hash)
                .await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!(
                    "{}  {:?}  confirmations={}  block={}",
                    status.hash,
                    status.state,
                    status.confirmations,
                    status
                        .block_number
                        .map(|b| b.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
            Ok(())
        }
    };

    engine.shutdown().await;
    if let Some(h) = metrics_handle {
        h.abort();
    }

    result
}

fn print_routes(engine: &BridgeEngine, from: Option<&str>, json: bool) -> Result<()> {
    let mut routes = Vec::new();
    for source in engine.catalog.chains() {
        if from.is_some_and(|f| f != source.id) {
            continue;
        }
        for destination in engine.catalog.chains() {
            if source.id == destination.id {
                continue;
            }
            let providers = engine.resolver.eligible_providers(&source.id, &destination.id);
            if providers.is_empty() {
                continue;
            }
            routes.push(serde_json::json!({
                "source": source.id,
                "destination": destination.id,
                "providers": providers,
                "sourceTokens": engine
                    .catalog
                    .tokens_for_chain(&source.id)
                    .iter()
                    .map(|t| t.symbol.as_str())
                    .collect::<Vec<_>>(),
            }));
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&routes)?);
    } else {
        for route in &routes {
            println!(
                "{} -> {}  providers: {}  tokens: {}",
                route["source"].as_str().unwrap_or_default(),
                route["destination"].as_str().unwrap_or_default(),
                route["providers"],
                route["sourceTokens"]
            );
        }
    }
    Ok(())
}

async fn run_quote(
    engine: &BridgeEngine,
    route: Route,
    sort: SortOrder,
    watch: bool,
    json: bool,
) -> Result<()> {
    engine.aggregator.set_sort_order(sort).await;
    let mut stream = engine.aggregator.fetch_quotes(route).await?;

    if !watch {
        let snapshot = stream
            .until_complete()
            .await
            .context("Quote request ended before every provider answered")?;
        return print_snapshot(&snapshot, json);
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping...");
                return Ok(());
            }
            update = stream.next_update() => {
                let Some(update) = update else {
                    warn!("Quote stream closed");
                    return Ok(());
                };
                if update.kind == UpdateKind::Refresh {
                    info!("Refreshed {} quote", update.quote.provider);
                }
                if update.snapshot.is_complete() {
                    print_snapshot(&update.snapshot, json)?;
                }
            }
        }
    }
}

fn print_snapshot(snapshot: &QuoteSnapshot, json: bool) -> Result<()> {
    let quotes = snapshot.quotes();
    if json {
        println!("{}", serde_json::to_string_pretty(&quotes)?);
        return Ok(());
    }

    for (rank, quote) in quotes.iter().enumerate() {
        println!("{:>2}. {}", rank + 1, describe(quote));
    }
    Ok(())
}

fn describe(quote: &Quote) -> String {
    match &quote.error {
        Some(e) => format!(
            "{:<12} unavailable: {} ({})",
            quote.provider,
            e.user_message(),
            e.action().label()
        ),
        None => format!(
            "{:<12} receive {:<14} fees ${:<8} time {:<10} expires in {}s",
            quote.provider,
            quote.estimated_receive_amount,
            quote.fees.total,
            quote.estimated_time,
            quote.time_to_expiry().as_secs()
        ),
    }
}

fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bridge_quote_engine=debug,hyper=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
