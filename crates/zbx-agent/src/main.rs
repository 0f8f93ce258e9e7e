//! zbx-agent -- passive/active monitoring agent.
//!
//! Usage:
//!   zbx-agent                          # Serve passive checks (default)
//!   zbx-agent --config path.toml serve
//!   zbx-agent active                   # Register and push active checks
//!   zbx-agent query 127.0.0.1:10050 agent.ping
//!   zbx-agent gen-cert cert.pem key.pem --name localhost

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use zbx_agent::config::AgentConfig;
use zbx_agent::{expand_tilde, logging, ActiveSession, ItemSource, QueryReply, StaticItems};
use zbx_protocol::SupportedItem;

#[derive(Parser)]
#[command(name = "zbx-agent", about = "Passive and active ZBX monitoring agent")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "zbx-agent.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer passive checks (default)
    Serve,
    /// Register with the server and push active checks
    Active,
    /// Ask an agent for one item
    Query {
        /// Agent address (host:port)
        addr: String,
        /// Item key
        key: String,
    },
    /// Write a self-signed certificate and key
    GenCert {
        cert: String,
        key: String,
        /// Subject alternative names
        #[arg(long = "name", default_value = "localhost")]
        names: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = AgentConfig::load_or_default(&expand_tilde(&cli.config))?;
    logging::init(cfg.log.format);

    match cli.command {
        Some(Commands::Serve) | None => run_passive(cfg).await?,
        Some(Commands::Active) => run_active(cfg).await?,
        Some(Commands::Query { addr, key }) => {
            let dialer = cfg.dialer(&addr)?;
            match zbx_agent::query(&dialer, &key).await? {
                QueryReply::Value(value) => println!("{value}"),
                QueryReply::NotSupported(reason) => {
                    eprintln!("not supported: {reason}");
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::GenCert { cert, key, names }) => {
            let generated = zbx_protocol::tls::generate_self_signed(names)?;
            std::fs::write(&cert, generated.cert_pem)?;
            std::fs::write(&key, generated.key_pem)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&key, std::fs::Permissions::from_mode(0o600))?;
            }
            println!("Certificate: {cert}");
            println!("Key: {key}");
        }
    }

    Ok(())
}

async fn run_passive(cfg: AgentConfig) -> anyhow::Result<()> {
    let source = StaticItems::new(cfg.agent.hostname.clone(), cfg.items.clone());
    let listener = cfg.listener().await?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        hostname = %cfg.agent.hostname,
        items = cfg.items.len(),
        "starting zbx-agent (passive)"
    );

    zbx_agent::serve(listener, Arc::new(source), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    })
    .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn run_active(cfg: AgentConfig) -> anyhow::Result<()> {
    let source = StaticItems::new(cfg.agent.hostname.clone(), cfg.items.clone());
    let dialer = cfg.dialer(&cfg.active.server_addr)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        hostname = %cfg.agent.hostname,
        server = %cfg.active.server_addr,
        "starting zbx-agent (active)"
    );

    let (session, items) = ActiveSession::start(cfg.agent.hostname.clone(), dialer).await?;
    for item in &items {
        tracing::info!(key = %item.key, itemid = item.item_id, delay = %item.delay, "supported item");
    }

    let mut ticker =
        tokio::time::interval(Duration::from_secs(cfg.active.push_interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let values = collect_values(&source, &items);
                if values.is_empty() {
                    tracing::debug!("no values to push");
                    continue;
                }
                let count = values.len();
                match session.push(values).await {
                    Ok(()) => tracing::info!(values = count, "pushed active checks"),
                    Err(e) => tracing::warn!(error = %e, "push failed, retrying next tick"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down...");
                break;
            }
        }
    }

    Ok(())
}

/// Values for every supported item the local source can resolve.
fn collect_values(source: &StaticItems, items: &[SupportedItem]) -> BTreeMap<u64, String> {
    items
        .iter()
        .filter_map(|item| match source.resolve(&item.key) {
            Ok(Some(value)) => Some((item.item_id, value.to_string())),
            Ok(None) => {
                tracing::debug!(key = %item.key, "no local value for supported item");
                None
            }
            Err(e) => {
                tracing::warn!(key = %item.key, error = %e, "failed to resolve supported item");
                None
            }
        })
        .collect()
}
