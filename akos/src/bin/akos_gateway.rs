//! AKOS gateway daemon: assembles the kernel, starts the reconciler
//! heartbeat, and serves the REST surface until interrupted.

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::watch;

use akos::{gateway, KernelConfig, Reconciler, AKOS};

#[derive(Parser, Debug)]
#[command(name = "akos-gateway", about = "AKOS autonomy kernel gateway")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long, env = "AKOS_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address override (e.g. 0.0.0.0:8700).
    #[arg(long, env = "AKOS_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // fmt().init() installs the tracing-log bridge, so the kernel's `log`
    // macros land in the same subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => KernelConfig::load(path)?,
        None => KernelConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    let bind_addr = config.bind_addr.clone();
    let kernel = AKOS::new(config)?;

    // A file-backed ledger is verified before anything executes against it.
    kernel.ledger.ensure_chain_integrity()?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let heartbeat = tokio::spawn(Reconciler::run(kernel.reconciler.clone(), stop_rx));

    let server = gateway::serve(kernel, &bind_addr);
    tokio::select! {
        result = server => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("[Gateway] Shutdown signal received");
        }
    }

    let _ = stop_tx.send(true);
    let _ = heartbeat.await;
    Ok(())
}
