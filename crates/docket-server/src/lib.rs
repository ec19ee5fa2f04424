pub mod auth;
pub mod cli;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod weather;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use docket_core::config;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, info, warn};

#[tracing::instrument(skip_all)]
pub async fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let pre = cli::preprocess_args(&raw_args);
    let cli = cli::GlobalCli::parse_from(pre.cleaned_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(
        verbose = cli.verbose,
        quiet = cli.quiet,
        "starting docket server"
    );
    debug!(count = pre.rc_overrides.len(), "preprocessed rc overrides");

    let mut cfg = config::Config::load(cli.docketrc.as_deref())?;
    cfg.apply_overrides(
        pre.rc_overrides
            .into_iter()
            .chain(cli.rc_overrides.iter().map(|kv| (kv.key.clone(), kv.value.clone())))
            .chain(cli.flag_overrides()),
    );

    let state = state::AppState::from_config(&cfg, cli.data.as_deref())
        .context("failed to initialise application state")?;
    let app = routes::router(state, &cfg.get_list("cors.origins"));

    let bind = cfg
        .get("server.bind")
        .unwrap_or_else(|| "127.0.0.1:5000".to_string());
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(address = %bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            warn!(%error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                warn!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
