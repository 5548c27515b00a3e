mod cli;

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use foam_api::{HttpApi, PanelApiAdapter};
use foam_core::{
    ConfigStore, ControlPanel, LauncherRouter, MetricsHandle, noop_metrics, system,
};
use foam_exec::{DockerLauncher, ProcLauncher, ShellLauncher, cleanup_orphan_containers};
use foam_observe::{Journal, LoggerConfig, logger_init};
use foam_prometheus::PrometheusMetrics;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_cfg = LoggerConfig::from_parts(&cli.log_format, &cli.log_level)?;
    logger_init(&log_cfg)?;
    system::init_uptime();

    run(cli).await
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&cli.runs_root)
        .await
        .with_context(|| format!("creating runs directory {}", cli.runs_root.display()))?;

    let metrics: MetricsHandle = if cli.no_metrics {
        noop_metrics()
    } else {
        Arc::new(PrometheusMetrics::new().context("registering metrics")?)
    };

    let mut shell = ShellLauncher::new(cli.proc_config());
    if let Some(script) = &cli.shell_source {
        shell = shell.with_source(script);
    }
    let router = LauncherRouter::new()
        .with(Arc::new(DockerLauncher::new(cli.docker_config())))
        .with(Arc::new(shell))
        .with(Arc::new(ProcLauncher::new(cli.proc_config())));

    let config = ConfigStore::load(&cli.config);
    let panel = ControlPanel::with_metrics(cli.panel_settings(), router, config, metrics);

    let recovered = panel.recover().await.context("recovering previous runs")?;
    if !recovered.is_empty() {
        info!(count = recovered.len(), "runs from a previous server marked failed");
    }
    if system::docker_available(&cli.docker, panel.settings().docker_check_timeout).await {
        if let Err(e) = cleanup_orphan_containers(&cli.docker).await {
            warn!(error = %e, "could not remove leftover containers");
        }
    } else {
        warn!(program = %cli.docker, "docker not available; docker runs will fail until it is");
    }

    let shutdown = CancellationToken::new();
    let journal = Journal::new(panel.subscribe()).spawn(shutdown.clone());

    let app = HttpApi::new(Arc::new(PanelApiAdapter::new(panel.clone())))
        .with_shutdown(shutdown.clone())
        .router();

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("binding {}", cli.bind))?;
    info!(
        addr = %cli.bind,
        platform = system::platform(),
        arch = system::arch(),
        modes = ?panel.modes(),
        "foam-paneld listening"
    );

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_signal().await;
            info!("shutdown requested");
            signal.cancel();
        })
        .await
        .context("http server")?;

    stop_active(&panel, cli.grace() + Duration::from_secs(5)).await;
    shutdown.cancel();
    let _ = journal.await;
    info!("foam-paneld stopped");
    Ok(())
}

/// Stop the active run, if any, and wait up to `wait` for it to finish.
async fn stop_active(panel: &ControlPanel, wait: Duration) {
    let Some(run) = panel.active() else {
        return;
    };
    if let Err(e) = panel.stop(&run.run_id) {
        warn!(run_id = %run.run_id, error = %e, "could not stop active run");
        return;
    }

    let finished = tokio::time::timeout(wait, async {
        while panel
            .get(&run.run_id)
            .is_some_and(|r| r.state.is_active())
        {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;
    if finished.is_err() {
        warn!(run_id = %run.run_id, "active run did not finish before exit");
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
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
