//! NetMedic -- self-healing network monitor.
//!
//! This crate provides the core library for periodic network observation,
//! statistical anomaly detection, and the issue-resolution engine that
//! tracks, remediates, and retries detected problems.

pub mod api;
pub mod config;
pub mod detect;
pub mod heal;
pub mod monitor;
pub mod notify;
pub mod store;

use anyhow::Result;

use crate::config::NetmedicConfig;
use crate::detect::Detector;
use crate::heal::exec::{CommandRunner, ShellRunner, SimulatedRunner};
use crate::heal::{Resolver, StrategyTable, ThresholdEvaluator};
use crate::store::IssueStore;

/// Build the resolution engine from configuration and persisted state.
pub fn build_resolver(config: &NetmedicConfig) -> Result<Resolver> {
    let store = IssueStore::open(&config.store.data_dir)?;
    let runner: Box<dyn CommandRunner> = if config.healing.simulate_commands {
        Box::new(SimulatedRunner)
    } else {
        Box::new(ShellRunner)
    };
    let evaluator = ThresholdEvaluator {
        manual_boost: config.healing.manual_boost,
        resolve_threshold: config.healing.resolve_threshold,
    };
    Resolver::new(
        store,
        StrategyTable::default(),
        Box::new(evaluator),
        runner,
        config.healing.resolver_settings(),
    )
}

/// Start the NetMedic daemon: monitor loop, retry sweep, and API server.
pub async fn serve(bind: &str, config: NetmedicConfig) -> Result<()> {
    let resolver = build_resolver(&config)?;
    let status = monitor::new_status_handle();
    let detector = Detector::new(config.detector.clone());

    tokio::spawn(heal::engine::run_sweep_loop(resolver.clone()));
    tokio::spawn(monitor::run_monitor_loop(
        config.monitor.clone(),
        detector,
        resolver.clone(),
        status.clone(),
    ));

    let addr: std::net::SocketAddr = bind.parse()?;
    let app = api::router(api::AppState { resolver, status });

    tracing::info!(%addr, "NetMedic listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
