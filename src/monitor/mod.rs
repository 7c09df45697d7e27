//! Periodic network metric sampling.
//!
//! Collects one observation per tick -- a reachability-checked, simulated
//! metric set in this appliance build -- publishes a rolling status
//! snapshot for the API, and feeds the detector. A flagged anomaly is
//! handed straight to the resolution engine; detection errors skip the
//! cycle without creating state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::detect::{Detector, Observation};
use crate::heal::Resolver;

const METRICS_HISTORY_CAP: usize = 100;

/// Sampler tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Seconds between observation ticks.
    pub interval_sec: u64,
    /// host:port probed to decide whether the uplink is reachable.
    pub probe_target: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_sec: 5,
            probe_target: "8.8.8.8:53".to_string(),
        }
    }
}

/// Overall health rollup derived from the latest metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Good,
    Warning,
    Critical,
}

/// One point of the rolling metrics history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSample {
    pub timestamp: DateTime<Utc>,
    pub latency_ms: f64,
    pub bandwidth_mbps: f64,
    pub packet_loss_pct: f64,
}

/// Rolling status published to the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub last_updated: Option<DateTime<Utc>>,
    pub overall_health: Health,
    pub latency_ms: f64,
    pub bandwidth_mbps: f64,
    pub packet_loss_pct: f64,
    pub connected_devices: u32,
    pub metrics_history: Vec<MetricsSample>,
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self {
            last_updated: None,
            overall_health: Health::Good,
            latency_ms: 0.0,
            bandwidth_mbps: 0.0,
            packet_loss_pct: 0.0,
            connected_devices: 0,
            metrics_history: Vec::new(),
        }
    }
}

pub type StatusHandle = Arc<RwLock<NetworkStatus>>;

pub fn new_status_handle() -> StatusHandle {
    Arc::new(RwLock::new(NetworkStatus::default()))
}

/// TCP reachability check with a one second budget.
pub async fn probe_reachable(target: &str) -> bool {
    matches!(
        tokio::time::timeout(
            Duration::from_secs(1),
            tokio::net::TcpStream::connect(target)
        )
        .await,
        Ok(Ok(_))
    )
}

/// Simulated metric draw. Latency degrades to a sentinel 1000ms and packet
/// loss spikes when the uplink probe fails.
fn simulate_metrics(reachable: bool) -> (f64, f64, f64, u32) {
    let mut rng = rand::thread_rng();
    let latency_ms = if reachable {
        rng.gen_range(10.0..100.0)
    } else {
        1000.0
    };
    let bandwidth_mbps = rng.gen_range(5.0..50.0);
    let packet_loss_pct = if reachable {
        0.0
    } else {
        rng.gen_range(10.0..50.0)
    };
    let connected_devices = (1..=3u32).filter(|_| rng.gen_bool(0.9)).count() as u32;
    (latency_ms, bandwidth_mbps, packet_loss_pct, connected_devices)
}

fn health_for(latency_ms: f64, packet_loss_pct: f64) -> Health {
    if latency_ms > 500.0 || packet_loss_pct > 20.0 {
        Health::Critical
    } else if latency_ms > 200.0 || packet_loss_pct > 5.0 {
        Health::Warning
    } else {
        Health::Good
    }
}

/// Collect one observation and fold it into the published status.
pub async fn collect_metrics(settings: &MonitorSettings, status: &StatusHandle) -> Observation {
    let reachable = probe_reachable(&settings.probe_target).await;
    let (latency_ms, bandwidth_mbps, packet_loss_pct, connected_devices) =
        simulate_metrics(reachable);
    let now = Utc::now();

    let obs = Observation {
        latency_ms,
        bandwidth_mbps,
        packet_loss_pct,
        captured_at: now,
    };

    {
        let mut status = status.write().await;
        status.last_updated = Some(now);
        status.latency_ms = latency_ms;
        status.bandwidth_mbps = bandwidth_mbps;
        status.packet_loss_pct = packet_loss_pct;
        status.connected_devices = connected_devices;
        status.overall_health = health_for(latency_ms, packet_loss_pct);
        status.metrics_history.push(MetricsSample {
            timestamp: now,
            latency_ms,
            bandwidth_mbps,
            packet_loss_pct,
        });
        let len = status.metrics_history.len();
        if len > METRICS_HISTORY_CAP {
            status.metrics_history.drain(..len - METRICS_HISTORY_CAP);
        }
        info!(
            health = ?status.overall_health,
            latency_ms,
            packet_loss_pct,
            "network status updated"
        );
    }

    obs
}

/// Sampler loop: one observation per tick, flagged anomalies handed to the
/// resolution engine. The detector is owned here exclusively.
pub async fn run_monitor_loop(
    settings: MonitorSettings,
    mut detector: Detector,
    resolver: Resolver,
    status: StatusHandle,
) {
    info!(interval_sec = settings.interval_sec, "network monitor started");
    let mut interval = tokio::time::interval(Duration::from_secs(settings.interval_sec.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let obs = collect_metrics(&settings, &status).await;
        if let Some(anomaly) = detector.observe(&obs) {
            warn!(kind = %anomaly.kind, score = anomaly.score, "anomaly detected");
            resolver.handle_anomaly(anomaly).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_thresholds() {
        assert_eq!(health_for(50.0, 1.0), Health::Good);
        assert_eq!(health_for(250.0, 1.0), Health::Warning);
        assert_eq!(health_for(50.0, 8.0), Health::Warning);
        assert_eq!(health_for(600.0, 1.0), Health::Critical);
        assert_eq!(health_for(50.0, 30.0), Health::Critical);
    }

    #[test]
    fn test_unreachable_metrics_degrade() {
        let (latency, _, loss, _) = simulate_metrics(false);
        assert_eq!(latency, 1000.0);
        assert!(loss >= 10.0);

        let (latency, _, loss, _) = simulate_metrics(true);
        assert!(latency < 100.0);
        assert_eq!(loss, 0.0);
    }

    #[tokio::test]
    async fn test_collect_metrics_caps_history() {
        let settings = MonitorSettings {
            // Unroutable on any sane host; probe times out quickly.
            probe_target: "127.0.0.1:1".to_string(),
            ..Default::default()
        };
        let status = new_status_handle();

        for _ in 0..3 {
            collect_metrics(&settings, &status).await;
        }

        let snapshot = status.read().await.clone();
        assert_eq!(snapshot.metrics_history.len(), 3);
        assert!(snapshot.last_updated.is_some());
    }
}
