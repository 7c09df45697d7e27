//! Anomaly detection -- observation window, outlier model, classification.

pub mod classifier;
pub mod model;

pub use classifier::{Detector, DetectorSettings};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("insufficient baseline data: need {needed} samples, have {have}")]
    InsufficientBaseline { needed: usize, have: usize },
}

/// One sampled network feature vector with a capture timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub latency_ms: f64,
    pub bandwidth_mbps: f64,
    pub packet_loss_pct: f64,
    pub captured_at: DateTime<Utc>,
}

impl Observation {
    pub const FEATURE_COUNT: usize = 3;

    pub fn features(&self) -> [f64; Self::FEATURE_COUNT] {
        [self.latency_ms, self.bandwidth_mbps, self.packet_loss_pct]
    }

    pub fn snapshot(&self) -> FeatureSnapshot {
        FeatureSnapshot {
            latency_ms: self.latency_ms,
            bandwidth_mbps: self.bandwidth_mbps,
            packet_loss_pct: self.packet_loss_pct,
        }
    }
}

/// Raw feature values carried by a general (unclassified) anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub latency_ms: f64,
    pub bandwidth_mbps: f64,
    pub packet_loss_pct: f64,
}

/// Closed set of anomaly kinds, each carrying its own detail payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "details", rename_all = "snake_case")]
pub enum AnomalyKind {
    HighLatency { latency_ms: f64, threshold_ms: f64 },
    PacketLoss { packet_loss_pct: f64, threshold_pct: f64 },
    GeneralAnomaly { features: FeatureSnapshot },
}

impl AnomalyKind {
    /// Stable label used in audit records and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            AnomalyKind::HighLatency { .. } => "high_latency",
            AnomalyKind::PacketLoss { .. } => "packet_loss",
            AnomalyKind::GeneralAnomaly { .. } => "general_anomaly",
        }
    }
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A classified deviation. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(flatten)]
    pub kind: AnomalyKind,
    pub score: f64,
    pub detected_at: DateTime<Utc>,
}
