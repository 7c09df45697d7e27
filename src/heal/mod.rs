//! Issue lifecycle and automated remediation.

pub mod engine;
pub mod evaluator;
pub mod exec;
pub mod strategy;

pub use engine::{ResolveOutcome, Resolver, ResolverSettings};
pub use evaluator::{EffectivenessEvaluator, ThresholdEvaluator, Verdict};
pub use strategy::{ResolutionStrategy, StrategyTable};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::detect::{Anomaly, AnomalyKind};

/// Lifecycle state of a tracked issue.
///
/// `Resolved` and `Failed` are only ever set by the resolution pipeline's
/// evaluator step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    New,
    Resolving,
    Pending,
    Resolved,
    Failed,
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IssueStatus::New => "new",
            IssueStatus::Resolving => "resolving",
            IssueStatus::Pending => "pending",
            IssueStatus::Resolved => "resolved",
            IssueStatus::Failed => "failed",
        };
        f.pad(s)
    }
}

/// Outcome of one command batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub messages: Vec<String>,
}

/// One recorded pipeline run against an issue. Appended, never removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionAction {
    pub timestamp: DateTime<Utc>,
    pub strategy: String,
    pub commands: Vec<String>,
    pub result: ActionResult,
}

/// The tracked remediation unit, created from exactly one anomaly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: IssueStatus,
    pub anomaly: Anomaly,
    pub detected_at: DateTime<Utc>,
    pub resolution_attempts: u32,
    pub resolution_actions: Vec<ResolutionAction>,
    pub manual_resolution: bool,
}

impl Issue {
    pub fn from_anomaly(anomaly: Anomaly) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title_for(&anomaly.kind).to_string(),
            description: description_for(&anomaly.kind),
            status: IssueStatus::New,
            detected_at: anomaly.detected_at,
            resolution_attempts: 0,
            resolution_actions: Vec::new(),
            manual_resolution: false,
            anomaly,
        }
    }
}

fn title_for(kind: &AnomalyKind) -> &'static str {
    match kind {
        AnomalyKind::HighLatency { .. } => "High Network Latency Detected",
        AnomalyKind::PacketLoss { .. } => "Packet Loss Issues Detected",
        AnomalyKind::GeneralAnomaly { .. } => "Network Anomaly Detected",
    }
}

fn description_for(kind: &AnomalyKind) -> String {
    match kind {
        AnomalyKind::HighLatency {
            latency_ms,
            threshold_ms,
        } => format!(
            "Network latency is high ({latency_ms:.0}ms), exceeding the threshold of {threshold_ms:.0}ms."
        ),
        AnomalyKind::PacketLoss {
            packet_loss_pct, ..
        } => format!("Packet loss of {packet_loss_pct:.1}% detected on the network."),
        AnomalyKind::GeneralAnomaly { features } => format!(
            "Unusual network behavior detected. Metrics: latency: {:.2}ms, bandwidth: {:.2}Mbps, packet loss: {:.2}%",
            features.latency_ms, features.bandwidth_mbps, features.packet_loss_pct
        ),
    }
}

/// Immutable audit record of one completed (resolved or failed) pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub issue_id: Uuid,
    pub anomaly_kind: String,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_success: bool,
    pub resolution_actions: Vec<ResolutionAction>,
}
