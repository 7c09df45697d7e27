//! Static resolution strategies, keyed by anomaly kind.

use std::time::Duration;

use crate::detect::AnomalyKind;

/// The fixed action plan associated with an anomaly kind: shell commands,
/// a settling period before judging success, and a base effectiveness used
/// by the default evaluator.
#[derive(Debug, Clone)]
pub struct ResolutionStrategy {
    pub name: String,
    pub description: String,
    pub commands: Vec<String>,
    pub verification_wait: Duration,
    pub base_effectiveness: f64,
}

/// Deterministic lookup table: one strategy per specific kind plus a
/// default fallback for everything else.
#[derive(Debug, Clone)]
pub struct StrategyTable {
    high_latency: ResolutionStrategy,
    packet_loss: ResolutionStrategy,
    fallback: ResolutionStrategy,
}

impl Default for StrategyTable {
    fn default() -> Self {
        Self {
            high_latency: ResolutionStrategy {
                name: "Flush DNS and Reset Network".to_string(),
                description: "Flush DNS cache and renew the DHCP lease to resolve latency issues"
                    .to_string(),
                commands: vec![
                    "systemd-resolve --flush-caches".to_string(),
                    "dhclient -r".to_string(),
                    "dhclient".to_string(),
                ],
                verification_wait: Duration::from_secs(5),
                base_effectiveness: 0.8,
            },
            packet_loss: ResolutionStrategy {
                name: "Reset Network Adapter".to_string(),
                description: "Cycle the network adapter to resolve packet loss issues".to_string(),
                commands: vec![
                    "echo 'Disabling network adapter...'".to_string(),
                    "sleep 2".to_string(),
                    "echo 'Enabling network adapter...'".to_string(),
                ],
                verification_wait: Duration::from_secs(5),
                base_effectiveness: 0.7,
            },
            fallback: ResolutionStrategy {
                name: "Basic Network Troubleshooting".to_string(),
                description: "Basic troubleshooting steps for general network issues".to_string(),
                commands: vec![
                    "systemd-resolve --flush-caches".to_string(),
                    "echo 'Checking interface state...'".to_string(),
                ],
                verification_wait: Duration::from_secs(3),
                base_effectiveness: 0.5,
            },
        }
    }
}

impl StrategyTable {
    /// Look up the strategy for an anomaly kind; unrecognized or generic
    /// kinds fall back to the default plan.
    pub fn for_kind(&self, kind: &AnomalyKind) -> &ResolutionStrategy {
        match kind {
            AnomalyKind::HighLatency { .. } => &self.high_latency,
            AnomalyKind::PacketLoss { .. } => &self.packet_loss,
            AnomalyKind::GeneralAnomaly { .. } => &self.fallback,
        }
    }

    /// Override every strategy's verification wait. Used to keep test
    /// pipelines from sleeping.
    pub fn with_verification_wait(mut self, wait: Duration) -> Self {
        self.high_latency.verification_wait = wait;
        self.packet_loss.verification_wait = wait;
        self.fallback.verification_wait = wait;
        self
    }
}
