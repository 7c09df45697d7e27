//! Post-execution effectiveness evaluation.
//!
//! The evaluator decides an issue's outcome after a strategy has run. It is
//! a swappable policy: the shipped implementation is deterministic, driven
//! by the strategy's base effectiveness; a deployment that can re-measure
//! the underlying metric can substitute its own.

use serde::{Deserialize, Serialize};

use crate::heal::{Issue, ResolutionStrategy};

/// Pipeline outcome for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Resolved,
    Pending,
    Failed,
}

/// Pluggable policy deciding an issue's post-execution outcome.
pub trait EffectivenessEvaluator: Send + Sync {
    fn evaluate(
        &self,
        strategy: &ResolutionStrategy,
        issue: &Issue,
        manual_resolution: bool,
        commands_succeeded: bool,
    ) -> Verdict;
}

/// Deterministic default policy.
///
/// Failed commands always fail the run. Otherwise the strategy's base
/// effectiveness, plus an explicit boost for operator-triggered runs, must
/// exceed the resolve threshold; anything short stays pending for retry.
#[derive(Debug, Clone)]
pub struct ThresholdEvaluator {
    pub manual_boost: f64,
    pub resolve_threshold: f64,
}

impl Default for ThresholdEvaluator {
    fn default() -> Self {
        Self {
            manual_boost: 0.15,
            resolve_threshold: 0.7,
        }
    }
}

impl EffectivenessEvaluator for ThresholdEvaluator {
    fn evaluate(
        &self,
        strategy: &ResolutionStrategy,
        _issue: &Issue,
        manual_resolution: bool,
        commands_succeeded: bool,
    ) -> Verdict {
        if !commands_succeeded {
            return Verdict::Failed;
        }

        let boost = if manual_resolution {
            self.manual_boost
        } else {
            0.0
        };
        let effectiveness = (strategy.base_effectiveness + boost).min(1.0);

        if effectiveness > self.resolve_threshold {
            Verdict::Resolved
        } else {
            Verdict::Pending
        }
    }
}

/// Always returns the same verdict. Test policy.
#[derive(Debug, Clone, Copy)]
pub struct FixedEvaluator(pub Verdict);

impl EffectivenessEvaluator for FixedEvaluator {
    fn evaluate(&self, _: &ResolutionStrategy, _: &Issue, _: bool, _: bool) -> Verdict {
        self.0
    }
}
