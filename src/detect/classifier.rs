//! Observation intake and anomaly classification.
//!
//! The detector owns the outlier model exclusively. Each observation is
//! appended to the window; once enough data has accumulated the model is
//! fitted (and periodically refitted), after which observations are scored
//! and, when flagged, classified into a typed anomaly by fixed threshold
//! rules -- most specific rule first, generic fallback last.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::detect::model::OutlierModel;
use crate::detect::{Anomaly, AnomalyKind, Observation};

/// Tuning knobs for the detector. Defaults match the shipped monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Maximum observations retained in the window.
    pub window_size: usize,
    /// Observations required before the first fit.
    pub warmup_size: usize,
    /// Observations between refits once warmed up.
    pub retrain_interval: usize,
    /// Z-score above which an observation is flagged anomalous.
    pub z_threshold: f64,
    /// Raw latency threshold for the high-latency rule (ms).
    pub latency_threshold_ms: f64,
    /// Raw packet-loss threshold for the packet-loss rule (%).
    pub packet_loss_threshold_pct: f64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            window_size: 1000,
            warmup_size: 50,
            retrain_interval: 500,
            z_threshold: 3.0,
            latency_threshold_ms: 200.0,
            packet_loss_threshold_pct: 10.0,
        }
    }
}

/// User feedback on a flagged anomaly, kept for future calibration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub anomaly_id: Uuid,
    pub is_real: bool,
    pub recorded_at: chrono::DateTime<Utc>,
}

pub struct Detector {
    settings: DetectorSettings,
    model: OutlierModel,
    observations_since_fit: usize,
    feedback: Vec<FeedbackRecord>,
}

impl Detector {
    pub fn new(settings: DetectorSettings) -> Self {
        let model = OutlierModel::new(settings.window_size);
        Self {
            settings,
            model,
            observations_since_fit: 0,
            feedback: Vec::new(),
        }
    }

    /// Ingest one observation. Returns a classified anomaly when the fitted
    /// model flags the vector, `None` during warm-up or for normal traffic.
    pub fn observe(&mut self, obs: &Observation) -> Option<Anomaly> {
        let features = obs.features();
        self.model.push(features);
        self.observations_since_fit += 1;

        if !self.model.is_fitted() {
            if self.model.len() >= self.settings.warmup_size {
                match self.model.fit() {
                    Ok(()) => {
                        info!(samples = self.model.len(), "outlier model fitted");
                        self.observations_since_fit = 0;
                    }
                    Err(e) => {
                        warn!(error = %e, "initial model fit failed, deferring classification");
                        return None;
                    }
                }
            } else {
                // Warm-up: classification deferred until enough data.
                return None;
            }
        } else if self.observations_since_fit >= self.settings.retrain_interval {
            // A refit failure keeps the previous fitted model.
            match self.model.fit() {
                Ok(()) => {
                    info!(samples = self.model.len(), "outlier model refitted");
                    self.observations_since_fit = 0;
                }
                Err(e) => warn!(error = %e, "model refit failed, keeping previous fit"),
            }
        }

        let score = match self.model.score(&features) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "scoring failed, skipping cycle");
                return None;
            }
        };

        if score <= self.settings.z_threshold {
            return None;
        }

        let kind = self.classify(obs);
        debug!(kind = %kind, score, "observation flagged anomalous");
        Some(Anomaly {
            kind,
            score,
            detected_at: obs.captured_at,
        })
    }

    /// Map a flagged observation to the most specific matching kind.
    fn classify(&self, obs: &Observation) -> AnomalyKind {
        if obs.latency_ms > self.settings.latency_threshold_ms {
            return AnomalyKind::HighLatency {
                latency_ms: obs.latency_ms,
                threshold_ms: self.settings.latency_threshold_ms,
            };
        }
        if obs.packet_loss_pct > self.settings.packet_loss_threshold_pct {
            return AnomalyKind::PacketLoss {
                packet_loss_pct: obs.packet_loss_pct,
                threshold_pct: self.settings.packet_loss_threshold_pct,
            };
        }
        AnomalyKind::GeneralAnomaly {
            features: obs.snapshot(),
        }
    }

    /// Store a supervised label for a flagged anomaly. Does not affect
    /// classification; reserved for future model calibration.
    pub fn record_feedback(&mut self, anomaly_id: Uuid, is_real: bool) {
        info!(%anomaly_id, is_real, "anomaly feedback recorded");
        self.feedback.push(FeedbackRecord {
            anomaly_id,
            is_real,
            recorded_at: Utc::now(),
        });
    }

    pub fn feedback(&self) -> &[FeedbackRecord] {
        &self.feedback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(latency: f64, bandwidth: f64, loss: f64) -> Observation {
        Observation {
            latency_ms: latency,
            bandwidth_mbps: bandwidth,
            packet_loss_pct: loss,
            captured_at: Utc::now(),
        }
    }

    fn warmed_detector() -> Detector {
        let mut detector = Detector::new(DetectorSettings {
            warmup_size: 10,
            ..Default::default()
        });
        // Constant baseline: any later deviation is infinitely anomalous.
        for _ in 0..10 {
            assert!(detector.observe(&obs(50.0, 20.0, 2.0)).is_none());
        }
        detector
    }

    #[test]
    fn test_warmup_produces_no_anomalies() {
        let mut detector = Detector::new(DetectorSettings {
            warmup_size: 10,
            ..Default::default()
        });
        for _ in 0..9 {
            // Even wild values are deferred while unfitted.
            assert!(detector.observe(&obs(900.0, 1.0, 40.0)).is_none());
        }
    }

    #[test]
    fn test_high_latency_classification() {
        let mut detector = warmed_detector();

        let anomaly = detector
            .observe(&obs(260.0, 20.0, 2.0))
            .expect("latency spike should be flagged");
        assert_eq!(
            anomaly.kind,
            AnomalyKind::HighLatency {
                latency_ms: 260.0,
                threshold_ms: 200.0
            }
        );
        assert!(anomaly.score > 3.0);
    }

    #[test]
    fn test_packet_loss_classification() {
        let mut detector = warmed_detector();

        let anomaly = detector
            .observe(&obs(50.0, 20.0, 35.0))
            .expect("packet loss should be flagged");
        assert_eq!(
            anomaly.kind,
            AnomalyKind::PacketLoss {
                packet_loss_pct: 35.0,
                threshold_pct: 10.0
            }
        );
    }

    #[test]
    fn test_latency_rule_wins_over_loss_rule() {
        let mut detector = warmed_detector();

        // Both rules match; most specific ordering puts latency first.
        let anomaly = detector.observe(&obs(300.0, 20.0, 35.0)).unwrap();
        assert_eq!(anomaly.kind.label(), "high_latency");
    }

    #[test]
    fn test_general_anomaly_fallback() {
        let mut detector = warmed_detector();

        // Outlier bandwidth, but neither raw threshold rule matches.
        let anomaly = detector
            .observe(&obs(50.0, 500.0, 2.0))
            .expect("bandwidth outlier should be flagged");
        match anomaly.kind {
            AnomalyKind::GeneralAnomaly { ref features } => {
                assert_eq!(features.bandwidth_mbps, 500.0);
                assert_eq!(features.latency_ms, 50.0);
            }
            ref other => panic!("expected general anomaly, got {other}"),
        }
    }

    #[test]
    fn test_normal_traffic_not_flagged() {
        let mut detector = warmed_detector();
        assert!(detector.observe(&obs(50.0, 20.0, 2.0)).is_none());
    }

    #[test]
    fn test_feedback_is_stored() {
        let mut detector = Detector::new(DetectorSettings::default());
        let id = Uuid::new_v4();
        detector.record_feedback(id, true);
        detector.record_feedback(Uuid::new_v4(), false);
        assert_eq!(detector.feedback().len(), 2);
        assert_eq!(detector.feedback()[0].anomaly_id, id);
        assert!(detector.feedback()[0].is_real);
    }
}
