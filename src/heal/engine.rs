//! The resolution engine: anomaly -> issue -> strategy execution -> verdict.
//!
//! All mutation funnels through one pipeline path guarded per issue id, so
//! distinct issues resolve fully in parallel while a single issue never has
//! two pipeline instances interleaving. The active map and history list are
//! owned by one coordinating lock; readers get cloned snapshots.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::detect::Anomaly;
use crate::heal::evaluator::{EffectivenessEvaluator, Verdict};
use crate::heal::exec::{run_commands, CommandRunner};
use crate::heal::{HistoryEntry, Issue, IssueStatus, ResolutionAction, StrategyTable};
use crate::notify::{Subscriber, SubscriberSet};
use crate::store::IssueStore;

/// Engine timing and execution policy.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Period of the pending-issue retry sweep.
    pub sweep_interval: Duration,
    /// Minimum age (since detection) before a pending issue is retried.
    pub retry_grace: Duration,
    /// Stop a command batch at the first failing command.
    pub fatal_on_first_failure: bool,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            retry_grace: Duration::from_secs(300),
            fatal_on_first_failure: false,
        }
    }
}

/// Structured result of a resolve request. Unknown ids are reported here,
/// never raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveOutcome {
    pub success: bool,
    pub message: String,
}

struct State {
    active: HashMap<Uuid, Issue>,
    history: Vec<HistoryEntry>,
}

struct Inner {
    store: IssueStore,
    strategies: StrategyTable,
    evaluator: Box<dyn EffectivenessEvaluator>,
    runner: Box<dyn CommandRunner>,
    settings: ResolverSettings,
    state: Mutex<State>,
    // Per-issue execution guards; entries removed once an issue resolves.
    guards: StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    subscribers: SubscriberSet,
}

#[derive(Clone)]
pub struct Resolver {
    inner: Arc<Inner>,
}

impl Resolver {
    /// Load persisted state and build the engine.
    pub fn new(
        store: IssueStore,
        strategies: StrategyTable,
        evaluator: Box<dyn EffectivenessEvaluator>,
        runner: Box<dyn CommandRunner>,
        settings: ResolverSettings,
    ) -> Result<Self> {
        let (active, history) = store.load()?;
        info!(
            active = active.len(),
            history = history.len(),
            "resolution engine loaded"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                strategies,
                evaluator,
                runner,
                settings,
                state: Mutex::new(State { active, history }),
                guards: StdMutex::new(HashMap::new()),
                subscribers: SubscriberSet::new(),
            }),
        })
    }

    pub fn subscribe(&self, subscriber: Box<dyn Subscriber>) {
        self.inner.subscribers.register(subscriber);
    }

    /// Snapshot of the active issue set, oldest first.
    pub async fn active_issues(&self) -> Vec<Issue> {
        let state = self.inner.state.lock().await;
        let mut issues: Vec<Issue> = state.active.values().cloned().collect();
        issues.sort_by_key(|i| i.detected_at);
        issues
    }

    /// Snapshot of the resolution history, oldest first.
    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.inner.state.lock().await.history.clone()
    }

    pub async fn get_issue(&self, id: Uuid) -> Option<Issue> {
        self.inner.state.lock().await.active.get(&id).cloned()
    }

    /// Create an issue from an anomaly, persist it, and trigger automatic
    /// resolution in the background. The returned id is visible to issue
    /// queries before the pipeline produces any side effect.
    pub async fn handle_anomaly(&self, anomaly: Anomaly) -> Uuid {
        let kind = anomaly.kind.label();
        let issue = Issue::from_anomaly(anomaly);
        let id = issue.id;

        let (active_snap, history_snap) = {
            let mut state = self.inner.state.lock().await;
            state.active.insert(id, issue);
            if let Err(e) = self.inner.store.save_active(&state.active) {
                error!(issue = %id, error = %e, "failed to persist active issues");
            }
            snapshots(&state)
        };
        info!(issue = %id, kind, "created new issue for anomaly");
        self.inner.subscribers.notify(&active_snap, &history_snap);

        let resolver = self.clone();
        tokio::spawn(async move {
            let outcome = resolver.run_pipeline(id, false).await;
            if !outcome.success {
                warn!(issue = %id, message = %outcome.message, "automatic resolution unsuccessful");
            }
        });

        id
    }

    /// Manually drive the resolution pipeline for an issue.
    pub async fn resolve_issue(&self, id: Uuid) -> ResolveOutcome {
        self.run_pipeline(id, true).await
    }

    /// The single pipeline path shared by automatic, manual, and sweep
    /// resolution.
    async fn run_pipeline(&self, id: Uuid, manual: bool) -> ResolveOutcome {
        // Pre-check so unknown ids never allocate a guard and idempotent
        // calls return without contending for one.
        {
            let state = self.inner.state.lock().await;
            match state.active.get(&id) {
                None => return missing_outcome(&state, id),
                Some(issue)
                    if matches!(issue.status, IssueStatus::Resolving | IssueStatus::Resolved) =>
                {
                    return already_outcome(issue.status);
                }
                Some(_) => {}
            }
        }

        let guard = self.guard_for(id);
        let _permit = match guard.try_lock() {
            Ok(permit) => permit,
            // A pipeline instance is mid-flight for this issue.
            Err(_) => return already_outcome(IssueStatus::Resolving),
        };

        // Step 2: mark resolving and persist, re-checking under the guard.
        let (strategy, manual_resolution, attempt, snaps) = {
            let mut state_guard = self.inner.state.lock().await;
            let state = &mut *state_guard;
            match state.active.get(&id) {
                None => return missing_outcome(state, id),
                Some(issue)
                    if matches!(issue.status, IssueStatus::Resolving | IssueStatus::Resolved) =>
                {
                    return already_outcome(issue.status);
                }
                Some(_) => {}
            }

            let (strategy, manual_resolution, attempt) = match state.active.get_mut(&id) {
                Some(issue) => {
                    issue.status = IssueStatus::Resolving;
                    issue.resolution_attempts += 1;
                    if manual {
                        issue.manual_resolution = true;
                    }
                    (
                        self.inner.strategies.for_kind(&issue.anomaly.kind).clone(),
                        issue.manual_resolution,
                        issue.resolution_attempts,
                    )
                }
                None => {
                    return ResolveOutcome {
                        success: false,
                        message: "Issue not found".to_string(),
                    }
                }
            };

            if let Err(e) = self.inner.store.save_active(&state.active) {
                error!(issue = %id, error = %e, "failed to persist active issues");
            }
            (strategy, manual_resolution, attempt, snapshots(state))
        };
        self.inner.subscribers.notify(&snaps.0, &snaps.1);
        info!(issue = %id, strategy = %strategy.name, attempt, "starting resolution pipeline");

        // Steps 4-5: execute commands, then wait out the verification window.
        let result = run_commands(
            self.inner.runner.as_ref(),
            &strategy.commands,
            self.inner.settings.fatal_on_first_failure,
        )
        .await;
        tokio::time::sleep(strategy.verification_wait).await;

        let success = result.success;
        let message = result.messages.join("\n");

        // Steps 6-7: evaluator verdict, state transition, audit entry.
        let (resolved, snaps) = {
            let mut state_guard = self.inner.state.lock().await;
            let state = &mut *state_guard;

            let (verdict, entry) = match state.active.get_mut(&id) {
                Some(issue) => {
                    issue.resolution_actions.push(ResolutionAction {
                        timestamp: Utc::now(),
                        strategy: strategy.name.clone(),
                        commands: strategy.commands.clone(),
                        result: result.clone(),
                    });

                    let verdict =
                        self.inner
                            .evaluator
                            .evaluate(&strategy, issue, manual_resolution, success);

                    let entry = match verdict {
                        Verdict::Resolved => {
                            issue.status = IssueStatus::Resolved;
                            Some(history_entry(issue, true))
                        }
                        Verdict::Failed => {
                            issue.status = IssueStatus::Failed;
                            Some(history_entry(issue, false))
                        }
                        Verdict::Pending => {
                            issue.status = IssueStatus::Pending;
                            None
                        }
                    };
                    (verdict, entry)
                }
                // Unreachable while the guard is held; report rather than panic.
                None => {
                    return ResolveOutcome {
                        success: false,
                        message: "Issue not found".to_string(),
                    }
                }
            };

            if let Some(entry) = entry {
                state.history.push(entry);
            }
            let resolved = verdict == Verdict::Resolved;
            match verdict {
                Verdict::Resolved => {
                    state.active.remove(&id);
                    info!(issue = %id, "issue resolved");
                }
                Verdict::Failed => warn!(issue = %id, "issue resolution failed"),
                Verdict::Pending => info!(issue = %id, "issue pending, eligible for retry"),
            }

            // Step 8: persist both documents.
            if let Err(e) = self.inner.store.save_active(&state.active) {
                error!(issue = %id, error = %e, "failed to persist active issues");
            }
            if let Err(e) = self.inner.store.save_history(&state.history) {
                error!(issue = %id, error = %e, "failed to persist history");
            }
            (resolved, snapshots(state))
        };

        if resolved {
            self.drop_guard(id);
        }
        self.inner.subscribers.notify(&snaps.0, &snaps.1);

        ResolveOutcome { success, message }
    }

    /// Retry every pending issue older than the grace window. Issues are
    /// processed in parallel; one failure never blocks the rest of the
    /// cycle. Returns how many retries were triggered.
    pub async fn sweep_pending(&self) -> usize {
        let now = Utc::now();
        let grace = self.inner.settings.retry_grace;
        let due: Vec<Uuid> = {
            let state = self.inner.state.lock().await;
            state
                .active
                .values()
                .filter(|issue| {
                    issue.status == IssueStatus::Pending
                        && (now - issue.detected_at).to_std().unwrap_or_default() >= grace
                })
                .map(|issue| issue.id)
                .collect()
        };

        let mut handles = Vec::with_capacity(due.len());
        for id in due {
            info!(issue = %id, "sweep retrying pending issue");
            let resolver = self.clone();
            handles.push(tokio::spawn(async move {
                let outcome = resolver.run_pipeline(id, false).await;
                if !outcome.success {
                    warn!(issue = %id, message = %outcome.message, "sweep retry unsuccessful");
                }
            }));
        }

        let count = handles.len();
        for handle in futures::future::join_all(handles).await {
            if let Err(e) = handle {
                error!(error = %e, "sweep retry task panicked");
            }
        }
        count
    }

    fn guard_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut guards = self.inner.guards.lock().expect("guard map lock poisoned");
        guards
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn drop_guard(&self, id: Uuid) {
        let mut guards = self.inner.guards.lock().expect("guard map lock poisoned");
        guards.remove(&id);
    }
}

/// Background sweep loop: retries pending issues on a fixed period.
pub async fn run_sweep_loop(resolver: Resolver) {
    info!("pending-issue retry sweep started");
    let mut interval = tokio::time::interval(resolver.inner.settings.sweep_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let retried = resolver.sweep_pending().await;
        if retried > 0 {
            info!(retried, "sweep cycle complete");
        }
    }
}

fn snapshots(state: &State) -> (Vec<Issue>, Vec<HistoryEntry>) {
    let mut issues: Vec<Issue> = state.active.values().cloned().collect();
    issues.sort_by_key(|i| i.detected_at);
    (issues, state.history.clone())
}

fn history_entry(issue: &Issue, success: bool) -> HistoryEntry {
    HistoryEntry {
        issue_id: issue.id,
        anomaly_kind: issue.anomaly.kind.label().to_string(),
        detected_at: issue.detected_at,
        resolved_at: success.then(Utc::now),
        resolution_success: success,
        resolution_actions: issue.resolution_actions.clone(),
    }
}

fn missing_outcome(state: &State, id: Uuid) -> ResolveOutcome {
    // An id that already completed successfully is reported as resolved,
    // not unknown.
    if state
        .history
        .iter()
        .any(|entry| entry.issue_id == id && entry.resolution_success)
    {
        return ResolveOutcome {
            success: true,
            message: "Issue is already resolved".to_string(),
        };
    }
    ResolveOutcome {
        success: false,
        message: "Issue not found".to_string(),
    }
}

fn already_outcome(status: IssueStatus) -> ResolveOutcome {
    ResolveOutcome {
        success: true,
        message: format!("Issue is already {status}"),
    }
}
