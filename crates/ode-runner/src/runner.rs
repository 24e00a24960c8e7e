//! The autonomous runner loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use ode_ledger::{EntryId, Ledger, LedgerEntry};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::clock::{until_next_midnight, Clock, SystemClock};
use crate::config::RunnerConfig;
use crate::error::{CycleError, FailureKind, RunnerError};
use crate::producer::Producer;
use crate::quota::RunnerState;

/// Runner phase. `Idle → Running → (Cooldown | QuotaExhausted) → Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerPhase {
    Idle,
    Running,
    Cooldown,
    QuotaExhausted,
}

/// What a single cycle did.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// An entry was appended and counted against the quota
    Recorded { entry_id: EntryId, actions_today: u32 },
    /// Nothing was recorded; the quota slot is preserved
    Failed { kind: FailureKind, message: String },
    /// Skipped because today's quota is spent
    QuotaExhausted { actions_today: u32, quota: u32 },
}

impl CycleOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, CycleOutcome::Recorded { .. })
    }
}

/// Result of [`AutonomousRunner::run_cycle`].
#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    /// Delay before the next attempt
    pub next_wake: Duration,
}

/// Snapshot published after every transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunnerStatus {
    pub agent_id: String,
    pub producer: String,
    pub phase: RunnerPhase,
    pub actions_today: u32,
    pub quota: u32,
    /// Entries still allowed today
    pub remaining_today: u32,
    pub current_day: NaiveDate,
    pub interval_secs: u64,
    pub last_outcome: Option<CycleOutcome>,
    pub next_wake_at: Option<DateTime<Utc>>,
}

/// Drives a producer on an interval, bounded by a daily ledger-write quota.
pub struct AutonomousRunner {
    config: RunnerConfig,
    ledger: Arc<Ledger>,
    producer: Arc<dyn Producer>,
    clock: Arc<dyn Clock>,
    state: RunnerState,
    phase: RunnerPhase,
    status: watch::Sender<RunnerStatus>,
}

impl AutonomousRunner {
    /// Create a runner on the system clock.
    pub fn new(
        config: RunnerConfig,
        ledger: Arc<Ledger>,
        producer: Arc<dyn Producer>,
    ) -> Result<Self, RunnerError> {
        Self::with_clock(config, ledger, producer, Arc::new(SystemClock))
    }

    /// Create a runner with a specific clock.
    pub fn with_clock(
        config: RunnerConfig,
        ledger: Arc<Ledger>,
        producer: Arc<dyn Producer>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RunnerError> {
        config.validate()?;

        let state = RunnerState::new(
            config.max_actions_per_day,
            config.interval(),
            clock.now().date(),
        );
        let (status, _) = watch::channel(RunnerStatus {
            agent_id: config.agent_id.clone(),
            producer: producer.name().to_string(),
            phase: RunnerPhase::Idle,
            actions_today: state.actions_today,
            quota: state.quota,
            remaining_today: state.remaining(),
            current_day: state.current_day,
            interval_secs: config.observation_interval_secs,
            last_outcome: None,
            next_wake_at: None,
        });

        info!(
            agent_id = %config.agent_id,
            producer = producer.name(),
            max_actions_per_day = config.max_actions_per_day,
            interval_secs = config.observation_interval_secs,
            "Autonomous runner initialized"
        );

        Ok(Self {
            config,
            ledger,
            producer,
            clock,
            state,
            phase: RunnerPhase::Idle,
            status,
        })
    }

    pub fn state(&self) -> &RunnerState {
        &self.state
    }

    pub fn phase(&self) -> RunnerPhase {
        self.phase
    }

    /// Subscribe to status snapshots.
    pub fn status(&self) -> watch::Receiver<RunnerStatus> {
        self.status.subscribe()
    }

    /// Run one cycle attempt and report when the next one is due.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let now = self.clock.now();
        if self.state.roll_over(now.date()) {
            info!(day = %self.state.current_day, "Daily counter reset");
        }

        if self.state.is_exhausted() {
            self.set_phase(RunnerPhase::QuotaExhausted);
            let wait = until_next_midnight(now) + self.config.midnight_buffer();
            warn!(
                quota = self.state.quota,
                wait_secs = wait.as_secs(),
                "Daily limit reached, waiting for tomorrow"
            );
            let outcome = CycleOutcome::QuotaExhausted {
                actions_today: self.state.actions_today,
                quota: self.state.quota,
            };
            return self.finish(outcome, wait);
        }

        self.set_phase(RunnerPhase::Running);
        info!(agent_id = %self.config.agent_id, producer = self.producer.name(), "Starting observation cycle");

        let outcome = match self.attempt().await {
            Ok(entry) => {
                self.state.record_success();
                info!(
                    id = %entry.id,
                    actions_today = self.state.actions_today,
                    quota = self.state.quota,
                    "Cycle complete"
                );
                CycleOutcome::Recorded {
                    entry_id: entry.id,
                    actions_today: self.state.actions_today,
                }
            }
            Err(e) => {
                error!(error = %e, kind = ?e.kind(), "Observation cycle failed");
                CycleOutcome::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        };

        self.set_phase(RunnerPhase::Cooldown);
        let interval = self.state.interval;
        self.finish(outcome, interval)
    }

    async fn attempt(&self) -> Result<LedgerEntry, CycleError> {
        let timeout = self.config.producer_timeout();
        let observation =
            tokio::time::timeout(timeout, self.producer.produce(&self.config.agent_id))
                .await
                .map_err(|_| CycleError::Timeout(timeout))??;

        let draft = observation.into_draft(&self.config.agent_id);
        Ok(self.ledger.append(draft).await?)
    }

    /// Run cycles until `shutdown` turns true (or its sender is dropped).
    ///
    /// The stop signal is checked between cycles and interrupts the sleep.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.observation_interval_secs,
            "Autonomous runner started"
        );

        while !*shutdown.borrow() {
            let report = self.run_cycle().await;
            info!(wait_secs = report.next_wake.as_secs(), "Next cycle scheduled");

            if sleep_or_stop(report.next_wake, &mut shutdown).await {
                break;
            }
            self.set_phase(RunnerPhase::Idle);
        }

        self.set_phase(RunnerPhase::Idle);
        info!("Autonomous runner stopped");
    }

    fn set_phase(&mut self, phase: RunnerPhase) {
        self.phase = phase;
        let state = &self.state;
        self.status.send_modify(|s| {
            s.phase = phase;
            s.actions_today = state.actions_today;
            s.remaining_today = state.remaining();
            s.current_day = state.current_day;
        });
    }

    fn finish(&mut self, outcome: CycleOutcome, next_wake: Duration) -> CycleReport {
        let wake_at = chrono::Duration::from_std(next_wake)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d));
        let state = &self.state;
        self.status.send_modify(|s| {
            s.actions_today = state.actions_today;
            s.remaining_today = state.remaining();
            s.current_day = state.current_day;
            s.last_outcome = Some(outcome.clone());
            s.next_wake_at = wake_at;
        });
        CycleReport { outcome, next_wake }
    }
}

/// Sleep for `delay` unless a stop arrives first. Returns true on stop.
async fn sleep_or_stop(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ProducerError;
    use crate::observer::SimulatedObserver;
    use crate::producer::Observation;
    use async_trait::async_trait;
    use chrono::NaiveDateTime;
    use ode_ledger::{LedgerStorage, StorageError, SyncMode, TailRepair};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn morning(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn config(quota: u32, interval_secs: u64) -> RunnerConfig {
        RunnerConfig {
            agent_id: "obs_test".into(),
            max_actions_per_day: quota,
            observation_interval_secs: interval_secs,
            producer_timeout_secs: 5,
            midnight_buffer_secs: 60,
        }
    }

    /// Replays a fixed script of results, then succeeds forever.
    struct ScriptedProducer {
        script: Mutex<VecDeque<Result<Observation, String>>>,
    }

    impl ScriptedProducer {
        fn new(script: Vec<Result<Observation, String>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }
    }

    fn ok_observation() -> Observation {
        Observation {
            entry_type: "HYPOTHESIS".into(),
            payload: json!({"claim": "x"}),
            confidence: 0.7,
            references: vec![],
        }
    }

    #[async_trait]
    impl Producer for ScriptedProducer {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn produce(&self, _agent_id: &str) -> Result<Observation, ProducerError> {
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(obs)) => Ok(obs),
                Some(Err(msg)) => Err(ProducerError::Upstream(msg)),
                None => Ok(ok_observation()),
            }
        }
    }

    struct HangingProducer;

    #[async_trait]
    impl Producer for HangingProducer {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn produce(&self, _agent_id: &str) -> Result<Observation, ProducerError> {
            std::future::pending().await
        }
    }

    struct BrokenDisk;

    impl LedgerStorage for BrokenDisk {
        fn append_record(&self, _record: &[u8], _sync: SyncMode) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        }

        fn read_all(&self) -> Result<Vec<u8>, StorageError> {
            Ok(Vec::new())
        }

        fn repair_tail(
            &self,
            _is_record: &dyn Fn(&[u8]) -> bool,
        ) -> Result<TailRepair, StorageError> {
            Ok(TailRepair::Clean)
        }

        fn describe(&self) -> String {
            "broken".into()
        }
    }

    fn runner_with(
        cfg: RunnerConfig,
        ledger: Arc<Ledger>,
        producer: Arc<dyn Producer>,
        clock: Arc<ManualClock>,
    ) -> AutonomousRunner {
        AutonomousRunner::with_clock(cfg, ledger, producer, clock).unwrap()
    }

    #[tokio::test]
    async fn quota_exhausts_then_resets_next_day() {
        let ledger = Arc::new(Ledger::in_memory());
        let clock = Arc::new(ManualClock::new(morning(1)));
        let mut runner = runner_with(
            config(3, 60),
            ledger.clone(),
            Arc::new(SimulatedObserver::default()),
            clock.clone(),
        );

        for i in 1..=3 {
            let report = runner.run_cycle().await;
            assert!(report.outcome.is_recorded());
            assert_eq!(report.next_wake, Duration::from_secs(60));
            assert_eq!(runner.state().actions_today, i);
        }

        let report = runner.run_cycle().await;
        assert_eq!(
            report.outcome,
            CycleOutcome::QuotaExhausted {
                actions_today: 3,
                quota: 3
            }
        );
        assert_eq!(runner.phase(), RunnerPhase::QuotaExhausted);
        // 10:00 -> midnight is 14h, plus the 60s buffer.
        assert_eq!(report.next_wake, Duration::from_secs(14 * 3600 + 60));
        assert_eq!(ledger.len().await.unwrap(), 3);

        clock.set(morning(2) - chrono::Duration::hours(10) + chrono::Duration::seconds(30));
        let report = runner.run_cycle().await;
        assert!(report.outcome.is_recorded());
        assert_eq!(runner.state().actions_today, 1);
        assert_eq!(runner.state().current_day, morning(2).date());
        assert_eq!(ledger.len().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn producer_failure_preserves_quota_slot() {
        let ledger = Arc::new(Ledger::in_memory());
        let clock = Arc::new(ManualClock::new(morning(1)));
        let producer = ScriptedProducer::new(vec![Err("fetch failed".into())]);
        let mut runner = runner_with(config(2, 30), ledger.clone(), Arc::new(producer), clock);

        let report = runner.run_cycle().await;
        assert!(matches!(
            report.outcome,
            CycleOutcome::Failed {
                kind: FailureKind::Producer,
                ..
            }
        ));
        assert_eq!(report.next_wake, Duration::from_secs(30));
        assert_eq!(runner.state().actions_today, 0);
        assert_eq!(runner.phase(), RunnerPhase::Cooldown);

        assert!(runner.run_cycle().await.outcome.is_recorded());
        assert!(runner.run_cycle().await.outcome.is_recorded());
        assert_eq!(runner.state().actions_today, 2);
        assert!(matches!(
            runner.run_cycle().await.outcome,
            CycleOutcome::QuotaExhausted { .. }
        ));
        assert_eq!(ledger.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn invalid_observation_is_validation_failure() {
        let ledger = Arc::new(Ledger::in_memory());
        let clock = Arc::new(ManualClock::new(morning(1)));
        let bad = Observation {
            entry_type: "BOGUS".into(),
            ..ok_observation()
        };
        let producer = ScriptedProducer::new(vec![Ok(bad)]);
        let mut runner = runner_with(config(1, 30), ledger.clone(), Arc::new(producer), clock);

        let report = runner.run_cycle().await;
        assert!(matches!(
            report.outcome,
            CycleOutcome::Failed {
                kind: FailureKind::Validation,
                ..
            }
        ));
        assert_eq!(runner.state().actions_today, 0);
        assert!(ledger.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn storage_failure_preserves_quota_slot() {
        let ledger = Arc::new(
            Ledger::with_storage(Arc::new(BrokenDisk), SyncMode::Immediate).unwrap(),
        );
        let clock = Arc::new(ManualClock::new(morning(1)));
        let mut runner = runner_with(
            config(1, 30),
            ledger,
            Arc::new(SimulatedObserver::default()),
            clock,
        );

        let report = runner.run_cycle().await;
        assert!(matches!(
            report.outcome,
            CycleOutcome::Failed {
                kind: FailureKind::Storage,
                ..
            }
        ));
        assert_eq!(report.next_wake, Duration::from_secs(30));
        assert_eq!(runner.state().actions_today, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_producer_times_out_as_failed_cycle() {
        let ledger = Arc::new(Ledger::in_memory());
        let clock = Arc::new(ManualClock::new(morning(1)));
        let mut runner = runner_with(config(1, 30), ledger, Arc::new(HangingProducer), clock);

        let report = runner.run_cycle().await;
        assert!(matches!(
            report.outcome,
            CycleOutcome::Failed {
                kind: FailureKind::Timeout,
                ..
            }
        ));
        assert_eq!(runner.state().actions_today, 0);
    }

    #[tokio::test]
    async fn end_to_end_quota_of_two() {
        let ledger = Arc::new(Ledger::in_memory());
        let clock = Arc::new(ManualClock::new(morning(1)));
        let mut runner = runner_with(
            config(2, 1),
            ledger.clone(),
            Arc::new(SimulatedObserver::default()),
            clock,
        );

        let outcomes: Vec<_> = {
            let mut v = vec![];
            for _ in 0..3 {
                v.push(runner.run_cycle().await.outcome);
            }
            v
        };

        assert!(outcomes[0].is_recorded());
        assert!(outcomes[1].is_recorded());
        assert!(matches!(outcomes[2], CycleOutcome::QuotaExhausted { .. }));
        assert_eq!(ledger.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn status_tracks_last_outcome() {
        let ledger = Arc::new(Ledger::in_memory());
        let clock = Arc::new(ManualClock::new(morning(1)));
        let mut runner = runner_with(
            config(2, 60),
            ledger,
            Arc::new(SimulatedObserver::default()),
            clock,
        );
        let status = runner.status();
        assert!(status.borrow().last_outcome.is_none());

        runner.run_cycle().await;

        let snapshot = status.borrow().clone();
        assert_eq!(snapshot.phase, RunnerPhase::Cooldown);
        assert_eq!(snapshot.actions_today, 1);
        assert_eq!(snapshot.quota, 2);
        assert_eq!(snapshot.remaining_today, 1);
        assert_eq!(snapshot.producer, "simulated");
        assert!(snapshot.last_outcome.unwrap().is_recorded());
        assert!(snapshot.next_wake_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn run_paces_cycles_by_interval() {
        let ledger = Arc::new(Ledger::in_memory());
        let clock = Arc::new(ManualClock::new(morning(1)));
        let mut runner = runner_with(
            config(10, 60),
            ledger.clone(),
            Arc::new(SimulatedObserver::default()),
            clock,
        );
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            runner.run(rx).await;
            runner
        });

        tokio::time::sleep(Duration::from_secs(150)).await;
        tx.send(true).unwrap();
        let runner = handle.await.unwrap();

        // Cycles at t=0, 60 and 120.
        assert_eq!(ledger.len().await.unwrap(), 3);
        assert_eq!(runner.phase(), RunnerPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_sleep() {
        let ledger = Arc::new(Ledger::in_memory());
        let clock = Arc::new(ManualClock::new(morning(1)));
        let mut runner = runner_with(
            config(3, 8 * 3600),
            ledger.clone(),
            Arc::new(SimulatedObserver::default()),
            clock,
        );
        let (tx, rx) = watch::channel(false);
        let started = tokio::time::Instant::now();

        let handle = tokio::spawn(async move { runner.run(rx).await });

        tokio::time::sleep(Duration::from_secs(10)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(ledger.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn already_stopped_runner_does_nothing() {
        let ledger = Arc::new(Ledger::in_memory());
        let clock = Arc::new(ManualClock::new(morning(1)));
        let mut runner = runner_with(
            config(3, 60),
            ledger.clone(),
            Arc::new(SimulatedObserver::default()),
            clock,
        );
        let (_tx, rx) = watch::channel(true);

        runner.run(rx).await;
        assert!(ledger.is_empty().await.unwrap());
    }

    #[test]
    fn rejects_invalid_config() {
        let ledger = Arc::new(Ledger::in_memory());
        let result = AutonomousRunner::new(
            config(0, 60),
            ledger,
            Arc::new(SimulatedObserver::default()),
        );
        assert!(matches!(result, Err(RunnerError::Config(_))));
    }
}
