//! One-shot commands that run without the HTTP server.

use std::io::Write;
use std::sync::Arc;

use ode_ledger::{Ledger, StorageError};
use ode_runner::{AutonomousRunner, CycleReport};

use crate::config::DaemonConfig;
use crate::error::DaemonResult;
use crate::server::build_producer;

/// What a single `observe` run did.
#[derive(Debug)]
pub struct ObserveSummary {
    pub report: CycleReport,
    pub total_entries: usize,
}

/// Run one observation cycle as `agent_id` and report the ledger size.
pub async fn observe(config: &DaemonConfig, agent_id: &str) -> DaemonResult<ObserveSummary> {
    let mut runner_config = config.runner.clone();
    runner_config.agent_id = agent_id.to_string();

    let ledger = Arc::new(Ledger::open(config.ledger.to_ledger_config())?);
    let producer = build_producer(config)?;
    let mut runner = AutonomousRunner::new(runner_config, ledger.clone(), producer)?;

    let report = runner.run_cycle().await;
    let total_entries = ledger.len().await?;
    Ok(ObserveSummary {
        report,
        total_entries,
    })
}

/// Write the ledger to `out` as newline-delimited JSON. Returns the count.
/// The store is only read, never created or repaired.
pub async fn dump_entries<W: Write>(config: &DaemonConfig, out: &mut W) -> DaemonResult<usize> {
    let ledger = Ledger::open_read_only(config.ledger.to_ledger_config())?;
    let entries = ledger.read_all().await?;
    for entry in &entries {
        let line = serde_json::to_string(entry).map_err(StorageError::from)?;
        writeln!(out, "{line}")?;
    }
    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ode_runner::CycleOutcome;

    fn config_in(dir: &tempfile::TempDir) -> DaemonConfig {
        let mut config = DaemonConfig::default();
        config.ledger.path = dir.path().join("entries.jsonl");
        config
    }

    #[tokio::test]
    async fn observe_records_one_entry() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        let first = observe(&config, "obs_01").await.unwrap();
        assert!(first.report.outcome.is_recorded());
        assert_eq!(first.total_entries, 1);

        let second = observe(&config, "obs_01").await.unwrap();
        assert_eq!(second.total_entries, 2);
    }

    #[tokio::test]
    async fn observe_reports_failure_without_recording() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        config.producer.kind = crate::config::ProducerKind::Web;
        config.producer.url = Some("http://127.0.0.1:9/".into());
        config.runner.producer_timeout_secs = 2;

        let summary = observe(&config, "obs_01").await.unwrap();
        assert!(matches!(summary.report.outcome, CycleOutcome::Failed { .. }));
        assert_eq!(summary.total_entries, 0);
    }

    #[tokio::test]
    async fn dump_writes_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        observe(&config, "obs_01").await.unwrap();
        observe(&config, "obs_02").await.unwrap();

        let mut out = Vec::new();
        let count = dump_entries(&config, &mut out).await.unwrap();
        assert_eq!(count, 2);

        let text = String::from_utf8(out).unwrap();
        let agents: Vec<String> = text
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["agent_id"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(agents, vec!["obs_01", "obs_02"]);
    }

    #[tokio::test]
    async fn dump_does_not_touch_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        let mut out = Vec::new();
        assert_eq!(dump_entries(&config, &mut out).await.unwrap(), 0);
        assert!(!config.ledger.path.exists());

        observe(&config, "obs_01").await.unwrap();
        observe(&config, "obs_01").await.unwrap();
        let mut raw = std::fs::read(&config.ledger.path).unwrap();
        raw.pop();
        std::fs::write(&config.ledger.path, &raw).unwrap();

        let mut out = Vec::new();
        assert_eq!(dump_entries(&config, &mut out).await.unwrap(), 1);
        assert_eq!(std::fs::read(&config.ledger.path).unwrap(), raw);
    }
}
