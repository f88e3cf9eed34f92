use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bootstrap::Phase;
use crate::identity::NodeRole;

/// Versión del formato de `report.json`.
pub const REPORT_FORMAT_VERSION: u32 = 1;

/// Resultado del comando de benchmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "status",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum RunOutcome {
    Succeeded,
    Failed {
        /// None si el proceso murió por una señal
        exit_code: Option<i32>,
    },
    TimedOut {
        after_secs: u64,
    },
    SpawnFailed {
        reason: String,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarrierMode {
    Fixed,
    Readiness,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarrierReport {
    pub mode: BarrierMode,
    pub waited_ms: u64,
    /// Workers que respondieron /ready antes de lanzar el benchmark
    pub ready: Vec<String>,
    /// Workers que no respondieron a tiempo (o no consultados en modo fixed)
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShutdownReport {
    pub pids_found: Vec<u32>,
    pub signalled: Vec<u32>,
    pub not_running: Vec<u32>,
    pub errors: Vec<String>,
}

/// Artefacto que deja el coordinador en su volumen al terminar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub format_version: u32,
    pub run_id: String,
    /// Corrida a la que pertenece el reporte (uid y generación del recurso)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_key: Option<String>,
    pub instance: String,
    pub coordinator: String,
    pub command: Vec<String>,
    pub barrier: BarrierReport,
    pub outcome: RunOutcome,
    pub shutdown: ShutdownReport,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Respuesta de GET /status de cada nodo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub instance: String,
    pub hostname: String,
    pub ordinal: u32,
    pub role: NodeRole,
    pub phase: Phase,
    pub ready: bool,
    pub report: Option<RunReport>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outcome_se_serializa_con_status() {
        assert_eq!(
            serde_json::to_value(RunOutcome::Succeeded).unwrap(),
            json!({"status": "SUCCEEDED"})
        );
        assert_eq!(
            serde_json::to_value(RunOutcome::Failed { exit_code: Some(3) }).unwrap(),
            json!({"status": "FAILED", "exitCode": 3})
        );
        assert_eq!(
            serde_json::to_value(RunOutcome::TimedOut { after_secs: 10 }).unwrap(),
            json!({"status": "TIMED_OUT", "afterSecs": 10})
        );
    }

    #[test]
    fn reporte_usa_camel_case_en_todos_los_campos() {
        let now = chrono::Utc::now();
        let report = RunReport {
            format_version: REPORT_FORMAT_VERSION,
            run_id: "run-1".to_string(),
            run_key: Some("uid-1-2".to_string()),
            instance: "bench1".to_string(),
            coordinator: "bench1-0.bench1".to_string(),
            command: vec!["esrally".to_string()],
            barrier: BarrierReport {
                mode: BarrierMode::Readiness,
                waited_ms: 10,
                ready: vec![],
                missing: vec![],
            },
            outcome: RunOutcome::Failed { exit_code: Some(2) },
            shutdown: ShutdownReport::default(),
            started_at: now,
            finished_at: now,
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["runKey"], "uid-1-2");
        assert_eq!(value["barrier"]["waitedMs"], 10);
        assert_eq!(value["outcome"]["exitCode"], 2);
        assert!(value["outcome"].get("exit_code").is_none());

        let back: RunReport = serde_json::from_value(value).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn reporte_sin_run_key_sigue_siendo_legible() {
        let raw = json!({
            "formatVersion": 1,
            "runId": "run-0",
            "instance": "bench1",
            "coordinator": "bench1-0.bench1",
            "command": ["esrally"],
            "barrier": {"mode": "fixed", "waitedMs": 60000, "ready": [], "missing": []},
            "outcome": {"status": "SUCCEEDED"},
            "shutdown": {"pidsFound": [], "signalled": [], "notRunning": [], "errors": []},
            "startedAt": "2024-01-01T00:00:00Z",
            "finishedAt": "2024-01-01T00:10:00Z"
        });
        let report: RunReport = serde_json::from_value(raw).unwrap();
        assert!(report.run_key.is_none());
    }

    #[test]
    fn solo_succeeded_es_exito() {
        assert!(RunOutcome::Succeeded.is_success());
        assert!(!RunOutcome::Failed { exit_code: Some(1) }.is_success());
        assert!(!RunOutcome::TimedOut { after_secs: 1 }.is_success());
        assert!(!RunOutcome::SpawnFailed { reason: "x".into() }.is_success());
    }
}
