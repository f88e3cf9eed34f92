//! Máquina de estados que ejecuta cada nodo al arrancar.
//!
//! Init -> DaemonStarting -> RoleBranch ->
//!   coordinador: CoordinatorWait -> RunBenchmark -> TailAndShutdown -> Completed
//!   worker:      TailForever
//!
//! Todo efecto (procesos, archivos, red, esperas) pasa por `NodeRuntime`, así
//! la lógica del protocolo se puede probar sin un cluster.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::crd::{BarrierKind, StartupSpec};
use crate::error::StartupError;
use crate::identity::{worker_addresses, NodeIdentity, NodeRole};
use crate::pidlog::LogFormat;
use crate::report::{
    BarrierMode, BarrierReport, RunOutcome, RunReport, ShutdownReport, REPORT_FORMAT_VERSION,
};

pub const DEFAULT_FIXED_BARRIER: Duration = Duration::from_secs(60);
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Init,
    DaemonStarting,
    RoleBranch,
    CoordinatorWait,
    RunBenchmark,
    TailAndShutdown,
    TailForever,
    Completed,
}

/// Cómo sincroniza el coordinador el arranque del resto de los nodos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupBarrier {
    /// Dormir un intervalo fijo y asumir que todos arrancaron
    Fixed { wait: Duration },
    /// Consultar /ready de cada worker hasta que respondan todos o venza el timeout
    Readiness {
        timeout: Duration,
        poll_interval: Duration,
    },
}

impl StartupBarrier {
    pub fn from_spec(spec: Option<&StartupSpec>) -> Self {
        let default = StartupSpec::default();
        let spec = spec.unwrap_or(&default);
        let seconds = spec.seconds.map(|s| Duration::from_secs(s as u64));

        match spec.barrier {
            BarrierKind::Fixed => StartupBarrier::Fixed {
                wait: seconds.unwrap_or(DEFAULT_FIXED_BARRIER),
            },
            BarrierKind::Readiness => StartupBarrier::Readiness {
                timeout: seconds.unwrap_or(DEFAULT_READINESS_TIMEOUT),
                poll_interval: spec
                    .poll_interval_ms
                    .map(|ms| Duration::from_millis(ms as u64))
                    .unwrap_or(DEFAULT_POLL_INTERVAL),
            },
        }
    }
}

/// Todo lo que un nodo necesita saber para arrancar.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapPlan {
    pub identity: NodeIdentity,
    pub nodes: u32,
    /// IP del propio pod (MY_POD_IP)
    pub node_ip: String,
    pub barrier: StartupBarrier,
    pub command: Vec<String>,
    pub benchmark_timeout: Option<Duration>,
    pub log_format: LogFormat,
    pub run_key: Option<String>,
}

impl BootstrapPlan {
    pub fn role(&self) -> NodeRole {
        self.identity.role()
    }

    pub fn coordinator_address(&self) -> String {
        self.identity.coordinator_address()
    }

    /// Un reporte solo vale para la misma corrida: misma clave y mismo comando.
    pub fn owns(&self, report: &RunReport) -> bool {
        report.run_key == self.run_key && report.command == self.command
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BootstrapOutcome {
    /// El worker quedó siguiendo el log hasta que lo terminaron
    Worker,
    /// El coordinador ejecutó el benchmark
    Ran(RunReport),
    /// El coordinador encontró un reporte previo en su volumen y no relanzó
    AlreadyRan(RunReport),
}

#[async_trait]
pub trait NodeRuntime: Send + Sync {
    /// Aviso de cambio de fase (para /status).
    fn enter(&self, _phase: Phase) {}

    async fn check_workspace(&self) -> io::Result<()>;

    /// Crea o trunca el archivo de log del agente.
    async fn reset_log(&self) -> io::Result<()>;

    /// `esrallyd start --node-ip=.. --coordinator-ip=..`; devuelve el código de salida.
    async fn start_daemon(&self, node_ip: &str, coordinator: &str) -> io::Result<Option<i32>>;

    /// Empieza a seguir el log en segundo plano.
    async fn follow_log(&self) -> io::Result<()>;

    fn mark_ready(&self);

    async fn probe_peer(&self, address: &str) -> bool;

    async fn sleep(&self, duration: Duration);

    async fn run_benchmark(
        &self,
        command: &[String],
        timeout: Option<Duration>,
    ) -> io::Result<RunOutcome>;

    async fn read_log(&self) -> io::Result<String>;

    /// Ok(true) si se envió la señal, Ok(false) si el proceso ya no existía.
    async fn terminate(&self, pid: u32) -> io::Result<bool>;

    async fn load_report(&self) -> io::Result<Option<RunReport>>;

    async fn save_report(&self, report: &RunReport) -> io::Result<()>;

    /// Bloquea hasta que el orquestador termine el proceso.
    async fn hold(&self);
}

pub struct Bootstrap<R> {
    plan: BootstrapPlan,
    runtime: R,
}

impl<R: NodeRuntime> Bootstrap<R> {
    pub fn new(plan: BootstrapPlan, runtime: R) -> Self {
        Self { plan, runtime }
    }

    pub fn plan(&self) -> &BootstrapPlan {
        &self.plan
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    fn enter(&self, phase: Phase) {
        info!(
            "{} ({}) -> {:?}",
            self.plan.identity.hostname(),
            self.plan.role(),
            phase
        );
        self.runtime.enter(phase);
    }

    pub async fn run(&self) -> Result<BootstrapOutcome, StartupError> {
        self.enter(Phase::Init);
        self.runtime
            .check_workspace()
            .await
            .map_err(StartupError::Workspace)?;

        self.enter(Phase::DaemonStarting);
        self.runtime.reset_log().await.map_err(StartupError::Log)?;

        let coordinator = self.plan.coordinator_address();
        match self
            .runtime
            .start_daemon(&self.plan.node_ip, &coordinator)
            .await
            .map_err(StartupError::Daemon)?
        {
            Some(0) => info!(
                "esrallyd iniciado (node-ip={} coordinator-ip={})",
                self.plan.node_ip, coordinator
            ),
            code => warn!("esrallyd start terminó con código {:?}, seguimos", code),
        }

        self.runtime.follow_log().await.map_err(StartupError::Log)?;
        self.runtime.mark_ready();

        self.enter(Phase::RoleBranch);
        match self.plan.role() {
            NodeRole::Worker => {
                self.enter(Phase::TailForever);
                self.runtime.hold().await;
                Ok(BootstrapOutcome::Worker)
            }
            NodeRole::Coordinator => self.coordinate().await,
        }
    }

    async fn coordinate(&self) -> Result<BootstrapOutcome, StartupError> {
        // el contenedor puede reiniciarse después de terminar: el benchmark corre una sola vez
        if let Some(previous) = self
            .runtime
            .load_report()
            .await
            .map_err(StartupError::Report)?
        {
            if self.plan.owns(&previous) {
                info!(
                    "ya existe el reporte {} ({:?}), no se relanza el benchmark",
                    previous.run_id, previous.outcome
                );
                self.enter(Phase::Completed);
                return Ok(BootstrapOutcome::AlreadyRan(previous));
            }
            info!(
                "el reporte {} es de otra corrida (clave {:?}), se lanza de nuevo",
                previous.run_id, previous.run_key
            );
        }

        let started_at = Utc::now();

        self.enter(Phase::CoordinatorWait);
        let barrier = self.wait_for_peers().await;

        self.enter(Phase::RunBenchmark);
        info!("lanzando benchmark: {}", self.plan.command.join(" "));
        let outcome = match self
            .runtime
            .run_benchmark(&self.plan.command, self.plan.benchmark_timeout)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => RunOutcome::SpawnFailed {
                reason: e.to_string(),
            },
        };
        if outcome.is_success() {
            info!("benchmark terminado correctamente");
        } else {
            warn!("benchmark falló: {:?}", outcome);
        }

        self.enter(Phase::TailAndShutdown);
        let shutdown = self.shutdown_daemon().await;

        let report = RunReport {
            format_version: REPORT_FORMAT_VERSION,
            run_id: uuid::Uuid::new_v4().to_string(),
            run_key: self.plan.run_key.clone(),
            instance: self.plan.identity.instance.clone(),
            coordinator: self.plan.coordinator_address(),
            command: self.plan.command.clone(),
            barrier,
            outcome,
            shutdown,
            started_at,
            finished_at: Utc::now(),
        };

        if let Err(e) = self.runtime.save_report(&report).await {
            warn!("no se pudo guardar el reporte {}: {:?}", report.run_id, e);
        }

        self.enter(Phase::Completed);
        Ok(BootstrapOutcome::Ran(report))
    }

    async fn wait_for_peers(&self) -> BarrierReport {
        match self.plan.barrier {
            StartupBarrier::Fixed { wait } => {
                info!("esperando {:?} a que arranquen los demás nodos", wait);
                self.runtime.sleep(wait).await;
                BarrierReport {
                    mode: BarrierMode::Fixed,
                    waited_ms: wait.as_millis() as u64,
                    ready: Vec::new(),
                    missing: Vec::new(),
                }
            }
            StartupBarrier::Readiness {
                timeout,
                poll_interval,
            } => {
                let poll_interval = poll_interval.max(Duration::from_millis(1));
                let started = Instant::now();
                let deadline = started + timeout;
                let mut pending = worker_addresses(&self.plan.identity.instance, self.plan.nodes);
                let mut ready = Vec::new();

                loop {
                    // cada vuelta consulta a todos a la vez y no pasa del deadline
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    let probes = join_all(pending.iter().map(|a| self.runtime.probe_peer(a)));
                    let answers = tokio::time::timeout(remaining, probes).await;
                    if let Ok(answers) = answers {
                        let mut still_pending = Vec::new();
                        for (address, ok) in pending.into_iter().zip(answers) {
                            if ok {
                                info!("worker {} listo", address);
                                ready.push(address);
                            } else {
                                still_pending.push(address);
                            }
                        }
                        pending = still_pending;
                    }

                    if pending.is_empty() {
                        break;
                    }
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        warn!(
                            "timeout de {:?} esperando workers, faltan {:?}; se lanza igual",
                            timeout, pending
                        );
                        break;
                    }

                    self.runtime.sleep(poll_interval.min(remaining)).await;
                }

                BarrierReport {
                    mode: BarrierMode::Readiness,
                    waited_ms: started.elapsed().as_millis() as u64,
                    ready,
                    missing: pending,
                }
            }
        }
    }

    /// Busca los PIDs de esrallyd en el log y los mata. Nunca falla.
    async fn shutdown_daemon(&self) -> ShutdownReport {
        let mut report = ShutdownReport::default();

        let log = match self.runtime.read_log().await {
            Ok(log) => log,
            Err(e) => {
                warn!("no se pudo leer el log para buscar el PID: {:?}", e);
                report.errors.push(e.to_string());
                return report;
            }
        };

        report.pids_found = self.plan.log_format.extract_pids(&log);
        if report.pids_found.is_empty() {
            warn!(
                "no se encontró ninguna línea PID (formato {}) en el log",
                self.plan.log_format
            );
        }

        for pid in report.pids_found.clone() {
            match self.runtime.terminate(pid).await {
                Ok(true) => {
                    info!("esrallyd (pid {}) terminado", pid);
                    report.signalled.push(pid);
                }
                Ok(false) => report.not_running.push(pid),
                Err(e) => {
                    warn!("error matando pid {}: {:?}", pid, e);
                    report.errors.push(format!("pid {}: {}", pid, e));
                }
            }
        }

        report
    }
}
