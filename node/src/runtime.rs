use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use common::{NodeRuntime, Phase, RunOutcome, RunReport};
use reqwest::Client;
use sysinfo::{Pid, PidExt, ProcessExt, Signal, System, SystemExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::state::{lock, AppState};
use crate::tail;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const TAIL_INTERVAL: Duration = Duration::from_millis(500);
const WORKSPACE_PROBE: &str = ".rally-node-probe";

/// Runtime real: procesos, archivos del volumen y HTTP hacia los otros nodos.
pub struct ProcessRuntime {
    config: NodeConfig,
    state: AppState,
    client: Client,
    tail: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessRuntime {
    pub fn new(config: NodeConfig, state: AppState) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(PROBE_TIMEOUT).build()?;
        Ok(Self {
            config,
            state,
            client,
            tail: Mutex::new(None),
        })
    }
}

async fn ensure_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

#[async_trait]
impl NodeRuntime for ProcessRuntime {
    fn enter(&self, phase: Phase) {
        *lock(&self.state.phase) = phase;
    }

    async fn check_workspace(&self) -> io::Result<()> {
        let status_file = self.config.status_file();
        ensure_parent(&status_file).await?;

        let probe = self.config.workspace.join(WORKSPACE_PROBE);
        tokio::fs::write(&probe, b"ok").await?;
        tokio::fs::remove_file(&probe).await?;
        Ok(())
    }

    async fn reset_log(&self) -> io::Result<()> {
        ensure_parent(&self.config.log_file).await?;
        tokio::fs::File::create(&self.config.log_file).await?;
        Ok(())
    }

    async fn start_daemon(&self, node_ip: &str, coordinator: &str) -> io::Result<Option<i32>> {
        info!(
            "lanzando {} start --node-ip={} --coordinator-ip={}",
            self.config.daemon_bin.display(),
            node_ip,
            coordinator
        );
        // esrallyd start se demoniza solo y devuelve enseguida
        let status = Command::new(&self.config.daemon_bin)
            .arg("start")
            .arg(format!("--node-ip={}", node_ip))
            .arg(format!("--coordinator-ip={}", coordinator))
            .status()
            .await?;
        Ok(status.code())
    }

    async fn follow_log(&self) -> io::Result<()> {
        let handle = tail::spawn(self.config.log_file.clone(), TAIL_INTERVAL);
        if let Some(previous) = lock(&self.tail).replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    fn mark_ready(&self) {
        *lock(&self.state.ready) = true;
    }

    async fn probe_peer(&self, address: &str) -> bool {
        let url = format!("http://{}:{}/ready", address, self.config.control_port);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("worker {} todavía no responde: {}", address, e);
                false
            }
        }
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn run_benchmark(
        &self,
        command: &[String],
        timeout: Option<Duration>,
    ) -> io::Result<RunOutcome> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "comando vacío"))?;

        let mut child = Command::new(program).args(args).kill_on_drop(true).spawn()?;

        let status = match timeout {
            Some(limit) => {
                let waited = tokio::time::timeout(limit, child.wait()).await;
                match waited {
                    Ok(status) => status?,
                    Err(_) => {
                        warn!("el benchmark superó {:?}, matando el proceso", limit);
                        if let Err(e) = child.kill().await {
                            warn!("no se pudo matar el benchmark: {:?}", e);
                        }
                        return Ok(RunOutcome::TimedOut {
                            after_secs: limit.as_secs(),
                        });
                    }
                }
            }
            None => child.wait().await?,
        };

        Ok(if status.success() {
            RunOutcome::Succeeded
        } else {
            RunOutcome::Failed {
                exit_code: status.code(),
            }
        })
    }

    async fn read_log(&self) -> io::Result<String> {
        tokio::fs::read_to_string(&self.config.log_file).await
    }

    async fn terminate(&self, pid: u32) -> io::Result<bool> {
        let pid = Pid::from_u32(pid);
        let mut sys = System::new();
        if !sys.refresh_process(pid) {
            return Ok(false);
        }
        let Some(process) = sys.process(pid) else {
            return Ok(false);
        };

        // equivalente a kill -9
        match process.kill_with(Signal::Kill) {
            Some(true) => Ok(true),
            Some(false) => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("no se pudo enviar SIGKILL a {}", pid),
            )),
            None => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "SIGKILL no soportado en esta plataforma",
            )),
        }
    }

    async fn load_report(&self) -> io::Result<Option<RunReport>> {
        let path = self.config.status_file();
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        match serde_json::from_slice::<RunReport>(&raw) {
            Ok(report) => Ok(Some(report)),
            Err(e) => {
                warn!(
                    "reporte ilegible en {} ({}), se ignora",
                    path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    async fn save_report(&self, report: &RunReport) -> io::Result<()> {
        let path = self.config.status_file();
        ensure_parent(&path).await?;

        let json = serde_json::to_vec_pretty(report)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        *lock(&self.state.report) = Some(report.clone());
        info!("reporte {} guardado en {}", report.run_id, path.display());
        Ok(())
    }

    async fn hold(&self) {
        shutdown_signal().await;
    }
}

/// Espera SIGTERM (scale-down, borrado del pod) o Ctrl+C.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("no se pudo escuchar Ctrl+C: {:?}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("no se pudo escuchar SIGTERM: {:?}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("señal de terminación recibida");
}
