use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use common::container::CONTROL_PORT;
use common::{BootstrapPlan, LogFormat, NodeIdentity, StartupBarrier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BarrierArg {
    Readiness,
    Fixed,
}

/// Flags de rally-node. Los renderiza `common::NodeArgs` en el StatefulSet;
/// rutas y puertos tienen defaults pensados para la imagen de esrally.
#[derive(Parser, Debug, Clone)]
#[command(name = "rally-node")]
#[command(about = "Agente de arranque de un nodo esrally (coordinador o worker)")]
pub struct NodeConfig {
    /// Nombre de la instancia EsRally (y del servicio headless)
    #[arg(long, env = "RALLY_INSTANCE")]
    pub instance: String,

    /// Cantidad total de nodos
    #[arg(long, env = "RALLY_NODES", default_value_t = 1)]
    pub nodes: u32,

    /// IP del propio pod
    #[arg(long, env = "MY_POD_IP")]
    pub node_ip: String,

    /// Hostname a usar en vez del del sistema (pruebas locales)
    #[arg(long, env = "RALLY_HOSTNAME")]
    pub hostname: Option<String>,

    #[arg(long, value_enum, default_value_t = BarrierArg::Readiness)]
    pub barrier: BarrierArg,

    /// Fixed: segundos de espera. Readiness: timeout.
    #[arg(long)]
    pub barrier_secs: Option<u64>,

    #[arg(long, default_value_t = 2000)]
    pub poll_interval_ms: u64,

    #[arg(long)]
    pub benchmark_timeout_secs: Option<u64>,

    #[arg(long, default_value = "v1")]
    pub log_format: LogFormat,

    /// Clave de la corrida (uid-generación del recurso EsRally)
    #[arg(long, env = "RALLY_RUN_KEY")]
    pub run_key: Option<String>,

    /// Volumen del pod (ya preparado por el init container)
    #[arg(long, env = "RALLY_WORKSPACE", default_value = "/esrally")]
    pub workspace: PathBuf,

    #[arg(long, env = "RALLY_LOG_FILE", default_value = "/rally/.rally/logs/rally.log")]
    pub log_file: PathBuf,

    #[arg(long, env = "RALLY_DAEMON_BIN", default_value = "/usr/local/bin/esrallyd")]
    pub daemon_bin: PathBuf,

    #[arg(long, env = "RALLY_CONTROL_PORT", default_value_t = CONTROL_PORT as u16)]
    pub control_port: u16,

    /// El coordinador sigue sirviendo /status después del benchmark
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub linger: bool,

    /// Comando de benchmark (después de "--")
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

impl NodeConfig {
    pub fn status_file(&self) -> PathBuf {
        self.workspace.join("status").join("report.json")
    }

    pub fn barrier(&self) -> StartupBarrier {
        match self.barrier {
            BarrierArg::Fixed => StartupBarrier::Fixed {
                wait: self
                    .barrier_secs
                    .map(Duration::from_secs)
                    .unwrap_or(common::bootstrap::DEFAULT_FIXED_BARRIER),
            },
            BarrierArg::Readiness => StartupBarrier::Readiness {
                timeout: self
                    .barrier_secs
                    .map(Duration::from_secs)
                    .unwrap_or(common::bootstrap::DEFAULT_READINESS_TIMEOUT),
                poll_interval: Duration::from_millis(self.poll_interval_ms),
            },
        }
    }

    pub fn plan(&self, identity: NodeIdentity) -> BootstrapPlan {
        BootstrapPlan {
            identity,
            nodes: self.nodes,
            node_ip: self.node_ip.clone(),
            barrier: self.barrier(),
            command: self.command.clone(),
            benchmark_timeout: self.benchmark_timeout_secs.map(Duration::from_secs),
            log_format: self.log_format,
            run_key: self.run_key.clone(),
        }
    }
}
