//! Contrato de línea de comandos de `rally-node`.
//! El StatefulSet lo renderiza con `to_args` y el nodo lo parsea con clap.

use std::time::Duration;

use crate::bootstrap::StartupBarrier;
use crate::crd::EsRallySpec;
use crate::pidlog::LogFormat;

pub const NODE_BINARY: &str = "/usr/local/bin/rally-node";

#[derive(Debug, Clone, PartialEq)]
pub struct NodeArgs {
    pub instance: String,
    pub nodes: u32,
    pub barrier: StartupBarrier,
    pub benchmark_timeout: Option<Duration>,
    pub log_format: LogFormat,
    /// Identifica la corrida: un reporte previo con otra clave no cuenta
    pub run_key: Option<String>,
    pub command: Vec<String>,
}

impl NodeArgs {
    pub fn from_spec(instance: &str, nodes: u32, spec: &EsRallySpec) -> Self {
        Self {
            instance: instance.to_string(),
            nodes,
            barrier: StartupBarrier::from_spec(spec.startup.as_ref()),
            benchmark_timeout: spec
                .benchmark_timeout_seconds
                .map(|s| Duration::from_secs(s as u64)),
            log_format: LogFormat::V1,
            run_key: None,
            command: spec.command.clone(),
        }
    }

    pub fn with_run_key(mut self, run_key: Option<String>) -> Self {
        self.run_key = run_key;
        self
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--instance".to_string(),
            self.instance.clone(),
            "--nodes".to_string(),
            self.nodes.to_string(),
        ];

        match self.barrier {
            StartupBarrier::Fixed { wait } => {
                args.push("--barrier=fixed".to_string());
                args.push(format!("--barrier-secs={}", wait.as_secs()));
            }
            StartupBarrier::Readiness {
                timeout,
                poll_interval,
            } => {
                args.push("--barrier=readiness".to_string());
                args.push(format!("--barrier-secs={}", timeout.as_secs()));
                args.push(format!("--poll-interval-ms={}", poll_interval.as_millis()));
            }
        }

        if let Some(timeout) = self.benchmark_timeout {
            args.push(format!("--benchmark-timeout-secs={}", timeout.as_secs()));
        }

        args.push(format!("--log-format={}", self.log_format));

        if let Some(key) = &self.run_key {
            args.push(format!("--run-key={}", key));
        }

        // el comando va literal después de "--", sin pasar por un shell
        args.push("--".to_string());
        args.extend(self.command.iter().cloned());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{BarrierKind, StartupSpec};

    fn spec() -> EsRallySpec {
        EsRallySpec {
            command: vec!["esrally".into(), "race".into(), "--track=geonames".into()],
            ..Default::default()
        }
    }

    #[test]
    fn args_por_defecto_usan_readiness() {
        let args = NodeArgs::from_spec("bench1", 3, &spec()).to_args();
        assert_eq!(
            args,
            vec![
                "--instance",
                "bench1",
                "--nodes",
                "3",
                "--barrier=readiness",
                "--barrier-secs=300",
                "--poll-interval-ms=2000",
                "--log-format=v1",
                "--",
                "esrally",
                "race",
                "--track=geonames",
            ]
        );
    }

    #[test]
    fn args_fixed_con_timeout_de_benchmark() {
        let mut s = spec();
        s.startup = Some(StartupSpec {
            barrier: BarrierKind::Fixed,
            seconds: None,
            poll_interval_ms: None,
        });
        s.benchmark_timeout_seconds = Some(900);

        let args = NodeArgs::from_spec("bench1", 2, &s).to_args();
        assert!(args.contains(&"--barrier=fixed".to_string()));
        assert!(args.contains(&"--barrier-secs=60".to_string()));
        assert!(args.contains(&"--benchmark-timeout-secs=900".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--poll-interval-ms")));
        // el comando queda al final y literal
        let sep = args.iter().position(|a| a == "--").unwrap();
        assert_eq!(&args[sep + 1..], &s.command[..]);
    }

    #[test]
    fn run_key_va_antes_del_comando() {
        let args = NodeArgs::from_spec("bench1", 1, &spec())
            .with_run_key(Some("0f3a-7".to_string()))
            .to_args();
        let key = args.iter().position(|a| a == "--run-key=0f3a-7").unwrap();
        let sep = args.iter().position(|a| a == "--").unwrap();
        assert!(key < sep);
    }
}
