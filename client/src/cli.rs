use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::container::CONTROL_PORT;
use common::identity::coordinator_address;
use common::{EsRally, NodeIdentity, NodeStatus, RunOutcome, StorageSize, Topology};
use kube::CustomResourceExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI para armar y consultar benchmarks esrally distribuidos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Genera el Service headless y el StatefulSet de un recurso EsRally (JSON)
    Render {
        #[arg(value_name = "ARCHIVO")]
        file: PathBuf,
    },
    /// Lista hostnames y roles de cada nodo
    Hosts {
        #[arg(value_name = "ARCHIVO")]
        file: PathBuf,
    },
    /// Valida un tamaño de volumen ("5Gi", "500M", ...)
    Size {
        #[arg(value_name = "TAMAÑO")]
        size: String,
    },
    /// Imprime la CustomResourceDefinition de EsRally
    Crd,
    /// Consulta /status del coordinador de una instancia
    Status {
        #[arg(value_name = "INSTANCIA")]
        instance: String,

        /// URL base del nodo (default: http://<instancia>-0.<instancia>:1901)
        #[arg(long, env = "RALLY_STATUS_URL")]
        url: Option<String>,
    },
}

fn load_resource(path: &Path) -> Result<EsRally> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("no se pudo leer {}", path.display()))?;
    let resource: EsRally = serde_json::from_str(&raw)
        .with_context(|| format!("{} no es un recurso EsRally válido", path.display()))?;
    Ok(resource)
}

/// Service primero: los pods necesitan el dominio headless para resolverse.
fn render(resource: &EsRally) -> Result<String> {
    let topology = Topology::build(resource)?;
    let list = serde_json::json!({
        "apiVersion": "v1",
        "kind": "List",
        "items": [topology.service, topology.stateful_set],
    });
    Ok(serde_json::to_string_pretty(&list)?)
}

fn host_lines(instance: &str, nodes: u32) -> Vec<String> {
    (0..nodes)
        .map(|ordinal| {
            let node = NodeIdentity::new(instance, ordinal);
            format!("{:<3} {:<32} {}", ordinal, node.hostname(), node.role())
        })
        .collect()
}

fn status_url(instance: &str, base: Option<&str>) -> String {
    let base = match base {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => format!("http://{}:{}", coordinator_address(instance), CONTROL_PORT),
    };
    format!("{}/status", base)
}

fn print_status(status: &NodeStatus) {
    println!("Nodo {}:", status.hostname);
    println!("  instancia: {}", status.instance);
    println!("  ordinal  : {}", status.ordinal);
    println!("  rol      : {}", status.role);
    println!("  fase     : {:?}", status.phase);
    println!("  ready    : {}", status.ready);

    match &status.report {
        Some(report) => {
            println!("  benchmark {}:", report.run_id);
            println!("    comando  : {}", report.command.join(" "));
            match &report.outcome {
                RunOutcome::Succeeded => println!("    resultado: OK"),
                RunOutcome::Failed { exit_code } => match exit_code {
                    Some(code) => println!("    resultado: falló (exit {})", code),
                    None => println!("    resultado: falló (terminado por señal)"),
                },
                RunOutcome::TimedOut { after_secs } => {
                    println!("    resultado: timeout después de {} s", after_secs)
                }
                RunOutcome::SpawnFailed { reason } => {
                    println!("    resultado: no se pudo lanzar ({})", reason)
                }
            }
            println!(
                "    barrera  : {:?}, {} ms, listos={}, faltantes={}",
                report.barrier.mode,
                report.barrier.waited_ms,
                report.barrier.ready.len(),
                report.barrier.missing.len()
            );
            if !report.barrier.missing.is_empty() {
                println!("    sin responder: {}", report.barrier.missing.join(", "));
            }
            println!(
                "    apagado  : pids={:?}, señalados={:?}, ya muertos={:?}",
                report.shutdown.pids_found,
                report.shutdown.signalled,
                report.shutdown.not_running
            );
            println!("    inicio   : {}", report.started_at);
            println!("    fin      : {}", report.finished_at);
        }
        None => println!("  (sin reporte de benchmark)"),
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render { file } => {
            let resource = load_resource(&file)?;
            println!("{}", render(&resource)?);
        }

        Commands::Hosts { file } => {
            let resource = load_resource(&file)?;
            let topology = Topology::build(&resource)?;
            let instance = kube::ResourceExt::name_any(&resource);
            println!("Instancia {} ({} nodos):", instance, topology.replicas());
            for line in host_lines(&instance, topology.replicas() as u32) {
                println!("  {}", line);
            }
            println!("Coordinador: {}", coordinator_address(&instance));
        }

        Commands::Size { size } => {
            let parsed = StorageSize::parse(&size)
                .with_context(|| format!("tamaño inválido: {:?}", size))?;
            println!("{} = {} bytes", parsed, parsed.bytes());
        }

        Commands::Crd => {
            println!("{}", serde_json::to_string_pretty(&EsRally::crd())?);
        }

        Commands::Status { instance, url } => {
            let url = status_url(&instance, url.as_deref());
            debug!("GET {}", url);
            let resp = Client::new().get(&url).send().await?;
            if resp.status().is_success() {
                let status: NodeStatus = resp.json().await?;
                print_status(&status);
            } else {
                println!("Error consultando {} (status {})", url, resp.status());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    fn resource_json(nodes: i32) -> String {
        serde_json::json!({
            "apiVersion": "perf.kubestone.xridge.io/v1alpha1",
            "kind": "EsRally",
            "metadata": { "name": "bench1", "namespace": "perf" },
            "spec": {
                "image": { "name": "elastic/rally:2.10.0" },
                "nodes": nodes,
                "persistence": { "size": "5Gi", "storageClass": "standard" },
                "command": ["esrally", "race", "--track=geonames"]
            }
        })
        .to_string()
    }

    fn write_resource(name: &str, body: &str) -> PathBuf {
        let dir = env::temp_dir().join("client_tests");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn render_incluye_service_y_statefulset() {
        let path = write_resource("render.json", &resource_json(3));
        let resource = load_resource(&path).unwrap();

        let out: serde_json::Value = serde_json::from_str(&render(&resource).unwrap()).unwrap();
        let items = out["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["kind"], "Service");
        assert_eq!(items[1]["kind"], "StatefulSet");
        assert_eq!(items[1]["spec"]["replicas"], 3);
        assert_eq!(items[1]["spec"]["serviceName"], "bench1");
    }

    #[test]
    fn render_propaga_errores_de_construccion() {
        let path = write_resource("cero.json", &resource_json(0));
        let resource = load_resource(&path).unwrap();
        assert!(render(&resource).is_err());
    }

    #[test]
    fn archivo_invalido_da_error() {
        let path = write_resource("roto.json", "{ esto no es json");
        assert!(load_resource(&path).is_err());
        assert!(load_resource(Path::new("/no/existe.json")).is_err());
    }

    #[test]
    fn hosts_marca_al_coordinador() {
        let lines = host_lines("bench1", 3);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("bench1-0") && lines[0].ends_with("coordinator"));
        assert!(lines[2].contains("bench1-2") && lines[2].ends_with("worker"));
        assert!(lines[1].ends_with(&NodeIdentity::new("bench1", 1).role().to_string()));
    }

    #[test]
    fn url_de_status() {
        assert_eq!(
            status_url("bench1", None),
            "http://bench1-0.bench1:1901/status"
        );
        assert_eq!(
            status_url("bench1", Some("http://localhost:1901/")),
            "http://localhost:1901/status"
        );
    }
}
