mod config;
mod handlers;
mod runtime;
mod state;
mod tail;

use anyhow::{Context, Result};
use clap::Parser;
use common::{Bootstrap, BootstrapOutcome, NodeIdentity};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::NodeConfig;
use crate::runtime::{shutdown_signal, ProcessRuntime};
use crate::state::{lock, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rally_node=debug,common=info,tower_http=info,reqwest=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = NodeConfig::parse();

    // El hostname del pod define ordinal y rol
    let hostname = match &config.hostname {
        Some(h) => h.clone(),
        None => hostname::get()
            .context("no se pudo leer el hostname")?
            .to_string_lossy()
            .to_string(),
    };
    let identity = NodeIdentity::from_hostname(&config.instance, &hostname)?;
    info!(
        "nodo {} (ordinal {}, rol {}) de {} nodos",
        identity.hostname(),
        identity.ordinal,
        identity.role(),
        config.nodes
    );

    let state = AppState::new(identity.clone());

    // servidor de control: /health, /ready, /status
    let app = handlers::build_router(state.clone());
    let listener = TcpListener::bind(("0.0.0.0", config.control_port))
        .await
        .with_context(|| format!("no se pudo abrir el puerto {}", config.control_port))?;
    info!("control escuchando en {}", listener.local_addr()?);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("el servidor de control terminó: {:?}", e);
        }
    });

    let plan = config.plan(identity);
    let linger = config.linger;
    let runtime = ProcessRuntime::new(config, state.clone())?;

    let outcome = Bootstrap::new(plan, runtime).run().await?;
    match &outcome {
        BootstrapOutcome::Worker => {
            info!("worker detenido");
        }
        BootstrapOutcome::Ran(report) | BootstrapOutcome::AlreadyRan(report) => {
            // el reporte previo se publica solo si pertenece a esta corrida
            *lock(&state.report) = Some(report.clone());
            info!(
                "benchmark {} terminado: {:?}",
                report.run_id, report.outcome
            );
            if linger {
                info!("sirviendo /status hasta recibir SIGTERM");
                shutdown_signal().await;
            }
        }
    }

    Ok(())
}
