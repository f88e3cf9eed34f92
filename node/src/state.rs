// node/src/state.rs

use common::{NodeIdentity, NodeStatus, Phase, RunReport};
use std::sync::{Arc, Mutex, MutexGuard};

/// Estado compartido entre la máquina de arranque y el servidor de control.
#[derive(Clone)]
pub struct AppState {
    pub identity: NodeIdentity,
    pub phase: Arc<Mutex<Phase>>,
    // true una vez que esrallyd arrancó
    pub ready: Arc<Mutex<bool>>,
    // reporte del benchmark (solo coordinador)
    pub report: Arc<Mutex<Option<RunReport>>>,
}

impl AppState {
    pub fn new(identity: NodeIdentity) -> Self {
        Self {
            identity,
            phase: Arc::new(Mutex::new(Phase::Init)),
            ready: Arc::new(Mutex::new(false)),
            report: Arc::new(Mutex::new(None)),
        }
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            instance: self.identity.instance.clone(),
            hostname: self.identity.hostname(),
            ordinal: self.identity.ordinal,
            role: self.identity.role(),
            phase: *lock(&self.phase),
            ready: *lock(&self.ready),
            report: lock(&self.report).clone(),
        }
    }
}

/// Un lock envenenado no invalida el estado: son valores simples.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
