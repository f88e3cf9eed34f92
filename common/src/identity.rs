//! Identidad ordinal de cada nodo.
//!
//! El StatefulSet le da a cada réplica un nombre estable `{instancia}-{i}`.
//! El ordinal 0 es siempre el coordinador; no hay elección ni mensajes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeRole {
    Coordinator,
    Worker,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Coordinator => f.write_str("coordinator"),
            NodeRole::Worker => f.write_str("worker"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("el hostname {hostname:?} no pertenece a la instancia {instance:?}")]
    ForeignHostname { instance: String, hostname: String },

    #[error("el hostname {0:?} no termina en un ordinal")]
    MissingOrdinal(String),
}

/// hostname(i) = "{instance}-{i}"
pub fn hostname(instance: &str, ordinal: u32) -> String {
    format!("{}-{}", instance, ordinal)
}

/// Hostnames de todas las réplicas, en orden de ordinal.
pub fn hostnames(instance: &str, nodes: u32) -> Vec<String> {
    (0..nodes).map(|i| hostname(instance, i)).collect()
}

pub fn coordinator_hostname(instance: &str) -> String {
    hostname(instance, 0)
}

/// Dirección DNS estable de una réplica a través del servicio headless
/// que se llama igual que la instancia.
pub fn peer_address(instance: &str, ordinal: u32) -> String {
    format!("{}.{}", hostname(instance, ordinal), instance)
}

/// `{instance}-0.{instance}`. Tanto el StatefulSet como el agente de cada
/// nodo derivan la dirección del coordinador desde aquí.
pub fn coordinator_address(instance: &str) -> String {
    peer_address(instance, 0)
}

/// Direcciones de todos los workers (ordinales 1..N).
pub fn worker_addresses(instance: &str, nodes: u32) -> Vec<String> {
    (1..nodes).map(|i| peer_address(instance, i)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub instance: String,
    pub ordinal: u32,
}

impl NodeIdentity {
    pub fn new(instance: impl Into<String>, ordinal: u32) -> Self {
        Self {
            instance: instance.into(),
            ordinal,
        }
    }

    /// Deriva la identidad a partir del hostname del propio pod.
    /// Acepta tanto el nombre corto como el FQDN (solo mira la primera etiqueta).
    pub fn from_hostname(instance: &str, hostname: &str) -> Result<Self, IdentityError> {
        let short = hostname.split('.').next().unwrap_or_default();

        let suffix = short
            .strip_prefix(instance)
            .and_then(|rest| rest.strip_prefix('-'))
            .ok_or_else(|| IdentityError::ForeignHostname {
                instance: instance.to_string(),
                hostname: hostname.to_string(),
            })?;

        if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
            return Err(IdentityError::MissingOrdinal(hostname.to_string()));
        }

        let ordinal = suffix
            .parse::<u32>()
            .map_err(|_| IdentityError::MissingOrdinal(hostname.to_string()))?;

        Ok(Self::new(instance, ordinal))
    }

    pub fn role(&self) -> NodeRole {
        if self.ordinal == 0 {
            NodeRole::Coordinator
        } else {
            NodeRole::Worker
        }
    }

    pub fn hostname(&self) -> String {
        hostname(&self.instance, self.ordinal)
    }

    pub fn address(&self) -> String {
        peer_address(&self.instance, self.ordinal)
    }

    pub fn coordinator_address(&self) -> String {
        coordinator_address(&self.instance)
    }
}
