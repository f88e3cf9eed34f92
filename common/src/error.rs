use std::io;

use thiserror::Error;

use crate::quantity::QuantityError;

/// Error al construir la topología. Nunca se devuelve un descriptor parcial.
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("nombre de instancia inválido {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("cantidad de nodos inválida: {0} (debe ser >= 1)")]
    InvalidNodeCount(i32),

    #[error("tamaño de persistencia inválido {input:?}: {source}")]
    InvalidStorageSize {
        input: String,
        #[source]
        source: QuantityError,
    },

    #[error("la etiqueta {key:?} usa el prefijo reservado del selector")]
    ReservedLabel { key: String },

    #[error("el comando de benchmark está vacío")]
    EmptyCommand,
}

/// Falla del arranque de un nodo (Init / DaemonStarting). Es fatal: el proceso
/// termina con error y el runtime del orquestador reinicia el pod.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("el workspace no es escribible: {0}")]
    Workspace(#[source] io::Error),

    #[error("no se pudo preparar el log del agente: {0}")]
    Log(#[source] io::Error),

    #[error("no se pudo lanzar esrallyd: {0}")]
    Daemon(#[source] io::Error),

    #[error("no se pudo leer el reporte previo: {0}")]
    Report(#[source] io::Error),
}
