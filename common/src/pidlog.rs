//! Protocolo implícito entre esrallyd y el apagado del coordinador:
//! esrallyd escribe su PID en el log y el coordinador lo extrae para matarlo.
//! Si esrallyd cambia el formato de esa línea hay que agregar una versión nueva.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Línea con `PID:<dígitos>` en cualquier posición; si hay varias en la
    /// misma línea vale la última.
    #[default]
    V1,
}

const V1_MARKER: &str = "PID:";

impl LogFormat {
    /// PIDs encontrados en el log, sin repetidos y en orden de aparición.
    pub fn extract_pids(&self, log: &str) -> Vec<u32> {
        let mut pids = Vec::new();
        for line in log.lines() {
            let found = match self {
                LogFormat::V1 => pid_from_v1_line(line),
            };
            if let Some(pid) = found {
                if !pids.contains(&pid) {
                    pids.push(pid);
                }
            }
        }
        pids
    }
}

fn pid_from_v1_line(line: &str) -> Option<u32> {
    // buscamos de derecha a izquierda el último marcador seguido de dígitos
    let mut end = line.len();
    while let Some(pos) = line[..end].rfind(V1_MARKER) {
        let digits: String = line[pos + V1_MARKER.len()..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let Ok(pid) = digits.parse::<u32>() {
            return Some(pid);
        }
        end = pos;
    }
    None
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::V1 => f.write_str("v1"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v1" => Ok(LogFormat::V1),
            other => Err(format!("formato de log desconocido: {other}")),
        }
    }
}
