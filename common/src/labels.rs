use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConstructionError;

/// Prefijo reservado para las etiquetas que usa el selector.
pub const RESERVED_PREFIX: &str = "perf.kubestone.xridge.io/";
pub const BENCHMARK_LABEL: &str = "perf.kubestone.xridge.io/benchmark";
pub const INSTANCE_LABEL: &str = "perf.kubestone.xridge.io/instance";
pub const BENCHMARK_NAME: &str = "esrally";

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum LabelPolicy {
    /// Rechaza etiquetas del usuario con el prefijo reservado
    #[default]
    Reject,
    /// Merge histórico: la etiqueta del usuario pisa a la del selector
    Override,
}

/// Etiquetas que atan el StatefulSet a sus propios pods.
pub fn selector_labels(instance: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (BENCHMARK_LABEL.to_string(), BENCHMARK_NAME.to_string()),
        (INSTANCE_LABEL.to_string(), instance.to_string()),
    ])
}

/// Etiquetas del pod = selector + etiquetas del usuario.
pub fn merge_pod_labels(
    selector: &BTreeMap<String, String>,
    caller: &BTreeMap<String, String>,
    policy: LabelPolicy,
) -> Result<BTreeMap<String, String>, ConstructionError> {
    let mut labels = selector.clone();

    for (key, value) in caller {
        let reserved = key.starts_with(RESERVED_PREFIX);

        match policy {
            LabelPolicy::Reject if reserved => {
                return Err(ConstructionError::ReservedLabel { key: key.clone() });
            }
            LabelPolicy::Override if selector.contains_key(key) => {
                warn!(
                    "la etiqueta {} del pod pisa al selector ({} -> {}), el StatefulSet puede perder sus pods",
                    key, selector[key], value
                );
            }
            _ => {}
        }

        labels.insert(key.clone(), value.clone());
    }

    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn selector_tiene_benchmark_e_instancia() {
        let sel = selector_labels("bench1");
        assert_eq!(sel.len(), 2);
        assert_eq!(sel[BENCHMARK_LABEL], "esrally");
        assert_eq!(sel[INSTANCE_LABEL], "bench1");
    }

    #[test]
    fn merge_conserva_selector_y_agrega_etiquetas() {
        let sel = selector_labels("bench1");
        let merged = merge_pod_labels(
            &sel,
            &caller(&[("team", "search"), ("tier", "perf")]),
            LabelPolicy::Reject,
        )
        .unwrap();

        assert_eq!(merged.len(), 4);
        for (k, v) in &sel {
            assert_eq!(merged.get(k), Some(v));
        }
        assert_eq!(merged["team"], "search");
    }

    #[test]
    fn merge_rechaza_prefijo_reservado_por_defecto() {
        let sel = selector_labels("bench1");

        let err = merge_pod_labels(
            &sel,
            &caller(&[(INSTANCE_LABEL, "otra")]),
            LabelPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConstructionError::ReservedLabel { ref key } if key == INSTANCE_LABEL));

        // cualquier clave con el prefijo, aunque no choque con el selector
        assert!(merge_pod_labels(
            &sel,
            &caller(&[("perf.kubestone.xridge.io/extra", "x")]),
            LabelPolicy::Reject,
        )
        .is_err());
    }

    #[test]
    fn merge_override_deja_ganar_al_usuario_en_colision() {
        let sel = selector_labels("bench1");
        let merged = merge_pod_labels(
            &sel,
            &caller(&[(INSTANCE_LABEL, "otra"), ("team", "search")]),
            LabelPolicy::Override,
        )
        .unwrap();

        assert_eq!(merged[INSTANCE_LABEL], "otra");
        assert_eq!(merged[BENCHMARK_LABEL], "esrally");
        assert_eq!(merged["team"], "search");
    }
}
