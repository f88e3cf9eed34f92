use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Affinity, ResourceRequirements, Toleration};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::labels::LabelPolicy;

/// Benchmark distribuido de esrally: N nodos, el ordinal 0 coordina.
#[derive(CustomResource, Serialize, Deserialize, Debug, Default, Clone, JsonSchema)]
#[kube(
    group = "perf.kubestone.xridge.io",
    version = "v1alpha1",
    kind = "EsRally",
    plural = "esrallies",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct EsRallySpec {
    /// Imagen con esrally, esrallyd y rally-node instalados
    pub image: ImageSpec,

    /// Cantidad de nodos (réplicas). Por defecto 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<i32>,

    #[serde(default)]
    pub pod_config: PodConfigurationSpec,

    pub persistence: PersistenceSpec,

    /// Comando de benchmark literal que ejecuta el coordinador,
    /// ej: ["esrally", "race", "--track=geonames", "--pipeline=benchmark-only"]
    pub command: Vec<String>,

    /// Cómo espera el coordinador a los demás nodos antes de lanzar el benchmark
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup: Option<StartupSpec>,

    /// Límite de tiempo para el comando de benchmark (sin límite si no se indica)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark_timeout_seconds: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    pub name: String,

    /// Always / IfNotPresent / Never
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_policy: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodConfigurationSpec {
    #[serde(default)]
    pub pod_labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default)]
    pub pod_scheduling: PodSchedulingSpec,

    /// Qué hacer si una etiqueta del usuario usa el prefijo reservado
    #[serde(default)]
    pub label_policy: LabelPolicy,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodSchedulingSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceSpec {
    /// Tamaño del volumen de cada pod, ej: "10Gi"
    pub size: String,

    pub storage_class: String,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum BarrierKind {
    /// El coordinador consulta /ready de cada worker hasta que todos respondan
    #[default]
    Readiness,
    /// Espera fija (comportamiento histórico)
    Fixed,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartupSpec {
    #[serde(default)]
    pub barrier: BarrierKind,

    /// Fixed: segundos de espera. Readiness: timeout total en segundos.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u32>,

    /// Solo para Readiness
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u32>,
}
