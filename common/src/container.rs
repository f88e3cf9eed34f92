use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, HTTPGetAction, ObjectFieldSelector, Probe,
    SecurityContext, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::args::{NodeArgs, NODE_BINARY};
use crate::crd::EsRallySpec;

pub const DATA_VOLUME: &str = "data";
pub const DATA_MOUNT_PATH: &str = "/esrally";
pub const POD_IP_ENV: &str = "MY_POD_IP";
pub const TRANSPORT_PORT: i32 = 1900;
pub const CONTROL_PORT: i32 = 1901;
pub const TRANSPORT_PORT_NAME: &str = "transport";
pub const CONTROL_PORT_NAME: &str = "control";

pub const INIT_CONTAINER: &str = "init";
pub const DAEMON_CONTAINER: &str = "esrallyd";

/// Crea el directorio de benchmarks en el volumen y se lo da al usuario rally.
pub const INIT_SCRIPT: &str = "mkdir -p  /esrally/benchmarks; chown -R rally:rally /esrally";
const ROOT_UID: i64 = 0;

/// Base común a los dos contenedores: imagen, pull policy, recursos y la IP del pod.
fn base_container(spec: &EsRallySpec, name: &str) -> Container {
    Container {
        name: name.to_string(),
        image: Some(spec.image.name.clone()),
        image_pull_policy: spec.image.pull_policy.clone(),
        resources: spec.pod_config.resources.clone(),
        env: Some(vec![EnvVar {
            name: POD_IP_ENV.to_string(),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: "status.podIP".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        volume_mounts: Some(vec![VolumeMount {
            name: DATA_VOLUME.to_string(),
            mount_path: DATA_MOUNT_PATH.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

/// Paso de init: corre como root una sola vez antes del daemon.
pub fn init_container(spec: &EsRallySpec) -> Container {
    Container {
        command: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
        args: Some(vec![INIT_SCRIPT.to_string()]),
        security_context: Some(SecurityContext {
            run_as_user: Some(ROOT_UID),
            ..Default::default()
        }),
        ..base_container(spec, INIT_CONTAINER)
    }
}

/// Contenedor de larga duración: rally-node arranca esrallyd y decide el rol.
pub fn daemon_container(spec: &EsRallySpec, node_args: &NodeArgs) -> Container {
    Container {
        command: Some(vec![NODE_BINARY.to_string()]),
        args: Some(node_args.to_args()),
        ports: Some(vec![
            ContainerPort {
                name: Some(TRANSPORT_PORT_NAME.to_string()),
                container_port: TRANSPORT_PORT,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            },
            ContainerPort {
                name: Some(CONTROL_PORT_NAME.to_string()),
                container_port: CONTROL_PORT,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            },
        ]),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/ready".to_string()),
                port: IntOrString::String(CONTROL_PORT_NAME.to_string()),
                ..Default::default()
            }),
            period_seconds: Some(5),
            ..Default::default()
        }),
        ..base_container(spec, DAEMON_CONTAINER)
    }
}
