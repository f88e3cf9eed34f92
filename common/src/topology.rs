use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec, Service,
    ServicePort, ServiceSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use tracing::debug;

use crate::args::NodeArgs;
use crate::container::{
    daemon_container, init_container, CONTROL_PORT, CONTROL_PORT_NAME, DATA_VOLUME,
    TRANSPORT_PORT, TRANSPORT_PORT_NAME,
};
use crate::crd::EsRally;
use crate::error::ConstructionError;
use crate::labels::{merge_pod_labels, selector_labels};
use crate::quantity::StorageSize;

/// Largo máximo de un hostname (etiqueta DNS).
const MAX_HOSTNAME_LEN: usize = 63;

/// Estado deseado completo para el loop de reconciliación.
/// Se reconstruye entero ante cada cambio del spec.
#[derive(Debug, Clone)]
pub struct Topology {
    pub stateful_set: StatefulSet,
    pub service: Service,
}

impl Topology {
    pub fn build(cr: &EsRally) -> Result<Self, ConstructionError> {
        let name = cr.name_any();
        let spec = &cr.spec;

        let replicas = spec.nodes.unwrap_or(1);
        if replicas < 1 {
            return Err(ConstructionError::InvalidNodeCount(replicas));
        }
        validate_instance_name(&name, replicas as u32)?;

        if spec.command.is_empty() {
            return Err(ConstructionError::EmptyCommand);
        }

        let size = StorageSize::parse(&spec.persistence.size).map_err(|source| {
            ConstructionError::InvalidStorageSize {
                input: spec.persistence.size.clone(),
                source,
            }
        })?;

        let selector = selector_labels(&name);
        let pod_labels = merge_pod_labels(
            &selector,
            &spec.pod_config.pod_labels,
            spec.pod_config.label_policy,
        )?;

        let object_meta = ObjectMeta {
            name: Some(name.clone()),
            namespace: cr.namespace(),
            ..Default::default()
        };

        let volume_claims = vec![PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(DATA_VOLUME.to_string()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(BTreeMap::from([(
                        "storage".to_string(),
                        size.to_quantity(),
                    )])),
                    ..Default::default()
                }),
                storage_class_name: Some(spec.persistence.storage_class.clone()),
                ..Default::default()
            }),
            ..Default::default()
        }];

        let node_args =
            NodeArgs::from_spec(&name, replicas as u32, spec).with_run_key(run_key(cr));
        let scheduling = &spec.pod_config.pod_scheduling;

        let stateful_set = StatefulSet {
            metadata: object_meta.clone(),
            spec: Some(StatefulSetSpec {
                replicas: Some(replicas),
                selector: LabelSelector {
                    match_labels: Some(selector.clone()),
                    ..Default::default()
                },
                service_name: name.clone(),
                // todos los nodos arrancan a la vez; la barrera del coordinador los espera
                pod_management_policy: Some("Parallel".to_string()),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(pod_labels),
                        annotations: spec.pod_config.annotations.clone(),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        node_selector: scheduling.node_selector.clone(),
                        affinity: scheduling.affinity.clone(),
                        tolerations: scheduling.tolerations.clone(),
                        init_containers: Some(vec![init_container(spec)]),
                        containers: vec![daemon_container(spec, &node_args)],
                        ..Default::default()
                    }),
                },
                volume_claim_templates: Some(volume_claims),
                ..Default::default()
            }),
            ..Default::default()
        };

        let service = headless_service(object_meta, selector);

        debug!(
            "topología {}: {} réplicas, volumen {} ({} bytes)",
            name,
            replicas,
            size,
            size.bytes()
        );

        Ok(Self {
            stateful_set,
            service,
        })
    }

    pub fn replicas(&self) -> i32 {
        self.stateful_set
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(1)
    }
}

/// `{uid}-{generation}` del recurso. Cambia al recrearlo o al editar el spec,
/// así el coordinador no confunde el reporte de una corrida anterior.
fn run_key(cr: &EsRally) -> Option<String> {
    let uid = cr.uid()?;
    Some(match cr.metadata.generation {
        Some(generation) => format!("{}-{}", uid, generation),
        None => uid,
    })
}

/// Servicio headless que da los nombres `{instancia}-{i}.{instancia}`.
/// Publica direcciones no listas: el coordinador tiene que resolver a los
/// workers antes de que respondan /ready.
fn headless_service(metadata: ObjectMeta, selector: BTreeMap<String, String>) -> Service {
    Service {
        metadata,
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            publish_not_ready_addresses: Some(true),
            selector: Some(selector),
            ports: Some(vec![
                ServicePort {
                    name: Some(TRANSPORT_PORT_NAME.to_string()),
                    port: TRANSPORT_PORT,
                    target_port: Some(IntOrString::Int(TRANSPORT_PORT)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
                ServicePort {
                    name: Some(CONTROL_PORT_NAME.to_string()),
                    port: CONTROL_PORT,
                    target_port: Some(IntOrString::Int(CONTROL_PORT)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// El nombre tiene que ser una etiqueta DNS válida incluso con el ordinal más alto.
fn validate_instance_name(name: &str, replicas: u32) -> Result<(), ConstructionError> {
    let invalid = |reason: &str| ConstructionError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("vacío"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid("solo se permiten minúsculas, dígitos y '-'"));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid("no puede empezar ni terminar con '-'"));
    }

    let longest = crate::identity::hostname(name, replicas - 1);
    if longest.len() > MAX_HOSTNAME_LEN {
        return Err(invalid(&format!(
            "el hostname {} supera {} caracteres",
            longest, MAX_HOSTNAME_LEN
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{EsRallySpec, ImageSpec, PersistenceSpec};
    use crate::identity::coordinator_address;
    use crate::labels::{LabelPolicy, BENCHMARK_LABEL, INSTANCE_LABEL};

    fn esrally(name: &str, nodes: Option<i32>, size: &str) -> EsRally {
        let mut cr = EsRally::new(
            name,
            EsRallySpec {
                image: ImageSpec {
                    name: "xridge/esrally:1.4.0".to_string(),
                    pull_policy: Some("Always".to_string()),
                },
                nodes,
                persistence: PersistenceSpec {
                    size: size.to_string(),
                    storage_class: "fast".to_string(),
                },
                command: vec!["esrally".into(), "race".into(), "--track=geonames".into()],
                ..Default::default()
            },
        );
        cr.metadata.namespace = Some("perf".to_string());
        cr
    }

    fn sts_spec(t: &Topology) -> &StatefulSetSpec {
        t.stateful_set.spec.as_ref().unwrap()
    }

    fn pod_labels(t: &Topology) -> BTreeMap<String, String> {
        sts_spec(t)
            .template
            .metadata
            .as_ref()
            .and_then(|m| m.labels.clone())
            .unwrap()
    }

    #[test]
    fn bench1_tres_nodos_5gi() {
        let t = Topology::build(&esrally("bench1", Some(3), "5Gi")).unwrap();
        let spec = sts_spec(&t);

        assert_eq!(t.replicas(), 3);
        assert_eq!(spec.service_name, "bench1");
        assert_eq!(t.stateful_set.metadata.name.as_deref(), Some("bench1"));
        assert_eq!(t.stateful_set.metadata.namespace.as_deref(), Some("perf"));

        let claims = spec.volume_claim_templates.as_ref().unwrap();
        assert_eq!(claims.len(), 1);
        let claim = &claims[0];
        assert_eq!(claim.metadata.name.as_deref(), Some("data"));
        let claim_spec = claim.spec.as_ref().unwrap();
        assert_eq!(
            claim_spec.access_modes.as_ref().unwrap(),
            &vec!["ReadWriteOnce"]
        );
        assert_eq!(claim_spec.storage_class_name.as_deref(), Some("fast"));
        let requested = &claim_spec.resources.as_ref().unwrap().requests.as_ref().unwrap()["storage"];
        assert_eq!(
            StorageSize::parse(&requested.0).unwrap().bytes(),
            5 * (1u64 << 30)
        );

        assert_eq!(coordinator_address("bench1"), "bench1-0.bench1");
        let args = spec.template.spec.as_ref().unwrap().containers[0]
            .args
            .clone()
            .unwrap();
        assert!(args.windows(2).any(|w| w[0] == "--instance" && w[1] == "bench1"));
        assert!(args.windows(2).any(|w| w[0] == "--nodes" && w[1] == "3"));
    }

    fn daemon_args(t: &Topology) -> Vec<String> {
        sts_spec(t).template.spec.as_ref().unwrap().containers[0]
            .args
            .clone()
            .unwrap()
    }

    #[test]
    fn run_key_sale_de_uid_y_generacion() {
        let mut cr = esrally("bench1", Some(2), "1Gi");
        assert!(!daemon_args(&Topology::build(&cr).unwrap())
            .iter()
            .any(|a| a.starts_with("--run-key")));

        cr.metadata.uid = Some("6f1c".to_string());
        cr.metadata.generation = Some(3);
        let first = daemon_args(&Topology::build(&cr).unwrap());
        assert!(first.contains(&"--run-key=6f1c-3".to_string()));

        // editar el spec sube la generación y cambia la clave
        cr.metadata.generation = Some(4);
        let second = daemon_args(&Topology::build(&cr).unwrap());
        assert!(second.contains(&"--run-key=6f1c-4".to_string()));
    }

    #[test]
    fn replicas_exactas_para_cualquier_n() {
        for n in 1..=12 {
            let t = Topology::build(&esrally("bench1", Some(n), "1Gi")).unwrap();
            assert_eq!(t.replicas(), n);
            assert_eq!(sts_spec(&t).service_name, "bench1");
        }
    }

    #[test]
    fn sin_nodes_hay_una_replica() {
        let t = Topology::build(&esrally("bench1", None, "1Gi")).unwrap();
        assert_eq!(t.replicas(), 1);
    }

    #[test]
    fn nodes_cero_o_negativo_se_rechaza() {
        for n in [0, -1, -100] {
            let err = Topology::build(&esrally("bench1", Some(n), "1Gi")).unwrap_err();
            assert!(matches!(err, ConstructionError::InvalidNodeCount(v) if v == n));
        }
    }

    #[test]
    fn tamano_malformado_no_produce_descriptor() {
        for size in ["bogus", "", "10GB", "-5Gi"] {
            let err = Topology::build(&esrally("bench1", Some(3), size)).unwrap_err();
            assert!(
                matches!(err, ConstructionError::InvalidStorageSize { ref input, .. } if input == size),
                "{size}: {err:?}"
            );
        }
    }

    #[test]
    fn comando_vacio_se_rechaza() {
        let mut cr = esrally("bench1", Some(2), "1Gi");
        cr.spec.command.clear();
        assert!(matches!(
            Topology::build(&cr),
            Err(ConstructionError::EmptyCommand)
        ));
    }

    #[test]
    fn nombres_invalidos() {
        for name in ["Bench1", "bench_1", "-bench", "bench-"] {
            assert!(matches!(
                Topology::build(&esrally(name, Some(1), "1Gi")),
                Err(ConstructionError::InvalidName { .. })
            ));
        }

        // 61 + "-9" = 63 entra, "-10" ya no
        let long = "a".repeat(61);
        assert!(Topology::build(&esrally(&long, Some(10), "1Gi")).is_ok());
        assert!(Topology::build(&esrally(&long, Some(11), "1Gi")).is_err());
    }

    #[test]
    fn selector_presente_en_etiquetas_del_pod() {
        let mut cr = esrally("bench1", Some(2), "1Gi");
        cr.spec.pod_config.pod_labels =
            BTreeMap::from([("team".to_string(), "search".to_string())]);

        let t = Topology::build(&cr).unwrap();
        let labels = pod_labels(&t);
        let selector = sts_spec(&t).selector.match_labels.clone().unwrap();

        assert_eq!(selector, selector_labels("bench1"));
        for (k, v) in &selector {
            assert_eq!(labels.get(k), Some(v));
        }
        assert_eq!(labels["team"], "search");
        assert_eq!(
            t.service.spec.as_ref().unwrap().selector.as_ref(),
            Some(&selector)
        );
    }

    #[test]
    fn colision_con_selector_rechazada_o_pisada_segun_politica() {
        let mut cr = esrally("bench1", Some(2), "1Gi");
        cr.spec.pod_config.pod_labels =
            BTreeMap::from([(INSTANCE_LABEL.to_string(), "otra".to_string())]);

        assert!(matches!(
            Topology::build(&cr),
            Err(ConstructionError::ReservedLabel { .. })
        ));

        cr.spec.pod_config.label_policy = LabelPolicy::Override;
        let t = Topology::build(&cr).unwrap();
        let labels = pod_labels(&t);
        assert_eq!(labels[INSTANCE_LABEL], "otra");
        assert_eq!(labels[BENCHMARK_LABEL], "esrally");
        // el selector del StatefulSet no cambia
        assert_eq!(
            sts_spec(&t).selector.match_labels.as_ref().unwrap()[INSTANCE_LABEL],
            "bench1"
        );
    }

    #[test]
    fn pod_template_tiene_init_y_daemon() {
        let t = Topology::build(&esrally("bench1", Some(2), "1Gi")).unwrap();
        let pod = sts_spec(&t).template.spec.as_ref().unwrap();

        let init = pod.init_containers.as_ref().unwrap();
        assert_eq!(init.len(), 1);
        assert_eq!(init[0].name, "init");
        assert_eq!(pod.containers.len(), 1);
        assert_eq!(pod.containers[0].name, "esrallyd");
        assert_eq!(
            sts_spec(&t).pod_management_policy.as_deref(),
            Some("Parallel")
        );
    }

    #[test]
    fn servicio_headless_con_nombre_de_instancia() {
        let t = Topology::build(&esrally("bench1", Some(2), "1Gi")).unwrap();
        let svc = t.service.spec.as_ref().unwrap();

        assert_eq!(t.service.metadata.name.as_deref(), Some("bench1"));
        assert_eq!(svc.cluster_ip.as_deref(), Some("None"));
        assert_eq!(svc.publish_not_ready_addresses, Some(true));
        let ports: Vec<i32> = svc.ports.as_ref().unwrap().iter().map(|p| p.port).collect();
        assert_eq!(ports, vec![1900, 1901]);
    }
}
