use std::collections::BTreeMap;

use super::structs::{EnvVars, Probe, ResourceList, ResourceRequirements, ServicePort, ServicePorts};
use super::{Accessibility, BuildMode, Config, Flag, Service, ServiceType};

/// Anything that contributes a partial `Config` to a composition
pub trait ConfigSource {
    fn config(&self) -> Config;
}

impl ConfigSource for Config {
    fn config(&self) -> Config {
        self.clone()
    }
}

impl<T: ConfigSource + ?Sized> ConfigSource for &T {
    fn config(&self) -> Config {
        (**self).config()
    }
}

/// Platform defaults for long running services, keyed on the service type
#[derive(Clone, Debug)]
pub struct ServiceDefaultsConfig {
    pub service_type: ServiceType,
}

impl ServiceDefaultsConfig {
    pub fn new(service_type: ServiceType) -> Self {
        ServiceDefaultsConfig { service_type }
    }
}

fn default_resources() -> ResourceRequirements {
    ResourceRequirements {
        requests: Some(ResourceList::new("100m", "256Mi")),
        limits: Some(ResourceList::new("1", "1Gi")),
    }
}

impl ConfigSource for ServiceDefaultsConfig {
    fn config(&self) -> Config {
        let common = Config {
            service_type: Some(self.service_type),
            resources: Some(default_resources()),
            termination_grace_period_seconds: Some(30),
            read_only_root_filesystem: Some(false),
            restart_policy: Some("Always".into()),
            ..Default::default()
        };
        match self.service_type {
            ServiceType::Web => Config {
                replicas: Some("2".into()),
                min_replicas: Some(2),
                max_replicas: Some(10),
                cpu_threshold: Some(80),
                memory_threshold: Some(80),
                autoscale: Some(Flag::Enabled),
                accessibility: Some(Accessibility::Internal),
                ports: ServicePorts(vec![ServicePort::tcp("http", 80, 5000)]),
                readiness_probe: Some(Probe::http("/status/ready")),
                liveness_probe: Some(Probe::http("/status/alive")),
                ..common
            },
            ServiceType::Worker => Config {
                replicas: Some("1".into()),
                autoscale: Some(Flag::Disabled),
                accessibility: Some(Accessibility::Cluster),
                ..common
            },
            // run-to-completion workloads take their defaults from TaskDefaultsConfig
            ServiceType::Task | ServiceType::Cron => Config {
                service_type: Some(self.service_type),
                ..Default::default()
            },
        }
    }
}

/// Platform defaults for run-to-completion workloads
#[derive(Clone, Debug)]
pub struct TaskDefaultsConfig {
    /// Whether the task runs on a schedule
    pub scheduled: bool,
}

impl ConfigSource for TaskDefaultsConfig {
    fn config(&self) -> Config {
        Config {
            service_type: Some(if self.scheduled { ServiceType::Cron } else { ServiceType::Task }),
            resources: Some(default_resources()),
            restart_policy: Some("Never".into()),
            backoff_limit: Some(2),
            active_deadline_seconds: Some(60 * 60),
            autoscale: Some(Flag::Disabled),
            accessibility: Some(Accessibility::Cluster),
            ..Default::default()
        }
    }
}

/// Values the builder knows from its own environment
#[derive(Clone, Debug, Default)]
pub struct BuilderConfig {
    pub build_mode: Option<BuildMode>,
    pub service_name: Option<String>,
    pub project_name: Option<String>,
    pub cluster_name: Option<String>,
    pub git_remote: Option<String>,
    pub git_ref: Option<String>,
    pub git_sha: Option<String>,
}

impl ConfigSource for BuilderConfig {
    fn config(&self) -> Config {
        Config {
            build_mode: self.build_mode,
            service_name: self.service_name.clone(),
            project_name: self.project_name.clone(),
            cluster_name: self.cluster_name.clone(),
            git_remote: self.git_remote.clone(),
            git_ref: self.git_ref.clone(),
            git_sha: self.git_sha.clone(),
            ..Default::default()
        }
    }
}

/// A deploy request as submitted by a user
///
/// The explicit fields win over anything in `overrides`.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestConfig {
    pub build_mode: Option<BuildMode>,
    pub git_ref: Option<String>,
    pub image_tag: Option<String>,
    pub replicas: Option<String>,
    pub env: EnvVars,
    pub overrides: Config,
}

impl ConfigSource for RequestConfig {
    fn config(&self) -> Config {
        Config {
            build_mode: self.build_mode,
            git_ref: self.git_ref.clone(),
            image_tag: self.image_tag.clone(),
            replicas: self.replicas.clone(),
            env: self.env.clone(),
            ..Default::default()
        }
        .inherit(&self.overrides)
    }
}

/// The stored config of a service: its current config over its defaults
#[derive(Clone, Debug)]
pub struct ServiceConfig<'a> {
    pub service: &'a Service,
}

impl ConfigSource for ServiceConfig<'_> {
    fn config(&self) -> Config {
        let svc = self.service;
        Config {
            service_name: Some(svc.name.clone()),
            project_name: Some(svc.project.clone()),
            service_type: Some(svc.service_type),
            ..Default::default()
        }
        .inherit(&svc.current)
        .inherit(&svc.defaults)
    }
}

/// Values derived from identity and the cluster rather than set by anyone
#[derive(Clone, Debug)]
pub struct InferredConfig {
    pub service_name: String,
    pub project_name: String,
    /// DNS suffix of the cluster ingress, e.g. `apps.example.com`
    pub cluster_domain: String,
    /// Image registry prefix without a trailing slash
    pub image_registry: String,
}

impl ConfigSource for InferredConfig {
    fn config(&self) -> Config {
        let mut labels = BTreeMap::new();
        labels.insert(super::labels::SERVICE.to_string(), self.service_name.clone());
        labels.insert(super::labels::PROJECT.to_string(), self.project_name.clone());
        let fqdn = if self.cluster_domain.is_empty() {
            None
        } else {
            Some(format!("{}.{}.{}", self.service_name, self.project_name, self.cluster_domain))
        };
        let image = if self.image_registry.is_empty() {
            None
        } else {
            Some(format!("{}/{}/{}", self.image_registry, self.project_name, self.service_name))
        };
        Config {
            service_name: Some(self.service_name.clone()),
            project_name: Some(self.project_name.clone()),
            container_name: Some(self.service_name.clone()),
            namespace: Some(self.project_name.clone()),
            fqdn,
            image,
            labels: Some(labels),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigSource, InferredConfig, RequestConfig, ServiceDefaultsConfig, TaskDefaultsConfig};
    use crate::structs::{EnvVar, EnvVars};
    use crate::{Config, Flag, ServiceType};

    #[test]
    fn web_defaults() {
        let c = ServiceDefaultsConfig::new(ServiceType::Web).config();
        assert_eq!(c.replicas(), "2");
        assert_eq!(c.autoscale(), Flag::Enabled);
        assert_eq!(c.ports.get("http").unwrap().target_port, 5000);
        assert!(c.validate().is_err()); // defaults alone have no name
        let named = Config {
            service_name: Some("web".into()),
            ..c
        };
        named.validate().unwrap();
    }

    #[test]
    fn task_defaults_validate() {
        let c = Config {
            service_name: Some("migrate".into()),
            ..TaskDefaultsConfig { scheduled: false }.config()
        };
        assert_eq!(c.service_type(), ServiceType::Task);
        c.validate().unwrap();
    }

    #[test]
    fn request_fields_beat_overrides() {
        let req = RequestConfig {
            git_ref: Some("feature".into()),
            env: EnvVars::new(vec![EnvVar::plain("A", "request")]),
            overrides: Config {
                git_ref: Some("main".into()),
                fqdn: Some("web.example.com".into()),
                env: EnvVars::new(vec![EnvVar::plain("A", "override"), EnvVar::plain("B", "override")]),
                ..Default::default()
            },
            ..Default::default()
        };
        let c = req.config();
        assert_eq!(c.git_ref(), "feature");
        assert_eq!(c.fqdn(), "web.example.com");
        assert_eq!(c.env.get("A").unwrap().value, "request");
        assert_eq!(c.env.get("B").unwrap().value, "override");
    }

    #[test]
    fn inferred_values() {
        let c = InferredConfig {
            service_name: "web".into(),
            project_name: "shop".into(),
            cluster_domain: "apps.example.com".into(),
            image_registry: "registry.example.com".into(),
        }
        .config();
        assert_eq!(c.fqdn(), "web.shop.apps.example.com");
        assert_eq!(c.image.as_deref(), Some("registry.example.com/shop/web"));
        assert_eq!(c.namespace(), "shop");
        assert_eq!(c.labels.unwrap()["blend-service"], "web");
    }
}
