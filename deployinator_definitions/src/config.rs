use inherit::{Blank, Inherit};
use regex::Regex;
use std::{collections::BTreeMap, iter, net::IpAddr};

use super::structs::{EnvVars, Probe, ResourceRequirements, ServicePorts, StorageConfig, Toleration};
use super::{Accessibility, BuildMode, ErrorKind, Flag, Result, ResultExt, ServiceType};

/// Default grace period kube gives a pod before killing it
pub const DEFAULT_TERMINATION_GRACE_PERIOD: i64 = 30;

/// Flat deploy configuration
///
/// Every layer (service defaults, builder environment, deploy requests, ...) produces one of these
/// with only the fields it knows about set. Layers are combined with `inherit_from`,
/// where the receiver's set fields always win.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Inherit)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    // -- identity --
    pub service_name: Option<String>,
    pub project_name: Option<String>,
    pub database_name: Option<String>,
    pub cluster_name: Option<String>,
    pub namespace: Option<String>,
    pub team: Option<String>,
    pub service_type: Option<ServiceType>,
    pub build_mode: Option<BuildMode>,

    // -- git source --
    pub git_remote: Option<String>,
    pub git_ref: Option<String>,
    pub git_sha: Option<String>,
    pub dockerfile: Option<String>,
    pub build_context: Option<String>,

    // -- container --
    pub image: Option<String>,
    pub image_tag: Option<String>,
    pub container_name: Option<String>,
    pub args: Option<Vec<String>>,
    pub command: Option<Vec<String>>,
    pub working_dir: Option<String>,
    pub env: EnvVars,
    pub ports: ServicePorts,
    pub readiness_probe: Option<Probe>,
    pub liveness_probe: Option<Probe>,
    pub resources: Option<ResourceRequirements>,
    pub termination_grace_period_seconds: Option<i64>,
    pub run_as_user: Option<i64>,
    pub read_only_root_filesystem: Option<bool>,

    // -- scaling --
    /// Replica count as written by users; parsed on use
    pub replicas: Option<String>,
    pub min_replicas: Option<i32>,
    pub max_replicas: Option<i32>,
    /// Target cpu utilisation percentage
    pub cpu_threshold: Option<i32>,
    /// Target memory utilisation percentage
    pub memory_threshold: Option<i32>,
    pub scaling_metric: Option<String>,
    pub autoscale: Option<Flag>,

    // -- networking --
    pub accessibility: Option<Accessibility>,
    pub fqdn: Option<String>,
    pub subject_alternative_names: Option<Vec<String>>,
    pub load_balancer_source_ranges: Option<Vec<String>>,
    pub path_prefix: Option<String>,

    // -- storage --
    pub storage: Option<StorageConfig>,
    pub db_engine: Option<String>,
    pub db_version: Option<String>,
    /// Database volume size in GiB
    pub db_storage: Option<u32>,
    pub db_instance_class: Option<String>,

    // -- scheduling --
    /// Merged key-wise across layers
    pub node_selector: BTreeMap<String, String>,
    pub tolerations: Option<Vec<Toleration>>,
    pub labels: Option<BTreeMap<String, String>>,
    pub annotations: Option<BTreeMap<String, String>>,

    // -- tasks --
    pub schedule: Option<String>,
    pub restart_policy: Option<String>,
    pub backoff_limit: Option<i32>,
    pub active_deadline_seconds: Option<i64>,

    // -- notifications --
    pub slack_channel: Option<String>,
    pub notification_email: Option<String>,
    pub notify_on: Option<Vec<String>>,
}

fn text(v: &Option<String>) -> &str {
    v.as_deref().unwrap_or_default()
}

impl Config {
    /// Resolve one field against an ordered chain of fallback configs
    ///
    /// The receiver is consulted first, then each fallback in order.
    pub fn resolve<'a, T, F>(&'a self, fallbacks: &[&'a Config], pick: F) -> Option<T>
    where
        T: Blank + Clone + 'a,
        F: Fn(&'a Config) -> &'a Option<T>,
    {
        inherit::resolve(iter::once(self).chain(fallbacks.iter().copied()), pick)
    }

    pub fn service_name(&self) -> &str {
        text(&self.service_name)
    }

    pub fn project_name(&self) -> &str {
        text(&self.project_name)
    }

    pub fn database_name(&self) -> &str {
        text(&self.database_name)
    }

    pub fn cluster_name(&self) -> &str {
        text(&self.cluster_name)
    }

    pub fn namespace(&self) -> &str {
        text(&self.namespace)
    }

    pub fn container_name(&self) -> &str {
        text(&self.container_name)
    }

    pub fn git_ref(&self) -> &str {
        text(&self.git_ref)
    }

    pub fn replicas(&self) -> &str {
        text(&self.replicas)
    }

    pub fn fqdn(&self) -> &str {
        text(&self.fqdn)
    }

    pub fn service_type(&self) -> ServiceType {
        self.service_type.unwrap_or(ServiceType::Web)
    }

    pub fn build_mode(&self) -> BuildMode {
        self.build_mode.unwrap_or(BuildMode::Full)
    }

    pub fn accessibility(&self) -> Accessibility {
        self.accessibility.unwrap_or(Accessibility::Cluster)
    }

    pub fn autoscale(&self) -> Flag {
        self.autoscale.unwrap_or(Flag::Disabled)
    }

    pub fn db_storage(&self) -> u32 {
        self.db_storage.unwrap_or_default()
    }

    pub fn min_replicas(&self) -> i32 {
        self.min_replicas.unwrap_or_default()
    }

    pub fn max_replicas(&self) -> i32 {
        self.max_replicas.unwrap_or_default()
    }

    pub fn termination_grace_period_seconds(&self) -> i64 {
        self.termination_grace_period_seconds
            .filter(|s| *s != 0)
            .unwrap_or(DEFAULT_TERMINATION_GRACE_PERIOD)
    }

    pub fn read_only_root_filesystem(&self) -> bool {
        self.read_only_root_filesystem.unwrap_or_default()
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.labels.clone().unwrap_or_default()
    }

    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.annotations.clone().unwrap_or_default()
    }

    pub fn subject_alternative_names(&self) -> &[String] {
        self.subject_alternative_names.as_deref().unwrap_or_default()
    }

    /// Env vars of this config, with gaps filled from `defaults` by name
    pub fn env_with(&self, defaults: &EnvVars) -> EnvVars {
        self.env.clone().inherit_from(defaults.clone())
    }

    /// Node selector of this config, with gaps filled from `defaults` by key
    pub fn node_selector_with(&self, defaults: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        self.node_selector.clone().inherit_from(defaults.clone())
    }

    /// Ports of this config, with gaps filled from `defaults` by port name
    pub fn ports_with(&self, defaults: &ServicePorts) -> ServicePorts {
        self.ports.clone().inherit_from(defaults.clone())
    }

    /// Image reference including the tag, falling back to the git sha
    pub fn image_ref(&self) -> Option<String> {
        let image = self.image.as_ref().filter(|i| !i.is_empty())?;
        let tag = self
            .image_tag
            .as_ref()
            .or(self.git_sha.as_ref())
            .filter(|t| !t.is_empty())
            .map(String::as_str)
            .unwrap_or("latest");
        Some(format!("{}:{}", image, tag))
    }

    /// Parsed replica count, if one is set
    pub fn replica_count(&self) -> Result<Option<u32>> {
        match self.replicas() {
            "" => Ok(None),
            r => {
                let n = r
                    .trim()
                    .parse::<u32>()
                    .chain_err(|| format!("replicas '{}' is not a number", r))?;
                Ok(Some(n))
            }
        }
    }

    /// Inherit every unset field from another config
    pub fn inherit(self, other: &Config) -> Config {
        self.inherit_from(other.clone())
    }

    /// Validate a fully composed config before it is used against the cluster
    pub fn validate(&self) -> Result<()> {
        self.verify().chain_err(|| ErrorKind::InvalidConfig(self.service_name().to_string()))
    }

    fn verify(&self) -> Result<()> {
        let label = Regex::new(r"^[a-z]([-a-z0-9]*[a-z0-9])?$")?;
        let hostname = Regex::new(r"^(\*\.)?([a-z0-9]([-a-z0-9]*[a-z0-9])?\.)+[a-z]{2,}$")?;

        // identity
        let name = self.service_name();
        if name.is_empty() {
            bail!("serviceName is required");
        }
        if name.len() > 63 || !label.is_match(name) {
            bail!("serviceName '{}' must be a lowercase dns label", name);
        }
        for (key, value) in &[
            ("projectName", self.project_name()),
            ("namespace", self.namespace()),
            ("containerName", self.container_name()),
        ] {
            if !value.is_empty() && (value.len() > 63 || !label.is_match(value)) {
                bail!("{} '{}' must be a lowercase dns label", key, value);
            }
        }

        // container
        self.env.verify()?;
        self.ports.verify()?;
        if let Some(p) = &self.readiness_probe {
            p.verify().chain_err(|| "invalid readinessProbe")?;
        }
        if let Some(p) = &self.liveness_probe {
            p.verify().chain_err(|| "invalid livenessProbe")?;
        }
        if let Some(r) = &self.resources {
            r.verify()?;
        }
        if let Some(g) = self.termination_grace_period_seconds {
            if g < 0 {
                bail!("terminationGracePeriodSeconds cannot be negative");
            }
        }

        // scaling
        let replicas = self.replica_count()?;
        if let Some(r) = replicas {
            if r > 100 {
                bail!("{} replicas is more than the 100 allowed", r);
            }
        }
        if self.autoscale().is_enabled() {
            let (min, max) = (self.min_replicas(), self.max_replicas());
            if min < 1 {
                bail!("autoscaling needs minReplicas of at least 1");
            }
            if max < min {
                bail!("maxReplicas ({}) cannot be below minReplicas ({})", max, min);
            }
            if max > 100 {
                bail!("maxReplicas of {} is more than the 100 allowed", max);
            }
        }
        for (key, threshold) in &[("cpuThreshold", self.cpu_threshold), ("memoryThreshold", self.memory_threshold)] {
            if let Some(t) = threshold {
                if *t < 1 || *t > 100 {
                    bail!("{} must be a percentage between 1 and 100, got {}", key, t);
                }
            }
        }

        // networking
        let fqdn = self.fqdn();
        if !fqdn.is_empty() && !hostname.is_match(fqdn) {
            bail!("fqdn '{}' is not a valid hostname", fqdn);
        }
        for san in self.subject_alternative_names() {
            if !hostname.is_match(san) {
                bail!("subject alternative name '{}' is not a valid hostname", san);
            }
        }
        for range in self.load_balancer_source_ranges.as_deref().unwrap_or_default() {
            verify_cidr(range)?;
        }
        if self.accessibility().needs_ingress() {
            if self.service_type() != ServiceType::Web {
                bail!("only web services can be exposed outside the cluster");
            }
            if self.ports.is_empty() {
                bail!("services exposed outside the cluster need at least one port");
            }
        }
        if let Some(prefix) = &self.path_prefix {
            if !prefix.starts_with('/') {
                bail!("pathPrefix '{}' must start with a slash", prefix);
            }
        }

        // storage
        if let Some(s) = &self.storage {
            s.validate()?;
        }
        if self.db_engine.as_ref().map_or(false, |e| !e.is_empty()) && self.db_storage() == 0 {
            bail!("databases need dbStorage to be set");
        }

        // workload type specifics
        let restart = self.restart_policy.as_deref().unwrap_or_default();
        match self.service_type() {
            ServiceType::Web | ServiceType::Worker => {
                if !restart.is_empty() && restart != "Always" {
                    bail!("long running services must use restartPolicy Always, not {}", restart);
                }
                if self.schedule.as_ref().map_or(false, |s| !s.is_empty()) {
                    bail!("schedule can only be set on cron services");
                }
            }
            ServiceType::Task | ServiceType::Cron => {
                if restart == "Always" {
                    bail!("tasks cannot use restartPolicy Always");
                }
                if self.autoscale().is_enabled() {
                    bail!("tasks cannot autoscale");
                }
            }
        }
        if self.service_type() == ServiceType::Cron {
            let schedule = self.schedule.as_deref().unwrap_or_default();
            if schedule.split_whitespace().count() != 5 {
                bail!("cron schedule '{}' must have five fields", schedule);
            }
        }
        if let Some(b) = self.backoff_limit {
            if b < 0 {
                bail!("backoffLimit cannot be negative");
            }
        }
        Ok(())
    }
}

fn verify_cidr(range: &str) -> Result<()> {
    let mut parts = range.splitn(2, '/');
    let addr = parts.next().unwrap_or_default();
    let ip: IpAddr = addr
        .parse()
        .chain_err(|| format!("load balancer source range '{}' has an invalid address", range))?;
    let max = if ip.is_ipv4() { 32 } else { 128 };
    match parts.next() {
        Some(prefix) => {
            let p: u8 = prefix.parse()?;
            if p > max {
                bail!("load balancer source range '{}' has prefix longer than {}", range, max);
            }
        }
        None => bail!("load balancer source range '{}' needs a prefix length", range),
    }
    Ok(())
}
