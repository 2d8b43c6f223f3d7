//! Label keys and values stamped on everything deployinator creates

/// What a resource is to deployinator
pub const ROLE: &str = "blend-role";
pub const SERVICE: &str = "blend-service";
pub const PROJECT: &str = "blend-project";
pub const DATABASE: &str = "blend-database";
pub const DEPLOY: &str = "blend-deploy";
/// Set on secret versions, naming the live secret they snapshot
pub const SERVICE_SECRET: &str = "blend-service-secret";
/// Unix seconds at which a secret version was taken
pub const UPDATED_AT: &str = "blend-updated-at";
pub const SECRET_KIND: &str = "blend-secret-kind";

pub const ROLE_SERVICE_SECRET: &str = "service-secret";
pub const ROLE_SERVICE_INSTANCE: &str = "service-instance";

/// A `key=value,...` label selector
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selector(Vec<(String, String)>);

impl Selector {
    pub fn new() -> Self {
        Selector::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.push((key.into(), value.into()));
        self
    }

    /// Secret versions of a live secret
    pub fn secret_versions(secret: &str) -> Self {
        Selector::new().with(SERVICE_SECRET, secret)
    }

    /// Running pods of a service
    pub fn service_pods(service: &str) -> Self {
        Selector::new().with(SERVICE, service).with(ROLE, ROLE_SERVICE_INSTANCE)
    }

    /// Live secrets of a service
    pub fn service_secrets(service: &str) -> Self {
        Selector::new().with(SERVICE, service).with(ROLE, ROLE_SERVICE_SECRET)
    }

    /// Live secrets of every service in a project
    pub fn project_secrets(project: &str) -> Self {
        Selector::new().with(PROJECT, project).with(ROLE, ROLE_SERVICE_SECRET)
    }

    /// Whether a label map satisfies every term
    pub fn matches(&self, labels: &std::collections::BTreeMap<String, String>) -> bool {
        self.0.iter().all(|(k, v)| labels.get(k) == Some(v))
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let terms: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        f.write_str(&terms.join(","))
    }
}
