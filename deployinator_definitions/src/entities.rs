use std::mem;

use super::{
    compose_configs, BuilderConfig, Config, ConfigSource, InferredConfig, RequestConfig, ServiceConfig,
    ServiceDefaultsConfig, ServiceType, TaskDefaultsConfig,
};

/// A deployable service and its config history
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub name: String,
    pub project: String,
    pub service_type: ServiceType,
    /// Config the owners set once and rarely touch
    #[serde(default)]
    pub defaults: Config,
    /// Config of the running deploy
    #[serde(default)]
    pub current: Config,
    /// Config of the deploy before `current`
    #[serde(default)]
    pub last: Config,
}

impl Service {
    pub fn new(name: &str, project: &str, service_type: ServiceType) -> Self {
        Service {
            name: name.into(),
            project: project.into(),
            service_type,
            defaults: Config::default(),
            current: Config::default(),
            last: Config::default(),
        }
    }

    /// Platform defaults for this kind of workload
    fn type_defaults(&self) -> Box<dyn ConfigSource> {
        match self.service_type {
            ServiceType::Web | ServiceType::Worker => Box::new(ServiceDefaultsConfig::new(self.service_type)),
            ServiceType::Task => Box::new(TaskDefaultsConfig { scheduled: false }),
            ServiceType::Cron => Box::new(TaskDefaultsConfig { scheduled: true }),
        }
    }

    /// The config a build of this service runs with
    ///
    /// Layers, highest priority first: the request, the builder environment,
    /// the service's own config, the project, the platform defaults and finally inferred values.
    pub fn effective_config(
        &self,
        project: &Project,
        request: &RequestConfig,
        builder: &BuilderConfig,
        inferred: &InferredConfig,
    ) -> Config {
        let service = ServiceConfig { service: self };
        let type_defaults = self.type_defaults();
        compose_configs(&[request, builder, &service, project, type_defaults.as_ref(), inferred])
    }

    /// Remember a successful deploy, shifting the running config into `last`
    pub fn record_deploy(&mut self, deployed: Config) {
        self.last = mem::replace(&mut self.current, deployed);
        debug!("Recorded deploy of {} in {}", self.name, self.project);
    }

    /// The config to redeploy on rollback, if there was a previous deploy
    pub fn rollback_config(&self) -> Option<Config> {
        if self.last == Config::default() {
            return None;
        }
        Some(self.last.clone().inherit(&self.defaults))
    }
}

/// A group of services sharing a namespace and defaults
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    pub team: String,
    #[serde(default)]
    pub defaults: Config,
    #[serde(default)]
    pub current: Config,
    #[serde(default)]
    pub last: Config,
}

impl Project {
    pub fn new(name: &str, team: &str) -> Self {
        Project {
            name: name.into(),
            team: team.into(),
            defaults: Config::default(),
            current: Config::default(),
            last: Config::default(),
        }
    }

    pub fn record_change(&mut self, config: Config) {
        self.last = mem::replace(&mut self.current, config);
    }
}

impl ConfigSource for Project {
    fn config(&self) -> Config {
        Config {
            project_name: Some(self.name.clone()),
            team: Some(self.team.clone()),
            ..Default::default()
        }
        .inherit(&self.current)
        .inherit(&self.defaults)
    }
}

/// A managed database belonging to a project
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    pub name: String,
    pub project: String,
    pub engine: String,
    #[serde(default)]
    pub defaults: Config,
    #[serde(default)]
    pub current: Config,
    #[serde(default)]
    pub last: Config,
}

impl Database {
    pub fn new(name: &str, project: &str, engine: &str) -> Self {
        Database {
            name: name.into(),
            project: project.into(),
            engine: engine.into(),
            defaults: Config::default(),
            current: Config::default(),
            last: Config::default(),
        }
    }

    /// The config a database is provisioned with
    pub fn effective_config(&self, project: &Project) -> Config {
        let identity = Config {
            database_name: Some(self.name.clone()),
            project_name: Some(self.project.clone()),
            db_engine: Some(self.engine.clone()),
            ..Default::default()
        };
        compose_configs(&[&identity, &self.current, &self.defaults, project])
    }

    pub fn record_change(&mut self, config: Config) {
        self.last = mem::replace(&mut self.current, config);
    }
}
