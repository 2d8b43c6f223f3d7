use inherit::Blank;
use std::{fmt, str::FromStr};

use super::{Error, Result};

/// What a builder run is asked to do
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BuildMode {
    /// Build and push an image, then deploy it
    Full,
    /// Build and push an image only
    Build,
    /// Deploy an already built image
    Deploy,
    /// Redeploy the previous config
    Rollback,
}

impl BuildMode {
    pub fn builds(self) -> bool {
        match self {
            BuildMode::Full | BuildMode::Build => true,
            BuildMode::Deploy | BuildMode::Rollback => false,
        }
    }

    pub fn deploys(self) -> bool {
        match self {
            BuildMode::Full | BuildMode::Deploy | BuildMode::Rollback => true,
            BuildMode::Build => false,
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            BuildMode::Full => "full",
            BuildMode::Build => "build",
            BuildMode::Deploy => "deploy",
            BuildMode::Rollback => "rollback",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for BuildMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(BuildMode::Full),
            "build" => Ok(BuildMode::Build),
            "deploy" => Ok(BuildMode::Deploy),
            "rollback" => Ok(BuildMode::Rollback),
            _ => bail!("unknown build mode '{}'", s),
        }
    }
}

impl Blank for BuildMode {}

/// The kind of workload a service runs as
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    /// Long running http service behind a kube Service
    Web,
    /// Long running process without ingress
    Worker,
    /// Run-to-completion job
    Task,
    /// Scheduled job
    Cron,
}

impl ServiceType {
    pub fn is_long_running(self) -> bool {
        match self {
            ServiceType::Web | ServiceType::Worker => true,
            ServiceType::Task | ServiceType::Cron => false,
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ServiceType::Web => "web",
            ServiceType::Worker => "worker",
            ServiceType::Task => "task",
            ServiceType::Cron => "cron",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ServiceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "web" => Ok(ServiceType::Web),
            "worker" => Ok(ServiceType::Worker),
            "task" => Ok(ServiceType::Task),
            "cron" => Ok(ServiceType::Cron),
            _ => bail!("unknown service type '{}'", s),
        }
    }
}

impl Blank for ServiceType {}

/// Who can reach a service
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Accessibility {
    /// Reachable from the internet through the public load balancer
    Public,
    /// Reachable from the internal network through the private load balancer
    Internal,
    /// Reachable only from inside the cluster
    Cluster,
}

impl Accessibility {
    /// Whether the service needs an ingress and a certificate
    pub fn needs_ingress(self) -> bool {
        match self {
            Accessibility::Public | Accessibility::Internal => true,
            Accessibility::Cluster => false,
        }
    }
}

impl Blank for Accessibility {}

/// An on/off switch where absence means "inherit"
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Flag {
    Enabled,
    Disabled,
}

impl Flag {
    pub fn is_enabled(self) -> bool {
        self == Flag::Enabled
    }
}

impl From<bool> for Flag {
    fn from(b: bool) -> Self {
        if b {
            Flag::Enabled
        } else {
            Flag::Disabled
        }
    }
}

impl Blank for Flag {}
