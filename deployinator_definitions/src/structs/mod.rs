/// Environment variables with name-wise inheritance
pub mod env;
pub use self::env::{EnvVar, EnvVars, SecretKeyRef};

/// Ports exposed by a service
pub mod port;
pub use self::port::{PortProtocol, ServicePort, ServicePorts};

/// Liveness and readiness probes
pub mod probes;
pub use self::probes::{HttpGet, Probe, TcpSocket};

/// Kubernetes resource requirements
pub mod resources;
pub use self::resources::{ResourceList, ResourceRequirements};

/// Persistent volume requests
pub mod storage;
pub use self::storage::{AccessMode, StorageConfig};

/// Node taints a workload tolerates
pub mod tolerations;
pub use self::tolerations::Toleration;

use super::Result;
