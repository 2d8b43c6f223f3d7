use inherit::{Blank, Inherit};
use std::collections::BTreeSet;

use super::Result;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortProtocol {
    #[default]
    Tcp,
    Udp,
    Sctp,
}

/// Port to open on a container and expose on the kube Service
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ServicePort {
    /// Name of the port
    pub name: String,
    /// Port the container listens on
    pub target_port: u16,
    /// Port to expose on the kube Service
    pub port: u16,
    /// Port protocol
    pub protocol: PortProtocol,
}

impl ServicePort {
    pub fn tcp(name: &str, port: u16, target_port: u16) -> Self {
        ServicePort {
            name: name.into(),
            port,
            target_port,
            protocol: PortProtocol::Tcp,
        }
    }
}

/// Ports of a service, keyed by name for inheritance
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct ServicePorts(pub Vec<ServicePort>);

impl ServicePorts {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ServicePort> {
        self.0.iter().find(|p| p.name == name)
    }

    pub fn verify(&self) -> Result<()> {
        let mut names = BTreeSet::new();
        let mut exposed = BTreeSet::new();
        for p in &self.0 {
            if p.name.is_empty() {
                bail!("ports must be named");
            }
            if p.port == 0 || p.target_port == 0 {
                bail!("port '{}' must have a nonzero port and targetPort", p.name);
            }
            if !names.insert(p.name.as_str()) {
                bail!("port name '{}' is used more than once", p.name);
            }
            if !exposed.insert((p.port, p.protocol as u8)) {
                bail!("port {} is exposed more than once", p.port);
            }
        }
        Ok(())
    }
}

impl Blank for ServicePorts {
    fn is_blank(&self) -> bool {
        self.0.is_empty()
    }
}

/// Key-wise merge on port name; the receiver's ports win
impl Inherit for ServicePorts {
    fn inherit_from(self, other: Self) -> Self {
        let ServicePorts(mut merged) = self;
        for o in other.0 {
            if !merged.iter().any(|p| p.name == o.name) {
                merged.push(o);
            }
        }
        ServicePorts(merged)
    }
}
