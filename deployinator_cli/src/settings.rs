use std::{env, net::SocketAddr, path::PathBuf};

use super::{ErrorKind, Result};
use deployinator_definitions::{BuildMode, BuilderConfig, InferredConfig};

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Everything deployinator reads from its environment
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// `KUBECTL_CONFIG`, otherwise in-cluster or default kubeconfig
    pub kubeconfig: Option<PathBuf>,
    pub namespace: Option<String>,
    pub cluster_name: Option<String>,
    /// `CLUSTER_DOMAIN`, ingress suffix for inferred hostnames
    pub cluster_domain: Option<String>,
    pub service_name: Option<String>,
    pub project_name: Option<String>,
    pub build_mode: Option<BuildMode>,
    pub git_ref: Option<String>,
    pub git_remote: Option<String>,
    pub image_registry: Option<String>,
    /// `VAULT_HOST`, otherwise `VAULT_ADDR`
    pub vault_addr: Option<String>,
    pub vault_token: Option<String>,
    pub listen_addr: SocketAddr,
}

fn require<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    match value {
        Some(v) => Ok(v),
        None => bail!(ErrorKind::MissingEnv(name.into())),
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Settings::from_lookup(|k| env::var(k).ok())
    }

    /// Build from any variable lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        let build_mode = match get("BUILD_MODE") {
            Some(m) => Some(m.parse::<BuildMode>()?),
            None => None,
        };
        let listen_addr = get("LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse()?;
        Ok(Settings {
            kubeconfig: get("KUBECTL_CONFIG").map(PathBuf::from),
            namespace: get("NAMESPACE"),
            cluster_name: get("CLUSTER_NAME"),
            cluster_domain: get("CLUSTER_DOMAIN"),
            service_name: get("SERVICE_NAME"),
            project_name: get("PROJECT_NAME"),
            build_mode,
            git_ref: get("GIT_REF"),
            git_remote: get("GIT_REMOTE"),
            image_registry: get("IMAGE_REGISTRY"),
            vault_addr: get("VAULT_HOST").or_else(|| get("VAULT_ADDR")),
            vault_token: get("VAULT_TOKEN"),
            listen_addr,
        })
    }

    pub fn namespace(&self) -> Result<&str> {
        require(&self.namespace, "NAMESPACE")
    }

    pub fn project_name(&self) -> Result<&str> {
        require(&self.project_name, "PROJECT_NAME")
    }

    pub fn service_name(&self) -> Result<&str> {
        require(&self.service_name, "SERVICE_NAME")
    }

    pub fn vault_addr(&self) -> Result<&str> {
        require(&self.vault_addr, "VAULT_HOST")
    }

    /// What a build environment knows about itself
    pub fn builder_config(&self) -> BuilderConfig {
        BuilderConfig {
            build_mode: self.build_mode,
            service_name: self.service_name.clone(),
            project_name: self.project_name.clone(),
            cluster_name: self.cluster_name.clone(),
            git_remote: self.git_remote.clone(),
            git_ref: self.git_ref.clone(),
            git_sha: None,
        }
    }

    /// Inferred values for the service being built
    pub fn inferred_config(&self) -> Result<InferredConfig> {
        Ok(InferredConfig {
            service_name: self.service_name()?.to_string(),
            project_name: self.project_name()?.to_string(),
            cluster_domain: self.cluster_domain.clone().unwrap_or_default(),
            image_registry: self.image_registry.clone().unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Settings;
    use crate::ErrorKind;
    use deployinator_definitions::BuildMode;
    use maplit::btreemap;
    use std::collections::BTreeMap;

    fn from(vars: BTreeMap<&str, &str>) -> crate::Result<Settings> {
        Settings::from_lookup(|k| vars.get(k).map(|v| v.to_string()))
    }

    #[test]
    fn reads_typed_values() {
        let s = from(btreemap! {
            "NAMESPACE" => "shop",
            "PROJECT_NAME" => "shop",
            "SERVICE_NAME" => "web",
            "BUILD_MODE" => "deploy",
            "KUBECTL_CONFIG" => "/etc/kube/config",
            "LISTEN_ADDR" => "127.0.0.1:9000",
            "GIT_REF" => "",
        })
        .unwrap();
        assert_eq!(s.namespace().unwrap(), "shop");
        assert_eq!(s.build_mode, Some(BuildMode::Deploy));
        assert_eq!(s.listen_addr.port(), 9000);
        assert_eq!(s.kubeconfig.unwrap().to_str(), Some("/etc/kube/config"));
        assert!(s.git_ref.is_none());
    }

    #[test]
    fn vault_host_preferred_over_addr() {
        let s = from(btreemap! {
            "VAULT_ADDR" => "http://vault-addr:8200",
            "VAULT_HOST" => "http://vault-host:8200",
            "VAULT_TOKEN" => "s.root",
        })
        .unwrap();
        assert_eq!(s.vault_addr().unwrap(), "http://vault-host:8200");
        assert_eq!(s.vault_token.as_deref(), Some("s.root"));

        let s = from(btreemap! { "VAULT_ADDR" => "http://vault-addr:8200" }).unwrap();
        assert_eq!(s.vault_addr().unwrap(), "http://vault-addr:8200");
        let err = from(BTreeMap::new()).unwrap().vault_addr().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MissingEnv(n) if n == "VAULT_HOST"));
    }

    #[test]
    fn missing_required_values() {
        let s = from(BTreeMap::new()).unwrap();
        assert_eq!(s.listen_addr.port(), 8080);
        let err = s.namespace().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MissingEnv(n) if n == "NAMESPACE"));
        assert!(s.inferred_config().is_err());
        assert!(from(btreemap! { "BUILD_MODE" => "yolo" }).is_err());
        assert!(from(btreemap! { "LISTEN_ADDR" => "nowhere" }).is_err());
    }

    #[test]
    fn derived_configs() {
        let s = from(btreemap! {
            "PROJECT_NAME" => "shop",
            "SERVICE_NAME" => "web",
            "CLUSTER_DOMAIN" => "apps.example.com",
            "GIT_REMOTE" => "git@example.com:shop/web.git",
        })
        .unwrap();
        let b = s.builder_config();
        assert_eq!(b.git_remote.as_deref(), Some("git@example.com:shop/web.git"));
        let i = s.inferred_config().unwrap();
        assert_eq!(i.cluster_domain, "apps.example.com");
        assert_eq!(i.image_registry, "");
    }
}
