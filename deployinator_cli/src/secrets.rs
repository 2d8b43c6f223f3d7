use async_trait::async_trait;
use chrono::Utc;
use futures::future::try_join_all;
use k8s_openapi::{api::core::v1::Secret, apimachinery::pkg::apis::meta::v1::ObjectMeta, ByteString};
use std::{cmp::Ordering, collections::BTreeMap, fmt, str::FromStr};
use uuid::Uuid;

use super::kubeapi::{KubeClient, MetadataPatch};
use super::{Error, ErrorKind, Result, ResultExt};
use deployinator_definitions::labels::{self, Selector};

/// Number of prior states kept per live secret
pub const RETAINED_VERSIONS: usize = 5;

/// Secret operations the versioning needs from a backend
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<Option<Secret>>;
    async fn list_secrets(&self, selector: &Selector) -> Result<Vec<Secret>>;
    async fn create_secret(&self, secret: &Secret) -> Result<Secret>;
    /// Must fail with a 409 if the `resourceVersion` is stale
    async fn replace_secret(&self, secret: &Secret) -> Result<Secret>;
    async fn delete_secret(&self, name: &str) -> Result<()>;
    async fn patch_secret_metadata(&self, name: &str, patch: &MetadataPatch) -> Result<Secret>;
}

#[async_trait]
impl SecretStore for KubeClient {
    async fn get_secret(&self, name: &str) -> Result<Option<Secret>> {
        self.get_opt(name).await
    }

    async fn list_secrets(&self, selector: &Selector) -> Result<Vec<Secret>> {
        self.list(selector).await
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret> {
        self.create(secret).await
    }

    async fn replace_secret(&self, secret: &Secret) -> Result<Secret> {
        self.replace(secret).await
    }

    async fn delete_secret(&self, name: &str) -> Result<()> {
        self.delete::<Secret>(name).await
    }

    async fn patch_secret_metadata(&self, name: &str, patch: &MetadataPatch) -> Result<Secret> {
        self.patch_metadata(name, patch).await
    }
}

/// The live secrets each service gets
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecretKind {
    Env,
    Files,
    Certs,
}

impl SecretKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SecretKind::Env => "env",
            SecretKind::Files => "files",
            SecretKind::Certs => "certs",
        }
    }

    pub fn secret_name(self, service: &str) -> String {
        format!("{}-{}", service, self.as_str())
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecretKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "env" => Ok(SecretKind::Env),
            "files" => Ok(SecretKind::Files),
            "certs" => Ok(SecretKind::Certs),
            _ => bail!("unknown secret kind '{}'", s),
        }
    }
}

/// Binary data overlaid with string data, which wins on shared keys
pub fn secret_contents(secret: &Secret) -> BTreeMap<String, Vec<u8>> {
    let mut contents: BTreeMap<String, Vec<u8>> = secret
        .data
        .iter()
        .flatten()
        .map(|(k, v)| (k.clone(), v.0.clone()))
        .collect();
    for (k, v) in secret.string_data.iter().flatten() {
        contents.insert(k.clone(), v.clone().into_bytes());
    }
    contents
}

fn to_data(contents: BTreeMap<String, Vec<u8>>) -> BTreeMap<String, ByteString> {
    contents.into_iter().map(|(k, v)| (k, ByteString(v))).collect()
}

fn label<'a>(secret: &'a Secret, key: &str) -> Option<&'a str> {
    secret.metadata.labels.as_ref()?.get(key).map(String::as_str)
}

fn name(secret: &Secret) -> &str {
    secret.metadata.name.as_deref().unwrap_or_default()
}

fn is_version(secret: &Secret) -> bool {
    label(secret, labels::SERVICE_SECRET).is_some()
}

/// Oldest first: creation time, then the recorded update time, then name
fn version_order(a: &Secret, b: &Secret) -> Ordering {
    let updated = |s: &Secret| label(s, labels::UPDATED_AT).and_then(|v| v.parse::<i64>().ok());
    a.metadata
        .creation_timestamp
        .cmp(&b.metadata.creation_timestamp)
        .then_with(|| updated(a).cmp(&updated(b)))
        .then_with(|| name(a).cmp(name(b)))
}

/// Nanoseconds since the epoch, so that versions created within one second still order
fn updated_at_now() -> String {
    let now = Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros())
        .to_string()
}

fn version_name(secret: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", secret, &suffix[..8])
}

/// Managed secrets of services, with a bounded history of prior states
pub struct ServiceSecrets<S> {
    store: S,
}

impl<S: SecretStore> ServiceSecrets<S> {
    pub fn new(store: S) -> Self {
        ServiceSecrets { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetch a live secret, creating it empty when absent
    pub async fn service_secret(&self, project: &str, service: &str, kind: SecretKind) -> Result<Secret> {
        let name = kind.secret_name(service);
        if let Some(s) = self.store.get_secret(&name).await? {
            return Ok(s);
        }
        info!("Creating secret {} for {}/{}", name, project, service);
        let mut secret_labels = BTreeMap::new();
        secret_labels.insert(labels::PROJECT.to_string(), project.to_string());
        secret_labels.insert(labels::SERVICE.to_string(), service.to_string());
        secret_labels.insert(labels::ROLE.to_string(), labels::ROLE_SERVICE_SECRET.to_string());
        secret_labels.insert(labels::SECRET_KIND.to_string(), kind.as_str().to_string());
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name),
                labels: Some(secret_labels),
                ..Default::default()
            },
            type_: Some("Opaque".into()),
            ..Default::default()
        };
        self.store.create_secret(&secret).await
    }

    pub async fn env_vars_for_service(&self, project: &str, service: &str) -> Result<Secret> {
        self.service_secret(project, service, SecretKind::Env).await
    }

    pub async fn files_for_service(&self, project: &str, service: &str) -> Result<Secret> {
        self.service_secret(project, service, SecretKind::Files).await
    }

    pub async fn certs_for_service(&self, project: &str, service: &str) -> Result<Secret> {
        self.service_secret(project, service, SecretKind::Certs).await
    }

    /// Set one key, recording the previous state as a version
    pub async fn set_service_secret_key(
        &self,
        project: &str,
        service: &str,
        kind: SecretKind,
        key: &str,
        value: &[u8],
    ) -> Result<bool> {
        let mut secret = self.service_secret(project, service, kind).await?;
        let mut contents = secret_contents(&secret);
        contents.insert(key.to_string(), value.to_vec());
        secret.data = Some(to_data(contents));
        secret.string_data = None;
        self.update_service_secret(secret).await
    }

    /// Remove one key, recording the previous state as a version
    pub async fn delete_service_secret_key(
        &self,
        project: &str,
        service: &str,
        kind: SecretKind,
        key: &str,
    ) -> Result<bool> {
        let mut secret = match self.store.get_secret(&kind.secret_name(service)).await? {
            Some(s) => s,
            None => {
                debug!("{}/{} has no {} secret", project, service, kind);
                return Ok(false);
            }
        };
        let mut contents = secret_contents(&secret);
        if contents.remove(key).is_none() {
            debug!("{} has no key {}", name(&secret), key);
            return Ok(false);
        }
        secret.data = Some(to_data(contents));
        secret.string_data = None;
        self.update_service_secret(secret).await
    }

    /// Write new contents to a live secret
    ///
    /// The previous contents are kept as a version and versions beyond the newest
    /// `RETAINED_VERSIONS` are pruned. Returns false when the contents are unchanged,
    /// in which case nothing is written. A failure part way leaves earlier steps in place.
    pub async fn update_service_secret(&self, secret: Secret) -> Result<bool> {
        let name = match &secret.metadata.name {
            Some(n) => n.clone(),
            None => bail!(ErrorKind::MissingName("Secret".into())),
        };
        let contents = secret_contents(&secret);
        let live = self.store.get_secret(&name).await?;

        if let Some(live) = &live {
            let previous = secret_contents(live);
            if previous == contents {
                debug!("Secret {} unchanged", name);
                return Ok(false);
            }
            let mut version_labels = live.metadata.labels.clone().unwrap_or_default();
            version_labels.insert(labels::SERVICE_SECRET.to_string(), name.clone());
            version_labels.insert(labels::UPDATED_AT.to_string(), updated_at_now());
            let version = Secret {
                metadata: ObjectMeta {
                    name: Some(version_name(&name)),
                    labels: Some(version_labels),
                    ..Default::default()
                },
                data: Some(to_data(previous)),
                type_: live.type_.clone(),
                ..Default::default()
            };
            let created = self.store.create_secret(&version).await?;
            debug!("Saved previous state of {} as {}", name, self::name(&created));
        }

        let mut desired = secret;
        desired.data = Some(to_data(contents));
        desired.string_data = None;
        match live {
            Some(live) => {
                desired.metadata.resource_version = live.metadata.resource_version;
                self.store.replace_secret(&desired).await?;
            }
            None => {
                desired.metadata.resource_version = None;
                self.store.create_secret(&desired).await?;
            }
        }
        info!("Updated secret {}", name);

        self.prune_versions(&name).await?;
        Ok(true)
    }

    async fn prune_versions(&self, name: &str) -> Result<()> {
        let mut versions = self.store.list_secrets(&Selector::secret_versions(name)).await?;
        if versions.len() <= RETAINED_VERSIONS {
            return Ok(());
        }
        versions.sort_by(version_order);
        let excess = versions.len() - RETAINED_VERSIONS;
        for v in &versions[..excess] {
            debug!("Pruning version {} of {}", self::name(v), name);
            self.store.delete_secret(self::name(v)).await?;
        }
        Ok(())
    }

    /// Prior states of a live secret, newest first
    pub async fn service_secret_versions(&self, name: &str) -> Result<Vec<Secret>> {
        let mut versions = self.store.list_secrets(&Selector::secret_versions(name)).await?;
        versions.sort_by(|a, b| version_order(b, a));
        Ok(versions)
    }

    /// Restore a live secret to the contents of one of its versions
    ///
    /// The version is consumed; the state it replaces becomes a new version.
    pub async fn revert_service_secret(&self, name: &str, version: &str) -> Result<()> {
        let snapshot = match self.store.get_secret(version).await? {
            Some(s) => s,
            None => bail!(ErrorKind::KubeApi(404, format!("secret version {} not found", version))),
        };
        if label(&snapshot, labels::SERVICE_SECRET) != Some(name) {
            bail!(ErrorKind::NotAVersion(version.into(), name.into()));
        }
        // detach it so the update below cannot prune it
        let patch = MetadataPatch::new().remove_label(labels::SERVICE_SECRET);
        self.store.patch_secret_metadata(version, &patch).await?;

        let target = match self.store.get_secret(name).await? {
            Some(mut live) => {
                live.data = snapshot.data.clone();
                live.string_data = None;
                live
            }
            None => {
                let mut restored_labels = snapshot.metadata.labels.clone().unwrap_or_default();
                restored_labels.remove(labels::SERVICE_SECRET);
                restored_labels.remove(labels::UPDATED_AT);
                Secret {
                    metadata: ObjectMeta {
                        name: Some(name.into()),
                        labels: Some(restored_labels),
                        ..Default::default()
                    },
                    data: snapshot.data.clone(),
                    type_: snapshot.type_.clone(),
                    ..Default::default()
                }
            }
        };
        self.update_service_secret(target)
            .await
            .chain_err(|| format!("revert of {} failed, version {} is detached but kept", name, version))?;
        self.store.delete_secret(version).await?;
        info!("Reverted {} to {}", name, version);
        Ok(())
    }

    async fn delete_with_versions(&self, live: &[Secret]) -> Result<()> {
        for secret in live.iter().filter(|s| !is_version(s)) {
            let secret_name = name(secret);
            let versions = self.store.list_secrets(&Selector::secret_versions(secret_name)).await?;
            try_join_all(versions.iter().map(|v| self.store.delete_secret(name(v)))).await?;
            self.store.delete_secret(secret_name).await?;
            debug!("Deleted {} and {} versions", secret_name, versions.len());
        }
        Ok(())
    }

    /// Delete the live secrets of a service and all their versions
    pub async fn delete_service_secrets(&self, service: &str) -> Result<()> {
        let live = self.store.list_secrets(&Selector::service_secrets(service)).await?;
        info!("Deleting secrets of {}", service);
        self.delete_with_versions(&live).await
    }

    /// Delete the live secrets of every service in a project and all their versions
    pub async fn delete_project_secrets(&self, project: &str) -> Result<()> {
        let live = self.store.list_secrets(&Selector::project_secrets(project)).await?;
        info!("Deleting secrets of project {}", project);
        self.delete_with_versions(&live).await
    }
}
