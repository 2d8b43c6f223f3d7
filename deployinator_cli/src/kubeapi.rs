use std::{collections::BTreeMap, fmt::Debug, future::Future, path::Path, time::Duration};

use k8s_openapi::{
    api::core::v1::{ConfigMap, Pod},
    NamespaceResourceScope,
};
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
    Client, Resource,
};
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::{sleep, Instant};

use super::{Error, ErrorKind, Result};
use deployinator_definitions::labels::Selector;

/// Namespaced kinds the client can operate on
pub trait Kind:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + DeserializeOwned
    + Serialize
    + Debug
    + Send
    + Sync
    + 'static
{
}
impl<K> Kind for K where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug
        + Send
        + Sync
        + 'static
{
}

/// Keep the status code of api errors so callers can classify them
fn api_error(e: kube::Error) -> Error {
    match e {
        kube::Error::Api(ae) => ErrorKind::KubeApi(ae.code, ae.message.clone()).into(),
        e => e.into(),
    }
}

pub fn is_not_found(e: &Error) -> bool {
    matches!(e.kind(), ErrorKind::KubeApi(404, _))
}

pub fn is_conflict(e: &Error) -> bool {
    matches!(e.kind(), ErrorKind::KubeApi(409, _))
}

/// Turn a 404 into `Ok(None)`
pub fn ignore_not_found<T>(res: Result<T>) -> Result<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(e) if is_not_found(&e) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Interval and deadline for existence polling
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        PollSettings {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(10 * 60),
        }
    }
}

impl PollSettings {
    /// Fast polling for tests
    pub fn testing() -> Self {
        PollSettings {
            interval: Duration::from_millis(10),
            timeout: Duration::from_secs(100),
        }
    }
}

/// Check immediately, then every interval until `check` holds or the deadline passes
pub async fn poll_until<F, Fut>(poll: &PollSettings, what: &str, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let start = Instant::now();
    loop {
        if check().await? {
            return Ok(());
        }
        if start.elapsed() >= poll.timeout {
            bail!(ErrorKind::Timeout(what.to_string(), poll.timeout.as_secs()));
        }
        trace!("Waiting for {}", what);
        sleep(poll.interval).await;
    }
}

const CONFLICT_STEPS: u32 = 5;
const CONFLICT_BACKOFF: Duration = Duration::from_millis(10);

/// Re-run an update while it fails with a 409
///
/// The closure should refetch what it updates, otherwise it will conflict again.
pub async fn retry_on_conflict<T, F, Fut>(mut update: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut step = 1;
    loop {
        match update().await {
            Err(e) if is_conflict(&e) && step < CONFLICT_STEPS => {
                debug!("Conflict on attempt {}: {}", step, e);
                sleep(CONFLICT_BACKOFF * step).await;
                step += 1;
            }
            res => return res,
        }
    }
}

#[derive(Serialize, Default, Clone, Debug, PartialEq)]
struct MetadataFields {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, Option<String>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    annotations: BTreeMap<String, Option<String>>,
}

/// A merge patch touching only labels and annotations
///
/// Removals serialize as `null`.
#[derive(Serialize, Default, Clone, Debug, PartialEq)]
pub struct MetadataPatch {
    metadata: MetadataFields,
}

impl MetadataPatch {
    pub fn new() -> Self {
        MetadataPatch::default()
    }

    pub fn set_label(mut self, key: &str, value: &str) -> Self {
        self.metadata.labels.insert(key.into(), Some(value.into()));
        self
    }

    pub fn remove_label(mut self, key: &str) -> Self {
        self.metadata.labels.insert(key.into(), None);
        self
    }

    pub fn set_annotation(mut self, key: &str, value: &str) -> Self {
        self.metadata.annotations.insert(key.into(), Some(value.into()));
        self
    }

    pub fn remove_annotation(mut self, key: &str) -> Self {
        self.metadata.annotations.insert(key.into(), None);
        self
    }
}

/// A merge patch on the `data` of a config map
#[derive(Serialize, Default, Clone, Debug, PartialEq)]
pub struct ConfigMapDataPatch {
    pub data: BTreeMap<String, Option<String>>,
}

/// Name of an object, which every write needs
pub fn name_of<K: Kind>(obj: &K) -> Result<String> {
    obj.meta()
        .name
        .clone()
        .ok_or_else(|| ErrorKind::MissingName(K::kind(&()).to_string()).into())
}

/// Kubernetes client bound to one namespace
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
    namespace: String,
    poll: PollSettings,
}

impl KubeClient {
    /// Connect using an explicit kubeconfig, or in-cluster / default config
    pub async fn new(namespace: &str, kubeconfig: Option<&Path>) -> Result<Self> {
        let config = match kubeconfig {
            Some(path) => {
                let kc = Kubeconfig::read_from(path).map_err(|e| ErrorKind::KubeConfig(e.to_string()))?;
                kube::Config::from_custom_kubeconfig(kc, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| ErrorKind::KubeConfig(e.to_string()))?
            }
            None => kube::Config::infer()
                .await
                .map_err(|e| ErrorKind::KubeConfig(e.to_string()))?,
        };
        KubeClient::from_config(config, namespace)
    }

    pub fn from_config(config: kube::Config, namespace: &str) -> Result<Self> {
        // rustls needs a process wide provider; a second install is a no-op error
        let _ = rustls::crypto::ring::default_provider().install_default();
        debug!("Using cluster {} namespace {}", config.cluster_url, namespace);
        let client = Client::try_from(config)?;
        Ok(KubeClient::from_client(client, namespace))
    }

    pub fn from_client(client: Client, namespace: &str) -> Self {
        KubeClient {
            client,
            namespace: namespace.into(),
            poll: PollSettings::default(),
        }
    }

    pub fn with_poll(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn api<K: Kind>(&self) -> Api<K> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    pub async fn get<K: Kind>(&self, name: &str) -> Result<K> {
        self.api::<K>().get(name).await.map_err(api_error)
    }

    pub async fn get_opt<K: Kind>(&self, name: &str) -> Result<Option<K>> {
        self.api::<K>().get_opt(name).await.map_err(api_error)
    }

    pub async fn list<K: Kind>(&self, selector: &Selector) -> Result<Vec<K>> {
        let lp = ListParams::default().labels(&selector.to_string());
        let list = self.api::<K>().list(&lp).await.map_err(api_error)?;
        Ok(list.items)
    }

    pub async fn create<K: Kind>(&self, obj: &K) -> Result<K> {
        debug!("Creating {} {:?}", K::kind(&()), obj.meta().name);
        self.api::<K>()
            .create(&PostParams::default(), obj)
            .await
            .map_err(api_error)
    }

    /// Replace an object, which must carry the `resourceVersion` it was read at
    pub async fn replace<K: Kind>(&self, obj: &K) -> Result<K> {
        let name = name_of(obj)?;
        debug!("Replacing {} {}", K::kind(&()), name);
        self.api::<K>()
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(api_error)
    }

    pub async fn delete<K: Kind>(&self, name: &str) -> Result<()> {
        debug!("Deleting {} {}", K::kind(&()), name);
        self.api::<K>()
            .delete(name, &DeleteParams::default())
            .await
            .map_err(api_error)?;
        Ok(())
    }

    pub async fn patch_metadata<K: Kind>(&self, name: &str, patch: &MetadataPatch) -> Result<K> {
        self.api::<K>()
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(api_error)
    }

    /// Set or (with `None`) remove keys of a config map
    pub async fn patch_config_map_data(
        &self,
        name: &str,
        data: BTreeMap<String, Option<String>>,
    ) -> Result<ConfigMap> {
        let patch = ConfigMapDataPatch { data };
        self.api::<ConfigMap>()
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(api_error)
    }

    pub async fn exists<K: Kind>(&self, name: &str) -> Result<bool> {
        Ok(ignore_not_found(self.get::<K>(name).await)?.is_some())
    }

    /// Create or replace an object
    ///
    /// With `force` the object is deleted first, and the call waits for it to be gone.
    pub async fn upsert<K: Kind>(&self, mut obj: K, force: bool) -> Result<K> {
        let name = name_of(&obj)?;
        if force && self.exists::<K>(&name).await? {
            self.delete_and_wait::<K>(&name).await?;
        }
        match self.get_opt::<K>(&name).await? {
            Some(existing) => {
                obj.meta_mut().resource_version = existing.meta().resource_version.clone();
                self.replace(&obj).await
            }
            None => self.create(&obj).await,
        }
    }

    pub async fn create_and_wait<K: Kind>(&self, obj: &K) -> Result<K> {
        let created = self.create(obj).await?;
        let name = name_of(&created)?;
        let what = format!("{} {} to exist", K::kind(&()), name);
        let name = name.as_str();
        poll_until(&self.poll, &what, move || self.exists::<K>(name)).await?;
        Ok(created)
    }

    pub async fn delete_and_wait<K: Kind>(&self, name: &str) -> Result<()> {
        self.delete::<K>(name).await?;
        let what = format!("{} {} to be deleted", K::kind(&()), name);
        poll_until(&self.poll, &what, move || async move { Ok(!self.exists::<K>(name).await?) }).await
    }

    /// Running instances of a service
    pub async fn pods_for_service(&self, service: &str) -> Result<Vec<Pod>> {
        self.list::<Pod>(&Selector::service_pods(service)).await
    }
}

#[cfg(test)]
mod tests {
    use super::{ignore_not_found, is_conflict, poll_until, retry_on_conflict, MetadataPatch, PollSettings};
    use crate::{Error, ErrorKind, Result};
    use serde_json::json;
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    fn conflict() -> Error {
        ErrorKind::KubeApi(409, "the object has been modified".into()).into()
    }

    #[test]
    fn metadata_patch_body() {
        let p = MetadataPatch::new()
            .set_label("blend-service", "web")
            .remove_label("blend-service-secret");
        assert_eq!(
            serde_json::to_value(&p).unwrap(),
            json!({"metadata": {"labels": {"blend-service": "web", "blend-service-secret": null}}})
        );
        let a = MetadataPatch::new().set_annotation("note", "x");
        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            json!({"metadata": {"annotations": {"note": "x"}}})
        );
    }

    #[test]
    fn classification() {
        assert!(is_conflict(&conflict()));
        let nf: Error = ErrorKind::KubeApi(404, "not found".into()).into();
        assert!(ignore_not_found::<()>(Err(nf)).unwrap().is_none());
        assert!(ignore_not_found::<()>(Err(conflict())).is_err());
    }

    #[tokio::test]
    async fn polls_until_true() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        poll_until(&PollSettings::testing(), "third call", move || async move {
            Ok(counter.fetch_add(1, Ordering::SeqCst) >= 2)
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn polling_times_out() {
        let poll = PollSettings {
            interval: Duration::from_millis(1),
            timeout: Duration::from_millis(20),
        };
        let err = poll_until(&poll, "never", || async { Ok(false) }).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Timeout(..)));
    }

    #[tokio::test]
    async fn conflicts_are_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let res: Result<u32> = retry_on_conflict(move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(conflict())
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(res.unwrap(), 2);

        let calls = AtomicU32::new(0);
        let counter = &calls;
        let res: Result<()> = retry_on_conflict(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(conflict())
        })
        .await;
        assert!(is_conflict(&res.unwrap_err()));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }
}
