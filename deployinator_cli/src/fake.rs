use async_trait::async_trait;
use chrono::{SecondsFormat, TimeZone, Utc};
use k8s_openapi::{
    api::core::v1::Secret,
    apimachinery::pkg::apis::meta::v1::Time,
    ByteString,
};
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::Mutex;

use super::kubeapi::MetadataPatch;
use super::secrets::SecretStore;
use super::{ErrorKind, Result};
use deployinator_definitions::labels::Selector;

/// Creation times start here and advance one second per create, unless frozen
const EPOCH: i64 = 1_700_000_000;

/// Store operations that can be made to fail
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Get,
    List,
    Create,
    Replace,
    Delete,
    Patch,
}

#[derive(Default)]
struct State {
    secrets: BTreeMap<String, Secret>,
    writes: usize,
    clock: i64,
    resource_version: u64,
    fail_next: Option<Op>,
    frozen: bool,
}

impl State {
    fn check(&mut self, op: Op) -> Result<()> {
        if self.fail_next == Some(op) {
            self.fail_next = None;
            bail!(ErrorKind::KubeApi(500, format!("injected {:?} failure", op)));
        }
        Ok(())
    }

    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }
}

fn timestamp(secs: i64) -> Result<Time> {
    let dt = Utc.timestamp_opt(secs, 0).single().ok_or("invalid timestamp")?;
    let rfc = dt.to_rfc3339_opts(SecondsFormat::Secs, true);
    Ok(serde_json::from_value(serde_json::Value::String(rfc))?)
}

/// Fold string data into data, as the api server does on write
fn normalise(secret: &mut Secret) {
    if let Some(strings) = secret.string_data.take() {
        let data = secret.data.get_or_insert_with(BTreeMap::new);
        for (k, v) in strings {
            data.insert(k, ByteString(v.into_bytes()));
        }
    }
}

fn not_found(name: &str) -> ErrorKind {
    ErrorKind::KubeApi(404, format!("secrets \"{}\" not found", name))
}

/// An in-memory `SecretStore` that behaves like the api server for secrets
///
/// Clones share state.
#[derive(Clone, Default)]
pub struct FakeSecretStore {
    state: Arc<Mutex<State>>,
}

impl FakeSecretStore {
    pub fn new() -> Self {
        FakeSecretStore::default()
    }

    /// Number of successful writes so far
    pub async fn writes(&self) -> usize {
        self.state.lock().await.writes
    }

    /// Make the next call of `op` fail with a 500
    pub async fn fail_next(&self, op: Op) {
        self.state.lock().await.fail_next = Some(op);
    }

    /// Give every later create the same creation time, as a burst within one second gets
    pub async fn freeze_clock(&self) {
        self.state.lock().await.frozen = true;
    }

    pub async fn names(&self) -> Vec<String> {
        self.state.lock().await.secrets.keys().cloned().collect()
    }

    pub async fn secret(&self, name: &str) -> Option<Secret> {
        self.state.lock().await.secrets.get(name).cloned()
    }
}

#[async_trait]
impl SecretStore for FakeSecretStore {
    async fn get_secret(&self, name: &str) -> Result<Option<Secret>> {
        let mut state = self.state.lock().await;
        state.check(Op::Get)?;
        Ok(state.secrets.get(name).cloned())
    }

    async fn list_secrets(&self, selector: &Selector) -> Result<Vec<Secret>> {
        let mut state = self.state.lock().await;
        state.check(Op::List)?;
        let none = BTreeMap::new();
        Ok(state
            .secrets
            .values()
            .filter(|s| selector.matches(s.metadata.labels.as_ref().unwrap_or(&none)))
            .cloned()
            .collect())
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret> {
        let mut state = self.state.lock().await;
        state.check(Op::Create)?;
        let name = match &secret.metadata.name {
            Some(n) => n.clone(),
            None => bail!(ErrorKind::MissingName("Secret".into())),
        };
        if state.secrets.contains_key(&name) {
            bail!(ErrorKind::KubeApi(409, format!("secrets \"{}\" already exists", name)));
        }
        let mut created = secret.clone();
        normalise(&mut created);
        if !state.frozen {
            state.clock += 1;
        }
        created.metadata.creation_timestamp = Some(timestamp(EPOCH + state.clock)?);
        created.metadata.resource_version = Some(state.next_version());
        state.secrets.insert(name, created.clone());
        state.writes += 1;
        Ok(created)
    }

    async fn replace_secret(&self, secret: &Secret) -> Result<Secret> {
        let mut state = self.state.lock().await;
        state.check(Op::Replace)?;
        let name = match &secret.metadata.name {
            Some(n) => n.clone(),
            None => bail!(ErrorKind::MissingName("Secret".into())),
        };
        let existing = match state.secrets.get(&name) {
            Some(e) => e.clone(),
            None => bail!(not_found(&name)),
        };
        if secret.metadata.resource_version.is_some()
            && secret.metadata.resource_version != existing.metadata.resource_version
        {
            bail!(ErrorKind::KubeApi(409, format!("operation cannot be fulfilled on secrets \"{}\"", name)));
        }
        let mut replaced = secret.clone();
        normalise(&mut replaced);
        replaced.metadata.creation_timestamp = existing.metadata.creation_timestamp;
        replaced.metadata.resource_version = Some(state.next_version());
        state.secrets.insert(name, replaced.clone());
        state.writes += 1;
        Ok(replaced)
    }

    async fn delete_secret(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check(Op::Delete)?;
        if state.secrets.remove(name).is_none() {
            bail!(not_found(name));
        }
        state.writes += 1;
        Ok(())
    }

    async fn patch_secret_metadata(&self, name: &str, patch: &MetadataPatch) -> Result<Secret> {
        let mut state = self.state.lock().await;
        state.check(Op::Patch)?;
        let body = serde_json::to_value(patch)?;
        let rv = state.next_version();
        let secret = match state.secrets.get_mut(name) {
            Some(s) => s,
            None => bail!(not_found(name)),
        };
        let fields = [("labels", &mut secret.metadata.labels), ("annotations", &mut secret.metadata.annotations)];
        for (field, target) in fields {
            let changes: BTreeMap<String, Option<String>> = match body["metadata"].get(field) {
                Some(v) => serde_json::from_value(v.clone())?,
                None => continue,
            };
            let map = target.get_or_insert_with(BTreeMap::new);
            for (k, v) in changes {
                match v {
                    Some(v) => map.insert(k, v),
                    None => map.remove(&k),
                };
            }
        }
        secret.metadata.resource_version = Some(rv);
        let patched = secret.clone();
        state.writes += 1;
        Ok(patched)
    }
}
