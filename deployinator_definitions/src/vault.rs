use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::{collections::BTreeMap, env, time::Duration};

use super::{Error, ErrorKind, Result, ResultExt};

fn default_addr() -> Result<String> {
    env::var("VAULT_HOST")
        .or_else(|_| env::var("VAULT_ADDR"))
        .map_err(|_| ErrorKind::MissingVaultAddr.into())
}

/// Token left by `vault login`
pub fn token_from_file() -> Result<String> {
    let path = dirs::home_dir()
        .ok_or(ErrorKind::NoHomeDirectory)?
        .join(".vault-token");
    let token = std::fs::read_to_string(&path)?;
    Ok(token.trim().to_string())
}

fn default_token() -> Result<String> {
    env::var("VAULT_TOKEN")
        .or_else(|_| token_from_file())
        .chain_err(|| ErrorKind::MissingVaultToken)
}

/// Secret values can be integers or strings
///
/// Integers are coerced to strings, since the UI makes quoting them awkward.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
enum SecretValue {
    S(String),
    I(i64),
}
impl From<SecretValue> for String {
    fn from(sv: SecretValue) -> String {
        match sv {
            SecretValue::I(i) => i.to_string(),
            SecretValue::S(s) => s,
        }
    }
}

/// The envelope most Vault responses arrive in
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct SecretData {
    data: BTreeMap<String, SecretValue>,
}

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    keys: Vec<String>,
}

/// Response of `sys/health`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Health {
    pub initialized: bool,
    pub sealed: bool,
    #[serde(default)]
    pub standby: bool,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub cluster_name: Option<String>,
}

/// A secrets engine or auth mount
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Mount {
    #[serde(rename = "type")]
    pub mount_type: String,
    #[serde(default)]
    pub description: String,
}

/// An AWS secrets engine role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AwsRole {
    pub credential_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policy_arns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_document: Option<String>,
}

/// Leased AWS credentials
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AwsCredentials {
    pub lease_id: String,
    pub lease_duration: u64,
    pub access_key: String,
    pub secret_key: String,
    pub security_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AwsLease {
    lease_id: String,
    lease_duration: u64,
    data: AwsKeys,
}

#[derive(Debug, Deserialize)]
struct AwsKeys {
    access_key: String,
    secret_key: String,
    security_token: Option<String>,
}

/// Parameters of `auth/token/create`
#[derive(Debug, Clone, Serialize, Default)]
pub struct TokenRequest {
    pub policies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewable: Option<bool>,
}

/// The `auth` block of a token creation response
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TokenAuth {
    pub client_token: String,
    #[serde(default)]
    pub accessor: String,
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub lease_duration: u64,
    #[serde(default)]
    pub renewable: bool,
}

#[derive(Debug, Deserialize)]
struct AuthEnvelope {
    auth: TokenAuth,
}

/// How often and how long to retry transient failures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 5,
            interval: Duration::from_secs(10),
        }
    }
}

/// Status code of a failed Vault call, if Vault answered at all
pub fn error_code(err: &Error) -> Option<u16> {
    match err.kind() {
        ErrorKind::Vault(code, _) => Some(*code),
        _ => None,
    }
}

/// Turn a 404 from Vault into `Ok(None)`
pub fn ignore_not_found<T>(res: Result<T>) -> Result<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(e) if error_code(&e) == Some(404) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Vault reports failures as `{"errors": [...]}`
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct Errors {
        errors: Vec<String>,
    }
    match serde_json::from_str::<Errors>(body) {
        Ok(e) if !e.errors.is_empty() => e.errors.join("; "),
        _ => body.trim().to_string(),
    }
}

/// Vault HTTP client
pub struct Vault {
    client: reqwest::Client,
    /// The address of our Vault server.
    addr: Url,
    token: String,
    retry: RetryPolicy,
}

impl Vault {
    /// Initialize using the same evars or token files that the `vault` CLI uses
    pub fn from_env() -> Result<Vault> {
        Vault::new(&default_addr()?, default_token()?)
    }

    pub fn new<S: Into<String>>(addr: &str, token: S) -> Result<Vault> {
        Ok(Vault {
            client: reqwest::Client::new(),
            addr: Url::parse(addr)?,
            token: token.into(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn addr(&self) -> &Url {
        &self.addr
    }

    /// Every call goes through here
    ///
    /// Network errors and 5xx responses are retried, anything else is returned as is.
    /// Returns `None` for successful responses without a body.
    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Option<Value>> {
        let url = self.addr.join(&format!("v1/{}", path))?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!("{} {}", method, url);
            let mut req = self
                .client
                .request(method.clone(), url.clone())
                .header("X-Vault-Token", &self.token);
            if let Some(b) = body {
                req = req.json(b);
            }
            let err: Error = match req.send().await {
                Ok(res) => {
                    let status = res.status();
                    let text = res.text().await?;
                    if status.is_success() {
                        if text.trim().is_empty() {
                            return Ok(None);
                        }
                        return Ok(Some(serde_json::from_str(&text)?));
                    }
                    let err = ErrorKind::Vault(status.as_u16(), error_message(&text)).into();
                    if !status.is_server_error() {
                        return Err(err);
                    }
                    err
                }
                Err(e) => e.into(),
            };
            if attempt >= self.retry.attempts {
                warn!("Giving up on {} {} after {} attempts", method, url, attempt);
                return Err(err);
            }
            warn!("{} {} failed (attempt {}/{}): {}", method, url, attempt, self.retry.attempts, err);
            tokio::time::sleep(self.retry.interval).await;
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.expect_body(Method::GET, path, None).await
    }

    async fn expect_body<T: DeserializeOwned>(&self, method: Method, path: &str, body: Option<&Value>) -> Result<T> {
        match self.request(method, path, body).await? {
            Some(v) => Ok(serde_json::from_value(v)?),
            None => bail!("vault returned no body for {}", path),
        }
    }

    async fn send(&self, method: Method, path: &str, body: Value) -> Result<()> {
        self.request(method, path, Some(&body)).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.request(Method::DELETE, path, None).await?;
        Ok(())
    }

    // sys

    pub async fn health(&self) -> Result<Health> {
        self.get("sys/health").await
    }

    pub async fn list_mounts(&self) -> Result<BTreeMap<String, Mount>> {
        let raw: Value = self.get("sys/mounts").await?;
        // newer servers nest mounts under data, older ones return them at the top level
        let mounts = match raw.get("data") {
            Some(d) if d.is_object() => d.clone(),
            _ => raw,
        };
        let entries: BTreeMap<String, Value> = serde_json::from_value(mounts)?;
        Ok(entries
            .into_iter()
            .filter_map(|(k, v)| serde_json::from_value::<Mount>(v).ok().map(|m| (k, m)))
            .collect())
    }

    pub async fn enable_mount(&self, path: &str, mount_type: &str, description: &str) -> Result<()> {
        info!("Enabling {} mount at {}", mount_type, path);
        let body = json!({ "type": mount_type, "description": description });
        self.send(Method::POST, &format!("sys/mounts/{}", path), body).await
    }

    pub async fn disable_mount(&self, path: &str) -> Result<()> {
        info!("Disabling mount at {}", path);
        self.delete(&format!("sys/mounts/{}", path)).await
    }

    pub async fn put_policy(&self, name: &str, rules: &str) -> Result<()> {
        debug!("Writing policy {}", name);
        let body = json!({ "policy": rules });
        self.send(Method::PUT, &format!("sys/policies/acl/{}", name), body).await
    }

    /// Policy rules, if the policy exists
    pub async fn get_policy(&self, name: &str) -> Result<Option<String>> {
        #[derive(Deserialize)]
        struct Policy {
            policy: String,
        }
        let res = self.get::<Envelope<Policy>>(&format!("sys/policies/acl/{}", name)).await;
        Ok(ignore_not_found(res)?.map(|e| e.data.policy))
    }

    pub async fn delete_policy(&self, name: &str) -> Result<()> {
        self.delete(&format!("sys/policies/acl/{}", name)).await
    }

    /// Revoke a lease, returning false if Vault no longer knows it
    pub async fn revoke_lease(&self, lease_id: &str) -> Result<bool> {
        let body = json!({ "lease_id": lease_id });
        match self.send(Method::PUT, "sys/leases/revoke", body).await {
            Ok(()) => Ok(true),
            Err(e) if error_code(&e) == Some(400) => {
                debug!("Lease {} not present", lease_id);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    // secret

    /// Key value pairs stored at `secret/<path>`, if any
    pub async fn read_secret(&self, path: &str) -> Result<Option<BTreeMap<String, String>>> {
        let res = self.get::<SecretData>(&format!("secret/{}", path)).await;
        Ok(ignore_not_found(res)?.map(|s| s.data.into_iter().map(|(k, v)| (k, v.into())).collect()))
    }

    pub async fn write_secret(&self, path: &str, data: &BTreeMap<String, String>) -> Result<()> {
        self.send(Method::POST, &format!("secret/{}", path), serde_json::to_value(data)?)
            .await
    }

    /// Keys directly under `secret/<path>`, skipping sub folders
    pub async fn list_secrets(&self, path: &str) -> Result<Vec<String>> {
        let res = self
            .get::<Envelope<ListData>>(&format!("secret/{}?list=true", path))
            .await;
        Ok(ignore_not_found(res)?
            .map(|e| e.data.keys)
            .unwrap_or_default()
            .into_iter()
            .filter(|k| !k.ends_with('/'))
            .collect())
    }

    pub async fn delete_secret(&self, path: &str) -> Result<()> {
        self.delete(&format!("secret/{}", path)).await
    }

    // aws

    pub async fn put_aws_role(&self, name: &str, role: &AwsRole) -> Result<()> {
        self.send(Method::POST, &format!("aws/roles/{}", name), serde_json::to_value(role)?)
            .await
    }

    pub async fn get_aws_role(&self, name: &str) -> Result<Option<AwsRole>> {
        let res = self.get::<Envelope<AwsRole>>(&format!("aws/roles/{}", name)).await;
        Ok(ignore_not_found(res)?.map(|e| e.data))
    }

    pub async fn delete_aws_role(&self, name: &str) -> Result<()> {
        self.delete(&format!("aws/roles/{}", name)).await
    }

    pub async fn aws_credentials(&self, role: &str) -> Result<AwsCredentials> {
        let lease: AwsLease = self.get(&format!("aws/creds/{}", role)).await?;
        Ok(AwsCredentials {
            lease_id: lease.lease_id,
            lease_duration: lease.lease_duration,
            access_key: lease.data.access_key,
            secret_key: lease.data.secret_key,
            security_token: lease.data.security_token,
        })
    }

    // auth/github

    pub async fn configure_github(&self, organization: &str) -> Result<()> {
        let body = json!({ "organization": organization });
        self.send(Method::POST, "auth/github/config", body).await
    }

    pub async fn map_github_team(&self, team: &str, policies: &[String]) -> Result<()> {
        let body = json!({ "value": policies.join(",") });
        self.send(Method::POST, &format!("auth/github/map/teams/{}", team), body)
            .await
    }

    pub async fn map_github_user(&self, user: &str, policies: &[String]) -> Result<()> {
        let body = json!({ "value": policies.join(",") });
        self.send(Method::POST, &format!("auth/github/map/users/{}", user), body)
            .await
    }

    // transit

    pub async fn create_transit_key(&self, name: &str) -> Result<()> {
        self.send(Method::POST, &format!("transit/keys/{}", name), json!({}))
            .await
    }

    /// Key metadata, if the key exists
    pub async fn read_transit_key(&self, name: &str) -> Result<Option<Value>> {
        let res = self.get::<Envelope<Value>>(&format!("transit/keys/{}", name)).await;
        Ok(ignore_not_found(res)?.map(|e| e.data))
    }

    /// Encrypt bytes, returning Vault's `vault:v1:...` ciphertext
    pub async fn encrypt(&self, key: &str, plaintext: &[u8]) -> Result<String> {
        #[derive(Deserialize)]
        struct Cipher {
            ciphertext: String,
        }
        let body = json!({ "plaintext": STANDARD.encode(plaintext) });
        let res: Envelope<Cipher> = self
            .expect_body(Method::POST, &format!("transit/encrypt/{}", key), Some(&body))
            .await?;
        Ok(res.data.ciphertext)
    }

    pub async fn decrypt(&self, key: &str, ciphertext: &str) -> Result<Vec<u8>> {
        #[derive(Deserialize)]
        struct Plain {
            plaintext: String,
        }
        let body = json!({ "ciphertext": ciphertext });
        let res: Envelope<Plain> = self
            .expect_body(Method::POST, &format!("transit/decrypt/{}", key), Some(&body))
            .await?;
        Ok(STANDARD.decode(res.data.plaintext)?)
    }

    // auth/token

    pub async fn create_token(&self, req: &TokenRequest) -> Result<TokenAuth> {
        let body = serde_json::to_value(req)?;
        let res: AuthEnvelope = self
            .expect_body(Method::POST, "auth/token/create", Some(&body))
            .await?;
        Ok(res.auth)
    }

    /// Token metadata, or `None` if the token does not exist
    pub async fn lookup_token(&self, token: &str) -> Result<Option<Value>> {
        let body = json!({ "token": token });
        let res = self
            .expect_body::<Envelope<Value>>(Method::POST, "auth/token/lookup", Some(&body))
            .await;
        match res {
            Ok(e) => Ok(Some(e.data)),
            // vault answers permission denied for unknown tokens
            Err(e) if error_code(&e) == Some(StatusCode::FORBIDDEN.as_u16()) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn revoke_token(&self, token: &str) -> Result<()> {
        let body = json!({ "token": token });
        self.send(Method::POST, "auth/token/revoke", body).await
    }
}

#[cfg(test)]
mod tests {
    use super::{error_code, error_message, ignore_not_found, RetryPolicy};
    use crate::{Error, ErrorKind};
    use std::time::Duration;

    #[test]
    fn error_messages() {
        assert_eq!(error_message(r#"{"errors":["permission denied"]}"#), "permission denied");
        assert_eq!(error_message(r#"{"errors":["a","b"]}"#), "a; b");
        assert_eq!(error_message("upstream timeout\n"), "upstream timeout");
    }

    #[test]
    fn classification() {
        let nf: Error = ErrorKind::Vault(404, "".into()).into();
        assert_eq!(error_code(&nf), Some(404));
        assert!(ignore_not_found::<()>(Err(nf)).unwrap().is_none());

        let denied: Error = ErrorKind::Vault(403, "permission denied".into()).into();
        assert!(ignore_not_found::<()>(Err(denied)).is_err());

        let other: Error = "boom".into();
        assert_eq!(error_code(&other), None);
        assert_eq!(ignore_not_found(Ok(3)).unwrap(), Some(3));
    }

    #[test]
    fn default_retry() {
        let r = RetryPolicy::default();
        assert_eq!(r.attempts, 5);
        assert_eq!(r.interval, Duration::from_secs(10));
    }
}
