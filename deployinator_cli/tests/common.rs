#![allow(dead_code)]

use deployinator::{fake::FakeSecretStore, secrets::secret_contents, ServiceSecrets};
use k8s_openapi::api::core::v1::Secret;

pub const PROJECT: &str = "shop";
pub const SERVICE: &str = "web";

pub fn secrets() -> ServiceSecrets<FakeSecretStore> {
    ServiceSecrets::new(FakeSecretStore::new())
}

/// Value of one key as a string
pub fn value(secret: &Secret, key: &str) -> Option<String> {
    secret_contents(secret)
        .get(key)
        .map(|v| String::from_utf8_lossy(v).into_owned())
}
