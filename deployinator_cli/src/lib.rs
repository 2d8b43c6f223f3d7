#![recursion_limit = "1024"]
#![allow(renamed_and_removed_lints)]

#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate log;
#[macro_use]
extern crate error_chain;

error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }
    links {}
    foreign_links {
        Fmt(::std::fmt::Error);
        Io(::std::io::Error);
        Int(::std::num::ParseIntError);
        Defs(deployinator_definitions::Error);
        SerdeY(serde_yaml::Error);
        SerdeJ(serde_json::Error);
        Kube(::kube::Error);
        Addr(::std::net::AddrParseError);
    }
    errors {
        MissingEnv(name: String) {
            description("required environment variable not set")
            display("{} not specified", name)
        }
        KubeConfig(reason: String) {
            description("could not configure kubernetes client")
            display("could not configure kubernetes client: {}", reason)
        }
        KubeApi(code: u16, message: String) {
            description("kubernetes api request failed")
            display("kubernetes responded {}: {}", code, message)
        }
        Timeout(what: String, secs: u64) {
            description("timed out waiting")
            display("timed out after {}s waiting for {}", secs, what)
        }
        MissingName(kind: String) {
            description("object has no name")
            display("{} has no metadata.name", kind)
        }
        NotAVersion(version: String, secret: String) {
            description("secret is not a version of the given secret")
            display("{} is not a version of {}", version, secret)
        }
    }
}

pub use deployinator_definitions::{Config, Vault};

/// Environment driven settings
pub mod settings;
pub use settings::Settings;

/// Typed facade over the kubernetes api
pub mod kubeapi;
pub use kubeapi::KubeClient;

/// Versioned service secrets
pub mod secrets;
pub use secrets::{SecretKind, SecretStore, ServiceSecrets};

/// In-memory secret store
pub mod fake;

/// Shared clients and settings
pub mod context;
pub use context::Context;

/// HTTP server
pub mod server;

/// Config composition from files
pub mod compose;
