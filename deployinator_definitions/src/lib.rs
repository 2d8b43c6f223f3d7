#![recursion_limit = "1024"]
#![allow(renamed_and_removed_lints)]

#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate inherit_derive;
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
        Float(::std::num::ParseFloatError);
        Int(::std::num::ParseIntError);
        SerdeY(serde_yaml::Error);
        SerdeJ(serde_json::Error);
        Reqe(reqwest::Error);
        Url(url::ParseError);
        Base64(base64::DecodeError);
        Utf8(::std::string::FromUtf8Error);
        Regex(regex::Error);
    }
    errors {
        MissingVaultAddr {
            description("VAULT_HOST not specified")
            display("VAULT_HOST (or VAULT_ADDR) not specified")
        }
        MissingVaultToken {
            description("VAULT_TOKEN not specified")
            display("VAULT_TOKEN not specified")
        }
        NoHomeDirectory {
            description("can't find home directory")
            display("can't find home directory")
        }
        Vault(code: u16, message: String) {
            description("vault request failed")
            display("vault responded {}: {}", code, message)
        }
        InvalidScope(scope: String) {
            description("unrecognised grant scope")
            display("unrecognised scope '{}'", scope)
        }
        InvalidTarget(target: String) {
            description("unrecognised grant target")
            display("unrecognised target '{}'", target)
        }
        InvalidConfig(name: String) {
            description("config does not validate")
            display("config for {} does not validate", name)
        }
    }
}

/// Container, storage and scheduling building blocks of a `Config`
pub mod structs;

/// Closed enums used in configs
pub mod states;
pub use states::{Accessibility, BuildMode, Flag, ServiceType};

/// The flat deploy configuration and its accessors
pub mod config;
pub use config::Config;

/// Partial configs contributed by each layer
pub mod sources;
pub use sources::{
    BuilderConfig, ConfigSource, InferredConfig, RequestConfig, ServiceConfig, ServiceDefaultsConfig,
    TaskDefaultsConfig,
};

/// Folding config layers into one resolved config
pub mod compose;
pub use compose::{compose_configs, merge_configs};

/// Services, projects and databases with their config history
pub mod entities;
pub use entities::{Database, Project, Service};

/// Roles and the traits they carry
pub mod roles;
pub use roles::{Role, Trait};

/// Grants of roles on scopes
pub mod grants;
pub use grants::{Grant, Grants, Scope, ScopeType, Target, TargetType};

/// Kubernetes label vocabulary
pub mod labels;

/// A Hashicorp Vault HTTP client using `reqwest`
pub mod vault;
pub use vault::Vault;
