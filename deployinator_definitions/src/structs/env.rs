use inherit::{Blank, Inherit};
use regex::Regex;
use std::collections::BTreeSet;

use super::Result;

/// Reference to a key in a kubernetes secret
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    /// Name of the secret
    pub name: String,
    /// Key within the secret
    pub key: String,
}

/// A single container environment variable
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
    /// Read the value from a secret rather than inlining it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<SecretKeyRef>,
}

impl EnvVar {
    pub fn plain(name: &str, value: &str) -> Self {
        EnvVar {
            name: name.into(),
            value: value.into(),
            secret_key_ref: None,
        }
    }
}

/// Ordered list of environment variables
///
/// Inheritance coalesces by `name`: the receiver's variables win and keep their order,
/// variables only present in the other list are appended after them.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct EnvVars(pub Vec<EnvVar>);

impl EnvVars {
    pub fn new(vars: Vec<EnvVar>) -> Self {
        EnvVars(vars)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&EnvVar> {
        self.0.iter().find(|e| e.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EnvVar> {
        self.0.iter()
    }

    pub fn verify(&self) -> Result<()> {
        let re = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")?;
        let mut seen = BTreeSet::new();
        for e in &self.0 {
            if !re.is_match(&e.name) {
                bail!("env var '{}' is not a valid environment variable name", e.name);
            }
            if !seen.insert(e.name.as_str()) {
                bail!("env var '{}' is defined more than once", e.name);
            }
            if e.secret_key_ref.is_some() && !e.value.is_empty() {
                bail!("env var '{}' cannot have both a value and a secretKeyRef", e.name);
            }
        }
        Ok(())
    }
}

impl Blank for EnvVars {
    fn is_blank(&self) -> bool {
        self.0.is_empty()
    }
}

impl Inherit for EnvVars {
    fn inherit_from(self, other: Self) -> Self {
        let EnvVars(mut merged) = self;
        for o in other.0 {
            if !merged.iter().any(|e| e.name == o.name) {
                merged.push(o);
            }
        }
        EnvVars(merged)
    }
}

impl From<Vec<EnvVar>> for EnvVars {
    fn from(v: Vec<EnvVar>) -> Self {
        EnvVars(v)
    }
}

#[cfg(test)]
mod tests {
    use super::{EnvVar, EnvVars, SecretKeyRef};
    use inherit::Inherit;

    #[test]
    fn receiver_wins_by_name() {
        let a = EnvVars::new(vec![EnvVar::plain("X", "1")]);
        let b = EnvVars::new(vec![EnvVar::plain("X", "2"), EnvVar::plain("Y", "3")]);
        let merged = a.inherit_from(b);
        assert_eq!(merged.0, vec![EnvVar::plain("X", "1"), EnvVar::plain("Y", "3")]);
    }

    #[test]
    fn empty_receiver_takes_everything() {
        let b = EnvVars::new(vec![EnvVar::plain("A", "a"), EnvVar::plain("B", "b")]);
        assert_eq!(EnvVars::default().inherit_from(b.clone()), b);
    }

    #[test]
    fn verify() {
        assert!(EnvVars::new(vec![EnvVar::plain("GOOD_NAME", "x")]).verify().is_ok());
        assert!(EnvVars::new(vec![EnvVar::plain("1BAD", "x")]).verify().is_err());
        assert!(EnvVars::new(vec![EnvVar::plain("A", "x"), EnvVar::plain("A", "y")])
            .verify()
            .is_err());
        let both = EnvVar {
            name: "A".into(),
            value: "x".into(),
            secret_key_ref: Some(SecretKeyRef {
                name: "svc-env".into(),
                key: "A".into(),
            }),
        };
        assert!(EnvVars::new(vec![both]).verify().is_err());
    }
}
