use serde_json::Value;
use std::{fs, path::Path};

use super::{Config, Result, ResultExt};
use deployinator_definitions::merge_configs;

/// Read one YAML config layer
pub fn read_config(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path).chain_err(|| format!("could not read {}", path.display()))?;
    let config = serde_yaml::from_str(&data).chain_err(|| format!("could not parse {}", path.display()))?;
    Ok(config)
}

/// Compose config files, leftmost winning
pub fn compose_files<P: AsRef<Path>>(paths: &[P]) -> Result<Config> {
    let configs = paths
        .iter()
        .map(|p| read_config(p.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    debug!("Composing {} config files", configs.len());
    Ok(merge_configs(configs))
}

/// Compose config files and validate the result
pub fn validate_files<P: AsRef<Path>>(paths: &[P]) -> Result<Config> {
    let config = compose_files(paths)?;
    config.validate()?;
    info!("{} validated", config.service_name());
    Ok(config)
}

/// Drop unset fields so only what a config says is shown
fn prune(v: Value) -> Option<Value> {
    match v {
        Value::Null => None,
        Value::Array(a) if a.is_empty() => None,
        Value::Object(o) => {
            let kept: serde_json::Map<String, Value> =
                o.into_iter().filter_map(|(k, v)| prune(v).map(|v| (k, v))).collect();
            if kept.is_empty() {
                None
            } else {
                Some(Value::Object(kept))
            }
        }
        v => Some(v),
    }
}

/// YAML of the fields that are set
pub fn to_yaml(config: &Config) -> Result<String> {
    let value = prune(serde_json::to_value(config)?).unwrap_or_else(|| Value::Object(Default::default()));
    Ok(serde_yaml::to_string(&value)?)
}
