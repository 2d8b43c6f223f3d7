use inherit::Inherit;

use super::{Config, ConfigSource};

/// Fold config layers into one config, earlier layers winning
///
/// Equivalent to `s1.config().inherit_from(s2.config()).inherit_from(s3.config())...`.
pub fn compose_configs(sources: &[&dyn ConfigSource]) -> Config {
    let composed = sources
        .iter()
        .fold(Config::default(), |acc, s| acc.inherit_from(s.config()));
    trace!("Composed {} config layers for '{}'", sources.len(), composed.service_name());
    composed
}

/// Like `compose_configs` for configs that are already materialised
pub fn merge_configs<I: IntoIterator<Item = Config>>(configs: I) -> Config {
    configs.into_iter().fold(Config::default(), |acc, c| acc.inherit_from(c))
}
