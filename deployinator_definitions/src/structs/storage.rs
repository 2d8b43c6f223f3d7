use inherit::Blank;
use std::path::{Component, Path};

use super::Result;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    ReadWriteOnce,
    ReadOnlyMany,
    ReadWriteMany,
}

/// A persistent volume claim mounted into the main container
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageConfig {
    /// Size of the volume in GiB
    pub size: u32,
    /// Absolute path in the container
    pub mount_path: String,
    /// Kube storage class, cluster default if unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    pub access_mode: AccessMode,
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            bail!("storage size must be at least 1Gi");
        }
        if self.size > 1024 {
            bail!("storage size of {}Gi exceeds the 1024Gi maximum", self.size);
        }
        let path = Path::new(&self.mount_path);
        if !path.is_absolute() {
            bail!("storage mountPath '{}' must be absolute", self.mount_path);
        }
        if path.components().any(|c| c == Component::ParentDir) {
            bail!("storage mountPath '{}' cannot contain '..'", self.mount_path);
        }
        if path == Path::new("/") {
            bail!("storage cannot be mounted at the root");
        }
        if let Some(sc) = &self.storage_class {
            if sc.is_empty() {
                bail!("storageClass cannot be an empty string");
            }
        }
        Ok(())
    }
}

impl Blank for StorageConfig {
    fn is_blank(&self) -> bool {
        self.size == 0 && self.mount_path.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::StorageConfig;

    fn storage(size: u32, path: &str) -> StorageConfig {
        StorageConfig {
            size,
            mount_path: path.into(),
            ..Default::default()
        }
    }

    #[test]
    fn validate() {
        assert!(storage(10, "/data").validate().is_ok());
        assert!(storage(0, "/data").validate().is_err());
        assert!(storage(2048, "/data").validate().is_err());
        assert!(storage(10, "data").validate().is_err());
        assert!(storage(10, "/data/../etc").validate().is_err());
        assert!(storage(10, "/").validate().is_err());
    }
}
