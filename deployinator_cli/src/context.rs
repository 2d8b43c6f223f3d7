use super::{ErrorKind, KubeClient, Result, ResultExt, ServiceSecrets, Settings, Vault};
use deployinator_definitions::vault;

/// Settings and the clients a command needs, built once in main
///
/// Clients are only connected when a command asks for them, so that commands
/// not touching the cluster or vault work without their environment.
pub struct Context {
    pub settings: Settings,
    kube: Option<KubeClient>,
    vault: Option<Vault>,
}

impl Context {
    pub fn new(settings: Settings) -> Self {
        Context {
            settings,
            kube: None,
            vault: None,
        }
    }

    pub async fn connect_kube(mut self) -> Result<Self> {
        let kube = KubeClient::new(self.settings.namespace()?, self.settings.kubeconfig.as_deref()).await?;
        self.kube = Some(kube);
        Ok(self)
    }

    pub fn connect_vault(mut self) -> Result<Self> {
        let addr = self.settings.vault_addr()?;
        let token = match &self.settings.vault_token {
            Some(t) => t.clone(),
            None => vault::token_from_file().chain_err(|| ErrorKind::MissingEnv("VAULT_TOKEN".into()))?,
        };
        let vault = Vault::new(addr, token)?;
        debug!("Vault at {}", vault.addr());
        self.vault = Some(vault);
        Ok(self)
    }

    /// Use an existing kubernetes client
    pub fn with_kube(mut self, kube: KubeClient) -> Self {
        self.kube = Some(kube);
        self
    }

    pub fn with_vault(mut self, vault: Vault) -> Self {
        self.vault = Some(vault);
        self
    }

    pub fn kube(&self) -> Result<&KubeClient> {
        match &self.kube {
            Some(k) => Ok(k),
            None => bail!("kubernetes client not connected"),
        }
    }

    pub fn vault(&self) -> Result<&Vault> {
        match &self.vault {
            Some(v) => Ok(v),
            None => bail!("vault client not connected"),
        }
    }

    pub fn secrets(&self) -> Result<ServiceSecrets<KubeClient>> {
        Ok(ServiceSecrets::new(self.kube()?.clone()))
    }
}
