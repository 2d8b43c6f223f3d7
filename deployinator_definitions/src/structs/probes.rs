use inherit::Blank;

use super::Result;

#[derive(Serialize, Deserialize, Clone, Default, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpGet {
    /// Uri path to GET (i.e. / or /health)
    pub path: String,
    /// Port name (i.e. http or http-health)
    #[serde(default = "http_get_default_port")]
    pub port: String,
}
fn http_get_default_port() -> String {
    "http".into()
}

#[derive(Serialize, Deserialize, Clone, Default, Debug, PartialEq, Eq)]
pub struct TcpSocket {
    pub port: String,
}

/// Liveness or readiness Probe
#[derive(Serialize, Deserialize, Clone, Default, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    /// Http Get probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_get: Option<HttpGet>,

    /// Shell exec probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<Vec<String>>,

    /// Tcp Socket probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_socket: Option<TcpSocket>,

    /// How long to wait before kube performs first probe
    #[serde(default = "initial_delay_seconds_default")]
    pub initial_delay_seconds: u32,

    /// How long between each probe
    #[serde(default = "period_seconds_default")]
    pub period_seconds: u32,

    /// Min consecutive failures before considering a probe failed
    #[serde(default = "failure_threshold_default")]
    pub failure_threshold: u32,

    /// Number of seconds after which the probe times out
    #[serde(default = "timeout_seconds_default")]
    pub timeout_seconds: u32,
}

// 5 is kube standard delay default, we set it a little higher
fn initial_delay_seconds_default() -> u32 {
    10
}
fn period_seconds_default() -> u32 {
    5
}
fn failure_threshold_default() -> u32 {
    3
}
fn timeout_seconds_default() -> u32 {
    1
}

impl Probe {
    pub fn http(path: &str) -> Self {
        Probe {
            http_get: Some(HttpGet {
                path: path.into(),
                port: http_get_default_port(),
            }),
            exec: None,
            tcp_socket: None,
            initial_delay_seconds: initial_delay_seconds_default(),
            period_seconds: period_seconds_default(),
            failure_threshold: failure_threshold_default(),
            timeout_seconds: timeout_seconds_default(),
        }
    }

    pub fn verify(&self) -> Result<()> {
        let handlers = [self.http_get.is_some(), self.exec.is_some(), self.tcp_socket.is_some()];
        match handlers.iter().filter(|h| **h).count() {
            1 => {}
            0 => bail!("probe needs one of httpGet, exec or tcpSocket"),
            _ => bail!("probe can only have one of httpGet, exec or tcpSocket"),
        }
        if let Some(hg) = &self.http_get {
            if !hg.path.starts_with('/') {
                bail!("probe path '{}' must start with a slash", hg.path);
            }
        }
        if self.failure_threshold == 0 || self.period_seconds == 0 {
            bail!("probe periodSeconds and failureThreshold must be positive");
        }
        Ok(())
    }
}

impl Blank for Probe {}
