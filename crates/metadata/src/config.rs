use serde::Deserialize;
use std::path::Path;

use crate::error::MetadataError;
use crate::session::SessionConfig;

/// Keys of the `session` mapping, spelled as they appear in the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SessionSection {
    // SoupBinTCP
    pub address: Option<String>,
    pub port: Option<u32>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub heartbeat_interval_ms: Option<u64>,
    pub heartbeat_timeout_ms: Option<u64>,

    // MoldUDP64
    pub multicast_interface: Option<String>,
    pub multicast_group: Option<String>,
    pub multicast_port: Option<u32>,
    pub request_address: Option<String>,
    pub request_port: Option<u32>,
    pub request_timeout_ms: Option<u64>,
}

/// Recorder configuration file as written by the operator.
///
/// ```yaml
/// session:
///   address: feed.example.com
///   port: 4000
///   username: user
///   password: secret
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RecorderConfig {
    pub session: SessionSection,
}

impl RecorderConfig {
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, MetadataError> {
        let config: RecorderConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Validate the configuration and resolve every address in it.
    /// The presence of `multicast-interface` alone selects the transport.
    pub fn resolve(&self) -> Result<SessionConfig, MetadataError> {
        SessionConfig::resolve(&self.session)
    }
}
