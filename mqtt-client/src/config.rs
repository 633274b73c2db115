use std::{fs::File, io::Read as _, path::Path};

use bytes::Bytes;
use mqtt_core::qos::QosLevel;
use serde::Deserialize;

/// A will message, populated into the CONNECT variable header/payload when configured.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct WillConfig {
    pub topic: String,
    pub message: String,
    #[serde(default)]
    pub qos: u8,
    #[serde(default)]
    pub retain: bool,
}

#[derive(Deserialize, Clone, Debug, Default)]
struct Credentials {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ClientConfig {
    host: String,
    port: u16,
    client_id: String,
    #[serde(default = "default_true")]
    clean_session: bool,
    #[serde(default)]
    keep_alive: Option<u16>,
    #[serde(default)]
    connect_timeout: Option<u64>,
    #[serde(default)]
    reconnect_period: Option<u64>,
    #[serde(default)]
    will: Option<WillConfig>,
    #[serde(default)]
    credentials: Credentials,
}

fn default_true() -> bool {
    true
}

impl ClientConfig {
    pub fn builder(client_id: impl Into<String>, host: impl Into<String>, port: u16) -> ClientConfig {
        return ClientConfig {
            host: host.into(),
            port,
            client_id: client_id.into(),
            clean_session: true,
            keep_alive: None,
            connect_timeout: None,
            reconnect_period: None,
            will: None,
            credentials: Credentials::default(),
        };
    }

    pub fn with_clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        return self;
    }

    pub fn with_keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive = Some(seconds);
        return self;
    }

    pub fn with_connect_timeout(mut self, seconds: u64) -> Self {
        self.connect_timeout = Some(seconds);
        return self;
    }

    pub fn with_reconnect_period(mut self, seconds: u64) -> Self {
        self.reconnect_period = Some(seconds);
        return self;
    }

    pub fn with_will(mut self, will: WillConfig) -> Self {
        self.will = Some(will);
        return self;
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.credentials = Credentials {
            username: Some(username.into()),
            password,
        };
        return self;
    }

    pub fn host(&self) -> &str {
        return &self.host;
    }

    pub fn port(&self) -> u16 {
        return self.port;
    }

    pub fn addr(&self) -> String {
        return format!("{}:{}", self.host, self.port);
    }

    pub fn client_id(&self) -> &str {
        return &self.client_id;
    }

    pub fn clean_session(&self) -> bool {
        return self.clean_session;
    }

    pub fn keep_alive(&self) -> Option<u16> {
        return self.keep_alive;
    }

    pub fn connect_timeout(&self) -> Option<u64> {
        return self.connect_timeout;
    }

    pub fn reconnect_period(&self) -> Option<u64> {
        return self.reconnect_period;
    }

    pub fn will(&self) -> Option<&WillConfig> {
        return self.will.as_ref();
    }

    pub fn username(&self) -> Option<&str> {
        return self.credentials.username.as_deref();
    }

    pub fn password(&self) -> Option<Bytes> {
        return self.credentials.password.as_ref().map(|p| Bytes::from(p.clone().into_bytes()));
    }
}

impl WillConfig {
    pub fn qos(&self) -> Result<QosLevel, mqtt_core::err::DecodeError> {
        return QosLevel::try_from(self.qos);
    }
}

impl ClientConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        return toml::from_str(raw);
    }
}

impl TryFrom<&Path> for ClientConfig {
    type Error = toml::de::Error;

    fn try_from(path: &Path) -> Result<Self, Self::Error> {
        let mut file = File::open(path).unwrap_or_else(|err| {
            panic!("could not open config file {}: {err}", path.display());
        });

        let mut raw = String::new();
        file.read_to_string(&mut raw)
            .unwrap_or_else(|err| panic!("could not read config file {}: {err}", path.display()));

        return Self::from_toml_str(&raw);
    }
}

#[cfg(test)]
mod config {
    use super::ClientConfig;

    #[test]
    fn parses_minimal_toml() {
        let raw = r#"
            host = "broker.local"
            port = 1883
            client_id = "test-client"
        "#;

        let config = ClientConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.host(), "broker.local");
        assert_eq!(config.port(), 1883);
        assert!(config.clean_session());
        assert_eq!(config.keep_alive(), None);
    }

    #[test]
    fn builder_round_trip() {
        let config = ClientConfig::builder("builder-client", "localhost", 1883)
            .with_keep_alive(30)
            .with_connect_timeout(5)
            .with_reconnect_period(10)
            .with_credentials("user", Some(String::from("pass")));

        assert_eq!(config.keep_alive(), Some(30));
        assert_eq!(config.connect_timeout(), Some(5));
        assert_eq!(config.reconnect_period(), Some(10));
        assert_eq!(config.username(), Some("user"));
    }
}
