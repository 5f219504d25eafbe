// common/src/config.rs
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use config::{Config as ConfigFile, File, Environment};

/// Central configuration for the relay server and its clients
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address of the HTTP application (webhook, health)
    pub http_addr: String,
    /// Dedicated address for WebSocket upgrades
    pub ws_addr: String,
    pub ws_path: String,

    pub endpoints: EndpointsConfig,
    pub reconnect: ReconnectConfig,
    pub heartbeat: HeartbeatConfig,
}

/// Public URLs, resolved differently for server-side and browser-side callers
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub server_base_url: String,
    pub server_ws_url: String,
    pub browser_base_url: String,
    pub browser_ws_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_interval_ms: u64,
    pub max_attempts: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

/// Which side of the deployment is asking for an endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Server,
    Browser,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:3000".to_string(),
            ws_addr: "127.0.0.1:3001".to_string(),
            ws_path: "/ws".to_string(),
            endpoints: EndpointsConfig::default(),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            server_base_url: "http://backend:4000".to_string(),
            server_ws_url: "ws://backend:4000/ws".to_string(),
            browser_base_url: "http://localhost:4000".to_string(),
            browser_ws_url: "ws://localhost:3001/ws".to_string(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 2000,
            max_attempts: 5,
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            timeout_secs: 30,
        }
    }
}

impl ReconnectConfig {
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        // Get the run mode, defaulting to "development"
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        // Locate the config directory
        let config_dir = env::var("CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                // Check if we're in the project root or a subcrate
                let mut path = PathBuf::from("./config");
                if !path.exists() {
                    path = PathBuf::from("../config");
                }
                path
            });

        tracing::info!("Loading configuration from {}", config_dir.display());
        tracing::info!("Using run mode: {}", run_mode);

        let mut config: Config = ConfigFile::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", run_mode))).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // e.g. RELAY__RECONNECT__MAX_ATTEMPTS=10
            .add_source(Environment::with_prefix("RELAY").separator("__"))
            .build()?
            .try_deserialize()?;

        config.apply_deployment_env();
        Ok(config)
    }

    /// Load configuration, falling back to defaults plus deployment variables
    pub fn from_env() -> Self {
        match Self::load() {
            Ok(config) => {
                tracing::info!("Configuration loaded from files and environment");
                config
            },
            Err(e) => {
                tracing::warn!("Failed to load configuration from files: {}", e);
                tracing::info!("Falling back to environment variables only");

                let mut config = Self::default();
                config.apply_deployment_env();
                config
            }
        }
    }

    /// Honour the variable names used by the existing deployment
    fn apply_deployment_env(&mut self) {
        let host = env::var("HOSTNAME").ok();
        let (default_host, _) = split_addr(&self.http_addr);
        let host = host.unwrap_or(default_host);

        if let Ok(port) = env::var("PORT") {
            self.http_addr = format!("{}:{}", host, port);
        }

        if let Ok(ws_port) = env::var("WS_PORT") {
            self.ws_addr = format!("{}:{}", host, ws_port);
        }

        if let Ok(url) = env::var("BACKEND_URL") {
            self.endpoints.server_base_url = url;
        }

        if let Ok(url) = env::var("NEXT_PUBLIC_BACKEND_URL") {
            self.endpoints.browser_base_url = url;
        }

        if let Ok(url) = env::var("NEXT_PUBLIC_WS_URL") {
            self.endpoints.browser_ws_url = url;
        }
    }

    pub fn base_url(&self, side: Side) -> &str {
        match side {
            Side::Server => &self.endpoints.server_base_url,
            Side::Browser => &self.endpoints.browser_base_url,
        }
    }

    pub fn ws_url(&self, side: Side) -> &str {
        match side {
            Side::Server => &self.endpoints.server_ws_url,
            Side::Browser => &self.endpoints.browser_ws_url,
        }
    }

    pub fn webhook_url(&self, side: Side) -> String {
        join_url(self.base_url(side), "/api/webhook")
    }

    pub fn health_url(&self, side: Side) -> String {
        join_url(self.base_url(side), "/health")
    }
}

fn split_addr(addr: &str) -> (String, Option<String>) {
    match addr.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), Some(port.to_string())),
        None => (addr.to_string(), None),
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}
