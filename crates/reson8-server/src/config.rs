use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sfu: SfuConfig,
    #[serde(default)]
    pub turn: TurnConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    #[serde(default = "default_server_name")]
    pub name: String,
    #[serde(default = "default_max_clients")]
    pub max_clients: i64,
    /// Seed default channels and roles on startup (opt-in).
    #[serde(default)]
    pub seed_template: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4848".into(),
            name: default_server_name(),
            max_clients: default_max_clients(),
            seed_template: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/reson8.db?mode=rwc".into(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SfuConfig {
    /// Public IP advertised in ICE candidates.
    #[serde(default = "default_announced_ip")]
    pub announced_ip: String,
    #[serde(default = "default_rtc_min_port")]
    pub rtc_min_port: u16,
    #[serde(default = "default_rtc_max_port")]
    pub rtc_max_port: u16,
    /// Worker count; 0 means one per logical CPU.
    #[serde(default)]
    pub workers: usize,
}

impl Default for SfuConfig {
    fn default() -> Self {
        Self {
            announced_ip: default_announced_ip(),
            rtc_min_port: default_rtc_min_port(),
            rtc_max_port: default_rtc_max_port(),
            workers: 0,
        }
    }
}

/// Optional relay credentials returned to clients during transport creation.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TurnConfig {
    pub url: Option<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PresenceConfig {
    #[serde(default = "default_presence_ttl")]
    pub ttl_seconds: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_presence_ttl(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AdminConfig {
    /// A client connecting with this installation id is auto-assigned the
    /// admin role on join.
    pub instance_id: Option<String>,
}

fn default_server_name() -> String {
    "Reson8".into()
}
fn default_max_clients() -> i64 {
    64
}
fn default_max_connections() -> u32 {
    10
}
fn default_announced_ip() -> String {
    "127.0.0.1".into()
}
fn default_rtc_min_port() -> u16 {
    40000
}
fn default_rtc_max_port() -> u16 {
    49999
}
fn default_presence_ttl() -> u64 {
    3600
}
fn default_sweep_interval() -> u64 {
    60
}

/// Generate a commented config file template with the given values filled in.
fn generate_config_template(config: &Config) -> String {
    format!(
        r#"# Reson8 Server Configuration
# Generated automatically on first run. Edit as needed.

[server]
bind_address = "{bind_address}"
name = "{name}"
max_clients = {max_clients}
# Seed default channels and roles on first startup.
seed_template = {seed_template}

[database]
url = "{db_url}"
max_connections = {max_connections}

[sfu]
# Public IP advertised in ICE candidates.
announced_ip = "{announced_ip}"
rtc_min_port = {rtc_min_port}
rtc_max_port = {rtc_max_port}
# Worker count; 0 = one per logical CPU.
workers = {workers}

[turn]
# Optional TURN relay credentials returned to clients:
# url = "turn:turn.example.com:3478"
# username = "reson8"
# credential = "secret"

[presence]
ttl_seconds = {presence_ttl}
sweep_interval_seconds = {sweep_interval}

[admin]
# Installation id auto-assigned the admin role on join:
# instance_id = "your-installation-id"
"#,
        bind_address = config.server.bind_address,
        name = config.server.name,
        max_clients = config.server.max_clients,
        seed_template = config.server.seed_template,
        db_url = config.database.url,
        max_connections = config.database.max_connections,
        announced_ip = config.sfu.announced_ip,
        rtc_min_port = config.sfu.rtc_min_port,
        rtc_max_port = config.sfu.rtc_max_port,
        workers = config.sfu.workers,
        presence_ttl = config.presence.ttl_seconds,
        sweep_interval = config.presence.sweep_interval_seconds,
    )
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::info!("Config file not found at '{}', generating defaults...", path);
            let config = Config::default();
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::write(path, generate_config_template(&config))?;
            tracing::info!("Generated default config at '{}'", path);
            config
        };

        // Environment variable overrides.
        if let Ok(value) = std::env::var("RESON8_BIND_ADDRESS") {
            config.server.bind_address = value;
        }
        if let Ok(value) = std::env::var("RESON8_SERVER_NAME") {
            config.server.name = value;
        }
        if let Ok(value) = std::env::var("RESON8_MAX_CLIENTS") {
            if let Ok(parsed) = value.parse::<i64>() {
                config.server.max_clients = parsed;
            }
        }
        if let Ok(value) = std::env::var("RESON8_SEED_TEMPLATE") {
            if let Ok(parsed) = value.parse::<bool>() {
                config.server.seed_template = parsed;
            }
        }
        if let Ok(value) = std::env::var("RESON8_DATABASE_URL") {
            config.database.url = value;
        }
        if let Ok(value) = std::env::var("RESON8_DATABASE_MAX_CONNECTIONS") {
            if let Ok(parsed) = value.parse::<u32>() {
                config.database.max_connections = parsed;
            }
        }
        if let Ok(value) = std::env::var("RESON8_SFU_ANNOUNCED_IP") {
            config.sfu.announced_ip = value;
        }
        if let Ok(value) = std::env::var("RESON8_SFU_RTC_MIN_PORT") {
            if let Ok(parsed) = value.parse::<u16>() {
                config.sfu.rtc_min_port = parsed;
            }
        }
        if let Ok(value) = std::env::var("RESON8_SFU_RTC_MAX_PORT") {
            if let Ok(parsed) = value.parse::<u16>() {
                config.sfu.rtc_max_port = parsed;
            }
        }
        if let Ok(value) = std::env::var("RESON8_SFU_WORKERS") {
            if let Ok(parsed) = value.parse::<usize>() {
                config.sfu.workers = parsed;
            }
        }
        if let Ok(value) = std::env::var("RESON8_TURN_URL") {
            config.turn.url = Some(value);
        }
        if let Ok(value) = std::env::var("RESON8_TURN_USERNAME") {
            config.turn.username = Some(value);
        }
        if let Ok(value) = std::env::var("RESON8_TURN_CREDENTIAL") {
            config.turn.credential = Some(value);
        }
        if let Ok(value) = std::env::var("RESON8_PRESENCE_TTL_SECONDS") {
            if let Ok(parsed) = value.parse::<u64>() {
                config.presence.ttl_seconds = parsed.max(60);
            }
        }
        if let Ok(value) = std::env::var("RESON8_ADMIN_INSTANCE_ID") {
            config.admin.instance_id = if value.trim().is_empty() {
                None
            } else {
                Some(value)
            };
        }

        if config.sfu.rtc_min_port >= config.sfu.rtc_max_port {
            anyhow::bail!(
                "Invalid sfu port range: rtc_min_port {} must be below rtc_max_port {}",
                config.sfu.rtc_min_port,
                config.sfu.rtc_max_port
            );
        }
        Ok(config)
    }

    /// The three TURN fields are all-or-nothing.
    pub fn turn_credentials(&self) -> Option<reson8_core::TurnCredentials> {
        match (&self.turn.url, &self.turn.username, &self.turn.credential) {
            (Some(url), Some(username), Some(credential)) => {
                Some(reson8_core::TurnCredentials {
                    url: url.clone(),
                    username: username.clone(),
                    credential: credential.clone(),
                })
            }
            _ => None,
        }
    }
}
