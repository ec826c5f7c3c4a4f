use figment::providers::Env;
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Top-level configuration for the Bakery daemon, loaded entirely from
/// environment variables (see spec §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BakeryConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_host_suffix")]
    pub host_suffix: String,

    #[serde(default = "default_port_range_start")]
    pub port_range_start: u16,

    #[serde(default = "default_port_range_end")]
    pub port_range_end: u16,

    /// Resolved separately from the raw `BAKERY_ROUTER_PORTS` env var (see
    /// `parse_router_ports`) rather than through Figment's struct
    /// extraction, since it needs bespoke invalid-token discarding.
    #[serde(default = "default_router_ports", skip_deserializing)]
    pub router_ports: Vec<u16>,
}

impl Default for BakeryConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            host_suffix: default_host_suffix(),
            port_range_start: default_port_range_start(),
            port_range_end: default_port_range_end(),
            router_ports: default_router_ports(),
        }
    }
}

impl BakeryConfig {
    /// Load configuration from `BAKERY_*` environment variables, falling
    /// back to defaults for anything unset. Numeric fields that fail to
    /// parse as integers abort startup with a clear error, per spec §6.
    pub fn load() -> anyhow::Result<Self> {
        let figment = Figment::from(figment::providers::Serialized::defaults(
            BakeryConfig::default(),
        ))
        .merge(Env::prefixed("BAKERY_"));
        let mut config: Self = figment.extract()?;

        config.router_ports = match std::env::var("BAKERY_ROUTER_PORTS") {
            Ok(raw) => Self::parse_router_ports(&raw),
            Err(_) => default_router_ports(),
        };
        Ok(config)
    }

    /// Resolve `BAKERY_ROUTER_PORTS` from the raw environment string,
    /// discarding invalid tokens and falling back to the default list if
    /// every token is invalid.
    pub fn parse_router_ports(raw: &str) -> Vec<u16> {
        let parsed: Vec<u16> = raw
            .split(',')
            .filter_map(|tok| tok.trim().parse::<u16>().ok())
            .collect();
        if parsed.is_empty() {
            default_router_ports()
        } else {
            parsed
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    47123
}

fn default_data_dir() -> String {
    "~/.bakery".to_string()
}

fn default_host_suffix() -> String {
    "localtest.me".to_string()
}

fn default_port_range_start() -> u16 {
    30000
}

fn default_port_range_end() -> u16 {
    45000
}

fn default_router_ports() -> Vec<u16> {
    vec![80, 443, 4080]
}
