use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

/// How an upstream resolver is spoken to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Plain DNS over UDP
    #[default]
    Classic,
    /// DNS-over-HTTPS (RFC 8484 GET)
    Doh,
}

/// A resolver queries may be forwarded to. Value type: rules referencing
/// the same upstream each hold their own copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    /// Host (classic) or full URL (DoH)
    pub address: String,
    pub port: u16,
    pub transport: Transport,
}

/// One `[[upstream]]` block: a target plus the file holding the domains
/// that should be routed to it.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub address: String,
    #[serde(default = "default_dns_port")]
    pub port: u16,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default)]
    pub rules_file: Option<PathBuf>,
}

impl UpstreamConfig {
    pub fn target(&self) -> UpstreamTarget {
        UpstreamTarget {
            address: self.address.clone(),
            port: self.port,
            transport: self.transport,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Status endpoint; disabled when absent
    pub admin_listen: Option<SocketAddr>,
    /// Admission ceiling: requests in flight before new ones are refused
    pub max_clients: usize,
    /// Size of the worker pool executing request pipelines
    pub max_workers: usize,
    /// Number of pooled DoH clients
    pub max_connects: usize,
    /// Response cache capacity in entries
    pub cache_size: usize,
    /// The whole cache is dropped on this period
    pub cache_flush_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: "127.0.0.1:5353".parse().expect("valid literal"),
            admin_listen: None,
            max_clients: 128,
            max_workers: 8,
            max_connects: 4,
            cache_size: 1000,
            cache_flush_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default, rename = "upstream")]
    pub upstreams: Vec<UpstreamConfig>,
    #[serde(default)]
    pub blocklist_file: Option<PathBuf>,
    pub common_upstream: UpstreamConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("error while reading the config file '{}'", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("error while parsing the config file '{}'", path.display()))
    }
}

fn default_dns_port() -> u16 {
    53
}
