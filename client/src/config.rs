//! Configuration for pfurl
//!
//! Settings come from three layers: command-line flags, an optional
//! pfurl.yml file, and built-in defaults, in that order of precedence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use pfurl_shared::protocol::Message;
use pfurl_shared::response::{Indent, ResponseMode};
use pfurl_shared::Error;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::exchange::{parse_proxy, parse_target, BasicAuth, BearerToken, ExchangeConfig};
use crate::Cli;

/// Optional pfurl.yml contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Address of the remote service
    pub http: Option<String>,

    /// REST verb
    pub verb: Option<String>,

    pub http_proxy: Option<String>,

    /// `user:password`
    pub auth: Option<String>,

    pub auth_token: Option<String>,

    pub json_wrapper: Option<String>,

    pub content_type: Option<String>,

    pub timeout_secs: Option<u64>,

    pub unverified_certs: bool,

    pub json_pprint_indent: Option<i64>,
}

fn default_http() -> String {
    "localhost:5055".to_string()
}

fn default_verb() -> String {
    "POST".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl FileConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: FileConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Search for config file in standard locations
    pub fn find_config() -> Option<PathBuf> {
        let candidates = ["pfurl.yml", "pfurl.yaml", ".pfurl.yml", ".pfurl.yaml"];

        // Check current directory
        for name in &candidates {
            let path = PathBuf::from(name);
            if path.exists() {
                return Some(path);
            }
        }

        // Check home directory
        if let Some(home) = dirs::home_dir() {
            for name in &candidates {
                let path = home.join(name);
                if path.exists() {
                    return Some(path);
                }
            }
        }

        None
    }
}

/// Validated configuration for one invocation
#[derive(Debug, Clone)]
pub struct Settings {
    pub exchange: ExchangeConfig,
    pub message: Message,
    pub json_wrapper: Option<String>,
    pub mode: ResponseMode,
    pub indent: Option<Indent>,
    pub one_shot: bool,
}

impl Settings {
    /// Merge flags over the config file and validate the result.
    pub fn resolve(cli: &Cli, file: FileConfig) -> pfurl_shared::Result<Self> {
        let indent = cli
            .json_pprint_indent
            .or(file.json_pprint_indent)
            .map(Indent::new)
            .transpose()?;

        let verb = cli.verb.clone().or(file.verb).unwrap_or_else(default_verb);
        let verb = Method::from_bytes(verb.trim().to_uppercase().as_bytes())
            .map_err(|_| Error::InvalidVerb(verb.clone()))?;

        let url = parse_target(&cli.http.clone().or(file.http).unwrap_or_else(default_http))?;

        let proxy = cli
            .http_proxy
            .as_deref()
            .or(file.http_proxy.as_deref())
            .map(parse_proxy)
            .transpose()?;

        let timeout = Duration::from_secs(
            cli.timeout
                .or(file.timeout_secs)
                .unwrap_or_else(default_timeout_secs),
        );

        let mut exchange = ExchangeConfig::new(verb, url);
        exchange.proxy = proxy;
        exchange.timeout = timeout;
        exchange.auth = cli.auth.as_deref().or(file.auth.as_deref()).map(BasicAuth::parse);
        exchange.auth_token = cli.auth_token.clone().or(file.auth_token).map(BearerToken);
        if let Some(content_type) = cli.content_type.clone().or(file.content_type) {
            exchange.content_type = content_type;
        }
        exchange.verify_certs = !(cli.unverified_certs || file.unverified_certs);

        Ok(Self {
            exchange,
            message: Message::parse(cli.msg.as_deref()),
            json_wrapper: cli.json_wrapper.clone().or(file.json_wrapper),
            mode: ResponseMode::from_flags(cli.raw, cli.http_response_body_parse),
            indent,
            one_shot: cli.one_shot,
        })
    }
}
