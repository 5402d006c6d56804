use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use scrapegate::{GatewayConfig, LegalityConfig, SecretString};
use std::env;
use std::path::PathBuf;

use crate::server::middleware::TrustedProxies;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    pub admin_api_key: SecretString,
    pub static_blacklist: Option<Vec<String>>,
    pub robots_user_agent: Option<String>,
    pub allowed_origins: Vec<String>,

    /// Peers allowed to set X-Forwarded-For / X-Real-IP
    pub trusted_proxies: TrustedProxies,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let admin_api_key = lookup("ADMIN_API_KEY").context("ADMIN_API_KEY must be set")?;
        if admin_api_key.trim().is_empty() {
            bail!("ADMIN_API_KEY must not be empty");
        }

        let trusted_proxies = match lookup("TRUSTED_PROXIES") {
            Some(list) => TrustedProxies::parse(&split_list(&list))
                .map_err(anyhow::Error::msg)
                .context("TRUSTED_PROXIES must list IP addresses or CIDR blocks")?,
            None => TrustedProxies::default(),
        };

        Ok(Self {
            port: lookup("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            data_dir: lookup("DATA_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            admin_api_key: SecretString::new(admin_api_key),
            static_blacklist: lookup("STATIC_BLACKLIST").map(|list| split_list(&list)),
            robots_user_agent: lookup("ROBOTS_USER_AGENT").filter(|ua| !ua.trim().is_empty()),
            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|list| split_list(&list))
                .unwrap_or_default(),
            trusted_proxies,
        })
    }

    /// Gateway configuration with environment overrides applied.
    pub fn gateway_config(&self) -> GatewayConfig {
        let mut legality = LegalityConfig::default();
        if let Some(domains) = &self.static_blacklist {
            legality = legality.with_static_blacklist(domains.iter().cloned());
        }
        if let Some(user_agent) = &self.robots_user_agent {
            legality.user_agent = user_agent.clone();
        }

        GatewayConfig::default().with_legality(legality)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
