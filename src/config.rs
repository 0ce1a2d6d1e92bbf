use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::dispatch::DispatchConfig;
use crate::error::ConfigError;
use crate::executor::{
    BrowserSettings, HttpSettings, ProxyCredentials, ProxyRotation, ProxySelection, RequestOptions,
};

/// Which request executor drives the attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutorMode {
    /// plain GET with a shared connection pool
    Http,
    /// browser-like visit with a fresh session per attempt
    Browser,
}

/// CLI arguments. Every option can also come from the environment or `.env`.
#[derive(Debug, Clone, Parser)]
#[command(name = "loadbot", version, about, long_about = None)]
pub struct Args {
    /// Target URL
    #[arg(short = 'u', long, env = "TARGET_URL")]
    pub url: String,

    /// Total number of requests
    #[arg(short = 'n', long = "requests", env = "TOTAL_REQUESTS", default_value_t = 60)]
    pub total: u64,

    /// Maximum requests in flight
    #[arg(short = 'c', long, env = "CONCURRENCY", default_value_t = 5)]
    pub concurrency: usize,

    /// Rate limit (requests per second)
    #[arg(short = 'r', long, env = "RATE_LIMIT", default_value_t = 5.0)]
    pub rate: f64,

    /// Tokens the rate limiter may bank while idle
    #[arg(long, env = "RATE_BURST", default_value_t = 1)]
    pub burst: u32,

    #[arg(long, value_enum, env = "EXECUTOR", default_value_t = ExecutorMode::Http)]
    pub mode: ExecutorMode,

    /// Per-request timeout, e.g. `10s` or `1500ms`
    #[arg(long, env = "REQUEST_TIMEOUT", value_parser = humantime::parse_duration, default_value = "10s")]
    pub timeout: Duration,

    /// Status code counted as a success
    #[arg(long, default_value_t = 200)]
    pub expect_status: u16,

    /// Browser mode: text the page must contain, empty to skip the check
    #[arg(long, env = "EXPECT_TEXT", default_value = "Destination")]
    pub expect_text: String,

    /// Use proxy if available
    #[arg(short = 'p', long = "proxy", default_value_t = false)]
    pub use_proxy: bool,

    /// Comma separated proxy URLs
    #[arg(long, env = "PROXIES", value_delimiter = ',')]
    pub proxies: Vec<String>,

    #[arg(long, env = "PROXY_USER")]
    pub proxy_user: Option<String>,

    #[arg(long, env = "PROXY_PASS", hide_env_values = true)]
    pub proxy_pass: Option<String>,

    #[arg(long, value_enum, default_value_t = ProxySelection::RoundRobin)]
    pub proxy_selection: ProxySelection,

    /// Print the summary as JSON on stdout
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Serve live metrics on this address while the run is in progress
    #[arg(long, env = "METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    /// debug logging as default instead of Info; use RUST_LOG env for more options
    #[arg(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
}

impl Args {
    pub fn dispatch_config(&self) -> Result<DispatchConfig, ConfigError> {
        let url = reqwest::Url::parse(&self.url).map_err(|e| ConfigError::InvalidTarget {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidTarget {
                url: self.url.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }

        Ok(DispatchConfig {
            total: self.total,
            concurrency: self.concurrency,
            rate: self.rate,
            burst: self.burst,
            target: url.into(),
        })
    }

    /// Proxy settings for the executor. Asking for proxies without any
    /// configured falls back to a direct connection.
    pub fn request_options(&self) -> Result<RequestOptions, ConfigError> {
        if !self.use_proxy {
            return Ok(RequestOptions::default());
        }

        let credentials = match (&self.proxy_user, &self.proxy_pass) {
            (Some(username), Some(password)) => Some(ProxyCredentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        match ProxyRotation::new(self.proxies.clone(), credentials, self.proxy_selection) {
            Ok(rotation) => {
                tracing::info!(proxies = rotation.len(), selection = ?self.proxy_selection, "proxy rotation enabled");
                Ok(RequestOptions {
                    proxy: Some(rotation),
                })
            }
            Err(ConfigError::NoProxies) => {
                tracing::warn!("proxy requested but PROXIES is empty; using direct connection");
                Ok(RequestOptions::default())
            }
            Err(err) => Err(err),
        }
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: self.timeout,
            expect_status: self.expect_status,
        }
    }

    pub fn browser_settings(&self) -> BrowserSettings {
        BrowserSettings {
            timeout: self.timeout,
            expect_status: self.expect_status,
            expect_text: Some(self.expect_text.clone()).filter(|text| !text.is_empty()),
        }
    }
}
