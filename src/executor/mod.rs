//! Request executors: the capability the dispatcher drives, plus the
//! options it hands through to them untouched.

pub mod browser;
pub mod http;

use std::fmt;

use async_trait::async_trait;
use rand::Rng;

use crate::error::{ConfigError, ExecutionError};

pub use browser::{BrowserExecutor, BrowserSettings};
pub use http::{HttpExecutor, HttpSettings};

/// Performs one request attempt.
///
/// Implementations enforce their own timeout and resolve it to
/// `ExecutionError::Timeout`. `Ok` carries the response status code.
#[async_trait]
pub trait RequestExecutor: Send + Sync + 'static {
    async fn execute(
        &self,
        target: &str,
        options: &RequestOptions,
        sequence: u64,
    ) -> Result<u16, ExecutionError>;
}

/// Executor-specific options, passed through the dispatcher unmodified.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub proxy: Option<ProxyRotation>,
}

impl RequestOptions {
    /// Pick the proxy for a given attempt, if proxies are enabled.
    ///
    /// With random selection every call picks again, so an executor calls
    /// this once per attempt and routes the whole attempt through the result.
    pub fn proxy_for(&self, sequence: u64) -> Option<ProxyRoute<'_>> {
        self.proxy.as_ref().map(|rotation| ProxyRoute {
            url: rotation.select(sequence),
            credentials: rotation.credentials(),
        })
    }
}

/// The proxy one attempt goes through.
#[derive(Debug, Clone, Copy)]
pub struct ProxyRoute<'a> {
    pub url: &'a str,
    pub credentials: Option<&'a ProxyCredentials>,
}

impl ProxyRoute<'_> {
    pub(crate) fn to_reqwest(&self) -> Result<reqwest::Proxy, ExecutionError> {
        let mut proxy = reqwest::Proxy::all(self.url)?;
        if let Some(creds) = self.credentials {
            proxy = proxy.basic_auth(&creds.username, &creds.password);
        }
        Ok(proxy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ProxySelection {
    /// attempt `i` uses proxy `i % len`
    #[default]
    RoundRobin,
    Random,
}

#[derive(Clone)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A fixed pool of proxies and how to pick one per attempt.
#[derive(Debug, Clone)]
pub struct ProxyRotation {
    proxies: Vec<String>,
    credentials: Option<ProxyCredentials>,
    selection: ProxySelection,
}

impl ProxyRotation {
    pub fn new(
        proxies: Vec<String>,
        credentials: Option<ProxyCredentials>,
        selection: ProxySelection,
    ) -> Result<Self, ConfigError> {
        let proxies: Vec<String> = proxies
            .into_iter()
            .map(|p| p.trim().to_owned())
            .filter(|p| !p.is_empty())
            .collect();
        if proxies.is_empty() {
            return Err(ConfigError::NoProxies);
        }
        for proxy in &proxies {
            reqwest::Proxy::all(proxy.as_str()).map_err(|e| ConfigError::InvalidProxy {
                proxy: proxy.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(Self {
            proxies,
            credentials,
            selection,
        })
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn credentials(&self) -> Option<&ProxyCredentials> {
        self.credentials.as_ref()
    }

    pub fn select(&self, sequence: u64) -> &str {
        let idx = match self.selection {
            ProxySelection::RoundRobin => (sequence % self.proxies.len() as u64) as usize,
            ProxySelection::Random => rand::thread_rng().gen_range(0..self.proxies.len()),
        };
        &self.proxies[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotation(selection: ProxySelection) -> ProxyRotation {
        ProxyRotation::new(
            vec![
                "http://10.0.0.1:8080".into(),
                " http://10.0.0.2:8080 ".into(),
                "".into(),
                "http://10.0.0.3:8080".into(),
            ],
            None,
            selection,
        )
        .unwrap()
    }

    #[test]
    fn round_robin_follows_the_sequence_number() {
        let rotation = rotation(ProxySelection::RoundRobin);
        assert_eq!(rotation.len(), 3);
        assert_eq!(rotation.select(0), "http://10.0.0.1:8080");
        assert_eq!(rotation.select(1), "http://10.0.0.2:8080");
        assert_eq!(rotation.select(5), "http://10.0.0.3:8080");
        assert_eq!(rotation.select(6), "http://10.0.0.1:8080");
    }

    #[test]
    fn random_selection_stays_within_the_pool() {
        let rotation = rotation(ProxySelection::Random);
        for seq in 0..50 {
            assert!(rotation.proxies.iter().any(|p| p == rotation.select(seq)));
        }
    }

    #[test]
    fn empty_pool_is_rejected() {
        let err = ProxyRotation::new(vec![" ".into()], None, ProxySelection::RoundRobin).unwrap_err();
        assert_eq!(err, ConfigError::NoProxies);
    }

    #[test]
    fn credentials_are_redacted_in_debug_output() {
        let creds = ProxyCredentials {
            username: "bot".into(),
            password: "hunter2".into(),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("bot"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn options_without_proxies_go_direct() {
        let options = RequestOptions::default();
        assert!(options.proxy_for(3).is_none());
    }

    #[test]
    fn route_carries_the_shared_credentials() {
        let options = RequestOptions {
            proxy: Some(
                ProxyRotation::new(
                    vec!["http://10.0.0.9:3128".into()],
                    Some(ProxyCredentials {
                        username: "bot".into(),
                        password: "hunter2".into(),
                    }),
                    ProxySelection::Random,
                )
                .unwrap(),
            ),
        };

        let route = options.proxy_for(7).unwrap();
        assert_eq!(route.url, "http://10.0.0.9:3128");
        assert_eq!(route.credentials.map(|c| c.username.as_str()), Some("bot"));
        assert!(route.to_reqwest().is_ok());
    }
}
