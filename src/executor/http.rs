use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;

use super::{ProxyRoute, RequestExecutor, RequestOptions};
use crate::error::ExecutionError;

#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Whole-request timeout, body included.
    pub timeout: Duration,
    /// The only status counted as a success.
    pub expect_status: u16,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            expect_status: 200,
        }
    }
}

/// Plain GET executor.
///
/// One pooled client is shared by every direct attempt; proxied attempts get
/// one pooled client per proxy, built on first use.
pub struct HttpExecutor {
    settings: HttpSettings,
    direct: Client,
    proxied: Mutex<HashMap<String, Client>>,
}

impl HttpExecutor {
    pub fn new(settings: HttpSettings) -> Result<Self, reqwest::Error> {
        let direct = Client::builder()
            .timeout(settings.timeout)
            .no_proxy()
            .build()?;
        Ok(Self {
            settings,
            direct,
            proxied: Mutex::new(HashMap::new()),
        })
    }

    fn client_for(&self, route: Option<ProxyRoute<'_>>) -> Result<Client, ExecutionError> {
        let Some(route) = route else {
            return Ok(self.direct.clone());
        };

        let mut proxied = self.proxied.lock();
        if let Some(client) = proxied.get(route.url) {
            return Ok(client.clone());
        }

        // proxies come from RequestOptions only, never from the environment
        let client = Client::builder()
            .timeout(self.settings.timeout)
            .no_proxy()
            .proxy(route.to_reqwest()?)
            .build()?;
        proxied.insert(route.url.to_owned(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl RequestExecutor for HttpExecutor {
    async fn execute(
        &self,
        target: &str,
        options: &RequestOptions,
        sequence: u64,
    ) -> Result<u16, ExecutionError> {
        let route = options.proxy_for(sequence);
        let client = self.client_for(route)?;
        let response = client.get(target).send().await?;
        let status = response.status().as_u16();

        // Read the body so latency covers the full response.
        let body = response.bytes().await?;
        tracing::debug!(
            sequence,
            status,
            bytes = body.len(),
            via = route.map_or("direct", |r| r.url),
            "response received"
        );

        if status != self.settings.expect_status {
            return Err(ExecutionError::Status(status));
        }
        Ok(status)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::error::FailureKind;
    use crate::executor::{ProxyCredentials, ProxyRotation, ProxySelection};

    fn executor(timeout: Duration) -> HttpExecutor {
        HttpExecutor::new(HttpSettings {
            timeout,
            expect_status: 200,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn expected_status_is_a_success() {
        let addr = test_server::spawn().await;
        let status = executor(Duration::from_secs(5))
            .execute(&format!("http://{addr}/ok"), &RequestOptions::default(), 0)
            .await
            .unwrap();
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn other_statuses_are_failures() {
        let addr = test_server::spawn().await;
        let err = executor(Duration::from_secs(5))
            .execute(&format!("http://{addr}/missing"), &RequestOptions::default(), 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Status(404));
    }

    #[tokio::test]
    async fn slow_responses_time_out() {
        let addr = test_server::spawn().await;
        let err = executor(Duration::from_millis(200))
            .execute(&format!("http://{addr}/slow"), &RequestOptions::default(), 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Timeout);
    }

    #[tokio::test]
    async fn random_selection_routes_each_attempt_through_its_pick() {
        let a = test_server::spawn_proxy("A").await;
        let b = test_server::spawn_proxy("B").await;
        let labels = HashMap::from([(format!("http://{a}"), "A"), (format!("http://{b}"), "B")]);
        let options = RequestOptions {
            proxy: Some(
                ProxyRotation::new(
                    labels.keys().cloned().collect(),
                    Some(ProxyCredentials {
                        username: "bot".into(),
                        password: "secret".into(),
                    }),
                    ProxySelection::Random,
                )
                .unwrap(),
            ),
        };
        let executor = executor(Duration::from_secs(5));

        let mut used = HashSet::new();
        for sequence in 0..40 {
            let route = options.proxy_for(sequence).unwrap();
            let body = executor
                .client_for(Some(route))
                .unwrap()
                .get("http://target.test/ok")
                .send()
                .await
                .unwrap()
                .text()
                .await
                .unwrap();

            let expected = labels[route.url];
            assert!(
                body.starts_with(&format!("proxy {expected} ")),
                "{} answered {body:?}",
                route.url
            );
            assert!(body.contains("auth=Basic "), "{body:?}");
            used.insert(expected);
        }
        assert_eq!(used.len(), 2);
        assert_eq!(executor.proxied.lock().len(), 2);
    }

    #[tokio::test]
    async fn proxied_attempts_reach_the_target_through_the_pool() {
        let a = test_server::spawn_proxy("A").await;
        let options = RequestOptions {
            proxy: Some(
                ProxyRotation::new(vec![format!("http://{a}")], None, ProxySelection::RoundRobin)
                    .unwrap(),
            ),
        };

        let status = executor(Duration::from_secs(5))
            .execute("http://target.test/anything", &options, 3)
            .await
            .unwrap();
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn refused_connections_are_failures() {
        let addr = test_server::closed_addr().await;
        let err = executor(Duration::from_secs(5))
            .execute(&format!("http://{addr}/"), &RequestOptions::default(), 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err.kind(),
            FailureKind::Connect | FailureKind::Transport
        ));
    }
}
