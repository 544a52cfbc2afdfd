use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LivenessError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("liveness request timed out")]
    TimedOut,
}

/// Issues one liveness request and reports the HTTP status code.
#[async_trait]
pub trait LivenessClient: Send + Sync {
    async fn get(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<u16, LivenessError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestLivenessClient {
    client: reqwest::Client,
}

impl ReqwestLivenessClient {
    pub fn new(connect_timeout: Duration) -> Result<Self, LivenessError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| LivenessError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LivenessClient for ReqwestLivenessClient {
    async fn get(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<u16, LivenessError> {
        let res = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LivenessError::TimedOut
                } else {
                    LivenessError::Transport(e.to_string())
                }
            })?;
        Ok(res.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn reports_status_codes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/liveness"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/starting"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client =
            ReqwestLivenessClient::new(Duration::from_secs(1)).unwrap();
        let ok = client
            .get(
                &format!("{}/api/liveness", server.uri()),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(ok, 200);
        let starting = client
            .get(&format!("{}/starting", server.uri()), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(starting, 503);
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;
        let client =
            ReqwestLivenessClient::new(Duration::from_secs(1)).unwrap();
        let err = client
            .get(&server.uri(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, LivenessError::TimedOut));
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        let client =
            ReqwestLivenessClient::new(Duration::from_millis(200)).unwrap();
        let err = client
            .get("http://127.0.0.1:1/", Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, LivenessError::Transport(_)));
    }
}
