//! Optional network validation of a signed token.
//!
//! A single authenticated `GET` against a cheap list endpoint, bounded by a
//! timeout and by the caller's deadline. There is exactly one attempt.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use url::Url;

use crate::key::SignedToken;

/// Request path probed relative to the API base URL.
pub const VALIDATION_PATH: &str = "v1/apps?limit=1";

/// Error type for network validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The request did not complete within the validator's own timeout.
    #[error("network validation timed out after {}ms", after.as_millis())]
    Timeout { after: Duration },

    /// The caller's deadline expired first.
    #[error("network validation canceled: deadline exceeded")]
    Canceled,

    /// The API refused the token.
    #[error("token rejected by API (HTTP {status})")]
    Rejected { status: u16 },

    /// Any other non-success status.
    #[error("unexpected response from API (HTTP {status})")]
    UnexpectedStatus { status: u16 },

    /// Connection-level failure.
    #[error("network error: {message}")]
    Network { message: String },

    /// The base URL cannot be joined with the validation path.
    #[error("invalid API base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Checks a token against the live API.
#[async_trait]
pub trait NetworkValidator: Send + Sync {
    /// Validate `token`. `deadline` is the calling command's deadline, if
    /// it has one; expiring it yields [`ValidationError::Canceled`].
    async fn validate(
        &self,
        token: &SignedToken,
        deadline: Option<Instant>,
    ) -> Result<(), ValidationError>;
}

/// [`NetworkValidator`] over reqwest.
#[derive(Debug, Clone)]
pub struct HttpValidator {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpValidator {
    /// Create a validator for the API at `base_url`.
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self, ValidationError> {
        let endpoint = with_trailing_slash(base_url).join(VALIDATION_PATH)?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("ascauth/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ValidationError::Network {
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    /// The URL that will be requested.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send(&self, token: &SignedToken) -> Result<(), ValidationError> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|e| ValidationError::Network {
                message: e.without_url().to_string(),
            })?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "validation response");
        if status.is_success() {
            Ok(())
        } else if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            Err(ValidationError::Rejected {
                status: status.as_u16(),
            })
        } else {
            Err(ValidationError::UnexpectedStatus {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl NetworkValidator for HttpValidator {
    async fn validate(
        &self,
        token: &SignedToken,
        deadline: Option<Instant>,
    ) -> Result<(), ValidationError> {
        tracing::debug!(endpoint = %self.endpoint, "validating token against API");

        let parent = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = self.send(token) => result,
            _ = tokio::time::sleep(self.timeout) => Err(ValidationError::Timeout { after: self.timeout }),
            _ = parent => Err(ValidationError::Canceled),
        }
    }
}

/// `Url::join` drops the last segment of a base without a trailing slash.
fn with_trailing_slash(base: &Url) -> Url {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{PrivateKey, generate_token, tests::test_key_pem};
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token() -> SignedToken {
        let key = PrivateKey::from_pem(&test_key_pem()).unwrap();
        generate_token("ABC123", "issuer", &key).unwrap()
    }

    fn validator(server: &MockServer, timeout: Duration) -> HttpValidator {
        let base = Url::parse(&server.uri()).unwrap();
        HttpValidator::new(&base, timeout).unwrap()
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let base = Url::parse("https://example.test/api").unwrap();
        let validator = HttpValidator::new(&base, Duration::from_secs(1)).unwrap();
        assert_eq!(
            validator.endpoint().as_str(),
            "https://example.test/api/v1/apps?limit=1"
        );
    }

    #[tokio::test]
    async fn test_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/apps"))
            .and(query_param("limit", "1"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":[]}"#))
            .expect(1)
            .mount(&server)
            .await;

        let result = validator(&server, Duration::from_secs(5))
            .validate(&token(), None)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_unauthorized_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let result = validator(&server, Duration::from_secs(5))
            .validate(&token(), None)
            .await;
        assert!(matches!(result, Err(ValidationError::Rejected { status: 401 })));
    }

    #[tokio::test]
    async fn test_server_error_is_unexpected_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = validator(&server, Duration::from_secs(5))
            .validate(&token(), None)
            .await;
        assert!(matches!(
            result,
            Err(ValidationError::UnexpectedStatus { status: 503 })
        ));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let result = validator(&server, Duration::from_millis(100))
            .validate(&token(), None)
            .await;
        assert!(matches!(result, Err(ValidationError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_parent_deadline_cancels() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let deadline = Instant::now() + Duration::from_millis(100);
        let result = validator(&server, Duration::from_secs(10))
            .validate(&token(), Some(deadline))
            .await;
        assert!(matches!(result, Err(ValidationError::Canceled)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let base = Url::parse("http://127.0.0.1:9/").unwrap();
        let validator = HttpValidator::new(&base, Duration::from_secs(5)).unwrap();
        let result = validator.validate(&token(), None).await;
        assert!(matches!(result, Err(ValidationError::Network { .. })));
    }
}
