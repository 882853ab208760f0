//! Client-credentials token exchange

use std::time::Duration;

use serde::Deserialize;

use crate::credentials::CredentialPair;
use crate::error::CallError;
use crate::http::{Authorization, HttpRequest, Transport};

const TOKEN_TIMEOUT: Duration = Duration::from_secs(15);

/// Bearer token plus the pool index of the credential that produced it.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenState {
    pub bearer: String,
    pub credential_index: usize,
}

impl std::fmt::Debug for TokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenState")
            .field("credential_index", &self.credential_index)
            .finish_non_exhaustive()
    }
}

/// Exchanges credential pairs for bearer tokens at a fixed endpoint.
///
/// Stateless: every call hits the endpoint, nothing is cached and nothing is
/// retried here.
#[derive(Debug, Clone)]
pub struct TokenProvider {
    url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

impl TokenProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST `grant_type=client_credentials` with basic auth of `id:secret`.
    pub fn obtain_token(
        &self,
        transport: &dyn Transport,
        pair: &CredentialPair,
    ) -> Result<String, CallError> {
        let mut request = HttpRequest::post(&self.url)
            .form("grant_type", "client_credentials")
            .timeout(TOKEN_TIMEOUT);
        request.auth = Authorization::Basic {
            id: pair.client_id.clone(),
            secret: pair.client_secret.clone(),
        };

        let response = transport.send(&request).map_err(|e| {
            log::warn!("Token request for {} failed: {e}", pair.client_id);
            CallError::AuthFailure { status: None }
        })?;
        if response.status != 200 {
            log::warn!(
                "Token request for {} rejected: HTTP {}",
                pair.client_id,
                response.status
            );
            return Err(CallError::AuthFailure {
                status: Some(response.status),
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&response.body)?;
        parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(CallError::AuthFailure {
                status: Some(response.status),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, Method};
    use crate::testing::ScriptedTransport;

    const URL: &str = "https://accounts.example.com/api/token";

    #[test]
    fn successful_exchange_uses_basic_auth() {
        let transport = ScriptedTransport::new();
        transport.push_ok(r#"{"access_token":"abc","token_type":"Bearer","expires_in":3600}"#);

        let provider = TokenProvider::new(URL);
        let token = provider
            .obtain_token(&transport, &CredentialPair::new("id", "secret"))
            .unwrap();
        assert_eq!(token, "abc");

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, Method::Post);
        assert_eq!(sent[0].url, URL);
        assert_eq!(
            sent[0].auth,
            Authorization::Basic {
                id: "id".into(),
                secret: "secret".into()
            }
        );
        assert_eq!(
            sent[0].form,
            vec![("grant_type".into(), "client_credentials".into())]
        );
    }

    #[test]
    fn non_200_is_auth_failure() {
        let transport = ScriptedTransport::new();
        transport.push(HttpResponse::new(400, r#"{"error":"invalid_client"}"#));

        let err = TokenProvider::new(URL)
            .obtain_token(&transport, &CredentialPair::new("id", "bad"))
            .unwrap_err();
        assert_eq!(err, CallError::AuthFailure { status: Some(400) });
    }

    #[test]
    fn network_error_is_auth_failure() {
        let transport = ScriptedTransport::new();
        transport.push_network_error("connection refused");

        let err = TokenProvider::new(URL)
            .obtain_token(&transport, &CredentialPair::new("id", "secret"))
            .unwrap_err();
        assert_eq!(err, CallError::AuthFailure { status: None });
    }

    #[test]
    fn missing_token_field_is_auth_failure() {
        let transport = ScriptedTransport::new();
        transport.push_ok("{}");

        let err = TokenProvider::new(URL)
            .obtain_token(&transport, &CredentialPair::new("id", "secret"))
            .unwrap_err();
        assert!(matches!(err, CallError::AuthFailure { .. }));
    }
}
