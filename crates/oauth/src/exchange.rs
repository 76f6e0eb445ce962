use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    serde_json::Value,
    tracing::debug,
};

use crate::types::Session;

/// Why a code-for-session exchange failed.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// The provider answered and refused the code.
    #[error("provider rejected code exchange ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("code exchange request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed token response: {0}")]
    Malformed(String),
}

/// Converts a one-time authorization code into a session.
#[async_trait]
pub trait SessionExchanger: Send + Sync {
    async fn exchange(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Session, ExchangeError>;
}

/// Exchanger backed by the Supabase Auth PKCE token endpoint.
pub struct SupabaseExchanger {
    base_url: String,
    anon_key: Option<Secret<String>>,
    client: reqwest::Client,
}

impl SupabaseExchanger {
    pub fn new(base_url: &str, anon_key: Option<Secret<String>>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    expires_at: Option<u64>,
    user: Option<TokenUser>,
}

#[derive(Deserialize)]
struct TokenUser {
    id: String,
    email: Option<String>,
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Pull a human-readable message out of a GoTrue error body.
fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    let fallback = || {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    };
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return fallback();
    };
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(fallback)
}

#[async_trait]
impl SessionExchanger for SupabaseExchanger {
    async fn exchange(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Session, ExchangeError> {
        let body = serde_json::json!({
            "auth_code": code,
            "code_verifier": code_verifier.unwrap_or_default(),
        });

        let mut req = self
            .client
            .post(format!("{}/auth/v1/token", self.base_url))
            .query(&[("grant_type", "pkce")])
            .json(&body);
        if let Some(key) = &self.anon_key {
            req = req.header("apikey", key.expose_secret().as_str());
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(ExchangeError::Rejected {
                status: status.as_u16(),
                message: error_message(&text, status),
            });
        }

        let token: TokenResponse =
            serde_json::from_str(&text).map_err(|e| ExchangeError::Malformed(e.to_string()))?;
        let expires_at = token
            .expires_at
            .or_else(|| token.expires_in.map(|secs| unix_now() + secs));

        debug!(has_refresh = token.refresh_token.is_some(), "code exchanged");
        Ok(Session {
            access_token: Secret::new(token.access_token),
            refresh_token: token.refresh_token.map(Secret::new),
            expires_at,
            user_id: token.user.as_ref().map(|u| u.id.clone()),
            email: token.user.and_then(|u| u.email),
        })
    }
}

#[cfg(test)]
mod tests {
    use {super::*, mockito::Matcher};

    #[tokio::test]
    async fn test_exchange_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::UrlEncoded("grant_type".into(), "pkce".into()))
            .match_header("apikey", "anon")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "auth_code": "abc123",
                "code_verifier": "verifier",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token":"at","refresh_token":"rt","expires_at":1700000000,
                    "user":{"id":"u-1","email":"a@b.c"}}"#,
            )
            .create_async()
            .await;

        let exchanger = SupabaseExchanger::new(&server.url(), Some(Secret::new("anon".into())));
        let session = exchanger.exchange("abc123", Some("verifier")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(session.access_token.expose_secret(), "at");
        assert_eq!(
            session.refresh_token.as_ref().map(|t| t.expose_secret().as_str()),
            Some("rt")
        );
        assert_eq!(session.expires_at, Some(1_700_000_000));
        assert_eq!(session.user_id.as_deref(), Some("u-1"));
        assert_eq!(session.email.as_deref(), Some("a@b.c"));
    }

    #[tokio::test]
    async fn test_exchange_rejected_extracts_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":400,"msg":"Auth code already used"}"#)
            .create_async()
            .await;

        let exchanger = SupabaseExchanger::new(&server.url(), None);
        match exchanger.exchange("abc123", None).await {
            Err(ExchangeError::Rejected { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "Auth code already used");
            },
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exchange_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let exchanger = SupabaseExchanger::new(&server.url(), None);
        assert!(matches!(
            exchanger.exchange("abc123", None).await,
            Err(ExchangeError::Malformed(_))
        ));
    }

    #[test]
    fn test_error_message_fallbacks() {
        let status = reqwest::StatusCode::BAD_REQUEST;
        assert_eq!(
            error_message(r#"{"error":"invalid_grant","error_description":"expired"}"#, status),
            "expired"
        );
        assert_eq!(error_message(r#"{"error":"invalid_grant"}"#, status), "invalid_grant");
        assert_eq!(error_message("<html>", status), "Bad Request");
    }
}
