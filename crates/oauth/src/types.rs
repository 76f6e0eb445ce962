use {secrecy::Secret, serde::Deserialize};

/// Query parameters on the identity provider's redirect back to us.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub next: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Provider error code, if present and non-empty.
    pub fn provider_error(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }

    /// Authorization code, if present and non-empty.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref().filter(|c| !c.is_empty())
    }
}

/// Session issued by a successful code exchange.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: Secret<String>,
    pub refresh_token: Option<Secret<String>>,
    /// Unix timestamp when the access token expires.
    pub expires_at: Option<u64>,
    pub user_id: Option<String>,
    pub email: Option<String>,
}

/// PKCE challenge pair.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}
