use {anyhow::bail, tracing::debug, url::Url};

use crate::{pkce, types::PkceChallenge};

/// A started social login: where to send the browser and the PKCE pair to
/// keep until the callback.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub url: String,
    pub pkce: PkceChallenge,
}

/// Builds Supabase authorize URLs for social providers.
#[derive(Debug, Clone)]
pub struct OAuthFlow {
    supabase_url: String,
    callback_url: String,
    providers: Vec<String>,
}

impl OAuthFlow {
    /// `callback_url` is the absolute URL of our `/auth/callback` route.
    pub fn new(supabase_url: &str, callback_url: &str, providers: Vec<String>) -> Self {
        Self {
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            callback_url: callback_url.to_string(),
            providers,
        }
    }

    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    /// Start a login with `provider`, returning to `next` after the callback.
    pub fn start(&self, provider: &str, next: &str) -> anyhow::Result<AuthorizeRequest> {
        if !self.providers.iter().any(|p| p == provider) {
            bail!("unsupported login provider: {provider}");
        }
        if self.supabase_url.is_empty() {
            bail!("supabase_url is not configured");
        }

        let mut redirect_to = Url::parse(&self.callback_url)?;
        redirect_to.query_pairs_mut().append_pair("next", next);

        let pkce = pkce::generate();
        let url = Url::parse_with_params(
            &format!("{}/auth/v1/authorize", self.supabase_url),
            &[
                ("provider", provider),
                ("redirect_to", redirect_to.as_str()),
                ("code_challenge", pkce.challenge.as_str()),
                ("code_challenge_method", "s256"),
            ],
        )?;

        debug!(provider, "built authorize url");
        Ok(AuthorizeRequest {
            url: url.into(),
            pkce,
        })
    }
}
