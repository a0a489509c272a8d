//! External identity provider contract and its HTTP client.
//!
//! The provider is treated as unreliable: every call has a bounded
//! timeout and any transport, status or payload problem comes back as
//! `ExternalProvider`, which callers handle by retrying later.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use zeroize::Zeroizing;

use crate::errors::{HealthGuardError, Result};

/// Tokens issued by the provider.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Some providers rotate the refresh token on every use.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of `access_token` in seconds.
    pub expires_in: u64,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// The refresh operation of an OAuth-style identity provider.
pub trait IdentityProvider: Send + Sync {
    /// Name stored alongside credentials issued by this provider.
    fn name(&self) -> &str;

    /// Exchange a refresh token for a new access token.
    fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;
}

/// Form-encoded `grant_type=refresh_token` client over HTTP.
pub struct HttpIdentityProvider {
    name: String,
    token_url: String,
    client_id: Option<String>,
    client_secret: Option<Zeroizing<String>>,
    agent: ureq::Agent,
}

impl HttpIdentityProvider {
    /// `base_url` is the provider API root; the token endpoint is
    /// `<base_url>/auth/token`.
    pub fn new(name: &str, base_url: &str, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Self {
            name: name.to_string(),
            token_url: format!("{}/auth/token", base_url.trim_end_matches('/')),
            client_id: None,
            client_secret: None,
            agent,
        }
    }

    pub fn with_client_credentials(
        mut self,
        client_id: Option<String>,
        client_secret: Option<Zeroizing<String>>,
    ) -> Self {
        self.client_id = client_id;
        self.client_secret = client_secret;
        self
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

impl IdentityProvider for HttpIdentityProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        if let Some(id) = &self.client_id {
            form.push(("client_id", id.as_str()));
        }
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let mut response = self
            .agent
            .post(&self.token_url)
            .send_form(form)
            .map_err(|e| HealthGuardError::ExternalProvider(format!("token request: {e}")))?;

        let grant: TokenGrant = response
            .body_mut()
            .read_json()
            .map_err(|e| HealthGuardError::ExternalProvider(format!("token response: {e}")))?;

        if grant.access_token.is_empty() || grant.expires_in == 0 {
            return Err(HealthGuardError::ExternalProvider(
                "token response missing access_token or expires_in".into(),
            ));
        }
        Ok(grant)
    }
}
