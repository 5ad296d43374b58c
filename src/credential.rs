use anyhow::{Context, Result};
use oauth2::TokenResponse;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Tokens expiring within this window are treated as already expired.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl Credential {
    /// Build a credential from a token endpoint response.
    ///
    /// Providers may omit the granted scopes when they equal the requested
    /// ones, in which case `requested` is recorded.
    pub fn from_token_response<T>(response: &T, requested: &[String]) -> Result<Self>
    where
        T: TokenResponse<oauth2::basic::BasicTokenType>,
    {
        let scopes = match response.scopes() {
            Some(granted) if !granted.is_empty() => {
                granted.iter().map(|scope| scope.as_str().to_owned()).collect()
            }
            _ => requested.to_vec(),
        };

        let expires_at = match response.expires_in() {
            Some(expires_in) => {
                let expires_at = unix_now()?
                    .checked_add(expires_in.as_secs())
                    .context("Duration was so long it caused an overflow")?;
                UNIX_EPOCH
                    .checked_add(Duration::from_secs(expires_at))
                    .context("Token expiry is beyond the representable time range")?;
                Some(expires_at)
            }
            None => None,
        };

        Ok(Credential {
            access_token: response.access_token().secret().to_owned(),
            refresh_token: response
                .refresh_token()
                .map(|token| token.secret().to_owned()),
            scopes,
            expires_at,
        })
    }

    pub fn covers(&self, scopes: &[String]) -> bool {
        scopes.iter().all(|scope| self.scopes.contains(scope))
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    fn is_expired_at(&self, now: SystemTime) -> bool {
        // An expiry too far out to represent never comes
        let expires_at = match self
            .expires_at
            .and_then(|secs| UNIX_EPOCH.checked_add(Duration::from_secs(secs)))
        {
            Some(expires_at) => expires_at,
            None => return false,
        };

        match expires_at.duration_since(now) {
            Ok(remaining) => remaining <= EXPIRY_SKEW,
            Err(_) => true,
        }
    }
}

pub(crate) fn unix_now() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock is set before the Unix epoch")?
        .as_secs())
}
