use crate::credential::Credential;
use crate::credential_store::FileCredentialStore;
use crate::receiver::LocalServerReceiver;
use crate::settings::{ClientSecrets, Settings};
use anyhow::{bail, Context, Result};
use log::{debug, info, trace, warn};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, RefreshToken, Scope, TokenUrl,
};
use url::Url;

/// Shows the consent URL to the user.
pub trait ConsentPrompt {
    fn present(&self, url: &Url) -> Result<()>;
}

/// Prints the consent URL and tries to open it in the default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserPrompt;

impl ConsentPrompt for BrowserPrompt {
    fn present(&self, url: &Url) -> Result<()> {
        println!("Please open the following address in your browser:");
        println!("  {}", url);
        if let Err(e) = open::that(url.as_str()) {
            debug!("Could not open a browser: {}", e);
        }
        Ok(())
    }
}

/// Produces credentials for a fixed scope list, from the store when
/// possible and through the installed-app consent flow otherwise.
pub struct Authorizer<P = BrowserPrompt> {
    client: BasicClient,
    store: FileCredentialStore,
    scopes: Vec<String>,
    callback_port: u16,
    prompt: P,
}

impl<P: ConsentPrompt> Authorizer<P> {
    pub fn new(
        secrets: &ClientSecrets,
        settings: &Settings,
        store: FileCredentialStore,
        prompt: P,
    ) -> Result<Self> {
        let client = BasicClient::new(
            ClientId::new(secrets.client_id.clone()),
            Some(ClientSecret::new(secrets.client_secret.clone())),
            AuthUrl::new(secrets.auth_uri.clone()).context("Invalid auth_uri in client secrets")?,
            Some(
                TokenUrl::new(secrets.token_uri.clone())
                    .context("Invalid token_uri in client secrets")?,
            ),
        )
        .set_auth_type(AuthType::RequestBody);

        Ok(Authorizer {
            client,
            store,
            scopes: settings.scopes.clone(),
            callback_port: settings.callback_port,
            prompt,
        })
    }

    pub fn store(&self) -> &FileCredentialStore {
        &self.store
    }

    pub async fn authorize(&self, user_id: &str) -> Result<Credential> {
        if let Some(stored) = self.store.load(user_id)? {
            if !stored.covers(&self.scopes) {
                debug!("Stored credential lacks requested scopes, asking for consent");
            } else if !stored.is_expired() {
                trace!("Using stored credential for '{}'", user_id);
                return Ok(stored);
            } else if let Some(refresh_token) = stored.refresh_token.as_deref() {
                match self.refresh(&stored, refresh_token).await {
                    Ok(credential) => {
                        self.store.save(user_id, &credential)?;
                        return Ok(credential);
                    }
                    Err(e) => warn!("Failed to refresh stored credential: {:#}", e),
                }
            } else {
                debug!("Stored credential expired without a refresh token");
            }
        }

        let credential = self.request_consent().await?;
        self.store.save(user_id, &credential)?;
        info!("Stored new credential for '{}'", user_id);
        println!("Credentials saved to {}", self.store.dir().display());

        Ok(credential)
    }

    async fn refresh(&self, stale: &Credential, refresh_token: &str) -> Result<Credential> {
        debug!("Refreshing access token");
        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_owned()))
            .request_async(async_http_client)
            .await?;

        let mut credential = Credential::from_token_response(&response, &stale.scopes)?;
        // Google only issues a new refresh token on consent
        if credential.refresh_token.is_none() {
            credential.refresh_token = stale.refresh_token.clone();
        }

        debug!("Refreshed access token");
        Ok(credential)
    }

    async fn request_consent(&self) -> Result<Credential> {
        let receiver = LocalServerReceiver::bind(self.callback_port).await?;
        let client = self
            .client
            .clone()
            .set_redirect_uri(RedirectUrl::new(receiver.redirect_uri())?);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (consent_url, csrf_token) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .add_extra_param("access_type", "offline")
            .set_pkce_challenge(pkce_challenge)
            .url();

        self.prompt.present(&consent_url)?;
        let response = receiver.wait_for_code().await?;
        drop(receiver);

        if response.state.as_deref() != Some(csrf_token.secret().as_str()) {
            bail!("Callback state does not match the authorization request");
        }

        trace!("Exchanging authorization code for a token");
        let token = client
            .exchange_code(AuthorizationCode::new(response.code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(async_http_client)
            .await?;

        Credential::from_token_response(&token, &self.scopes)
    }
}
