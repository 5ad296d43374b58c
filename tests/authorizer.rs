use anyhow::Result;
use mockito::{Matcher, Server, ServerGuard};
use script_quickstart::{
    Authorizer, ClientSecrets, ConsentPrompt, Credential, FileCredentialStore, Settings,
    DRIVE_SCOPE,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempDir;
use url::Url;

/// Plays the user: approves consent by following the redirect.
#[derive(Clone, Default)]
struct SimulatedConsent {
    presented: Arc<AtomicUsize>,
    forged_state: Option<&'static str>,
}

impl SimulatedConsent {
    fn times_presented(&self) -> usize {
        self.presented.load(Ordering::SeqCst)
    }
}

impl ConsentPrompt for SimulatedConsent {
    fn present(&self, url: &Url) -> Result<()> {
        self.presented.fetch_add(1, Ordering::SeqCst);

        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["scope"], DRIVE_SCOPE);

        let state = match self.forged_state {
            Some(forged) => forged.to_string(),
            None => params["state"].clone(),
        };
        let redirect = Url::parse_with_params(
            &params["redirect_uri"],
            &[("code", "simulated-code"), ("state", state.as_str())],
        )?;
        tokio::spawn(async move { reqwest::get(redirect).await });
        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn secrets(server: &ServerGuard) -> ClientSecrets {
    ClientSecrets {
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        auth_uri: "https://accounts.example.com/o/oauth2/auth".to_string(),
        token_uri: format!("{}/token", server.url()),
    }
}

fn authorizer(
    server: &ServerGuard,
    dir: &TempDir,
    prompt: SimulatedConsent,
) -> Authorizer<SimulatedConsent> {
    let store = FileCredentialStore::open(dir.path()).unwrap();
    Authorizer::new(&secrets(server), &Settings::default(), store, prompt).unwrap()
}

fn stored(dir: &TempDir, credential: &Credential) {
    FileCredentialStore::open(dir.path())
        .unwrap()
        .save("user", credential)
        .unwrap();
}

#[tokio::test]
async fn cached_credential_skips_consent() {
    let mut server = Server::new_async().await;
    let token_endpoint = server.mock("POST", "/token").expect(0).create_async().await;
    let dir = tempfile::tempdir().unwrap();
    let cached = Credential {
        access_token: "ya29.cached".to_string(),
        refresh_token: Some("1//refresh".to_string()),
        scopes: vec![DRIVE_SCOPE.to_string()],
        expires_at: Some(unix_now() + 3600),
    };
    stored(&dir, &cached);

    let prompt = SimulatedConsent::default();
    let credential = authorizer(&server, &dir, prompt.clone())
        .authorize("user")
        .await
        .unwrap();

    assert_eq!(credential, cached);
    assert_eq!(prompt.times_presented(), 0);
    token_endpoint.assert_async().await;
}

#[tokio::test]
async fn consent_exchange_persists_credential() {
    let mut server = Server::new_async().await;
    let token_endpoint = server
        .mock("POST", "/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("grant_type=authorization_code".to_string()),
            Matcher::Regex("code=simulated-code".to_string()),
            Matcher::Regex("code_verifier=".to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"access_token":"ya29.fresh","expires_in":3599,"refresh_token":"1//fresh","scope":"{}","token_type":"Bearer"}}"#,
            DRIVE_SCOPE
        ))
        .create_async()
        .await;
    let dir = tempfile::tempdir().unwrap();

    let prompt = SimulatedConsent::default();
    let authorizer = authorizer(&server, &dir, prompt.clone());
    let credential = authorizer.authorize("user").await.unwrap();

    assert_eq!(prompt.times_presented(), 1);
    assert_eq!(credential.access_token, "ya29.fresh");
    assert_eq!(credential.refresh_token.as_deref(), Some("1//fresh"));
    assert_eq!(credential.scopes, vec![DRIVE_SCOPE.to_string()]);
    assert!(credential.expires_at.unwrap() > unix_now());
    assert_eq!(authorizer.store().load("user").unwrap(), Some(credential));
    token_endpoint.assert_async().await;

    // A second run is served from the store
    authorizer.authorize("user").await.unwrap();
    assert_eq!(prompt.times_presented(), 1);
}

#[tokio::test]
async fn expired_credential_is_refreshed() {
    let mut server = Server::new_async().await;
    let token_endpoint = server
        .mock("POST", "/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("grant_type=refresh_token".to_string()),
            Matcher::Regex("refresh_token=1%2F%2Fstale".to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"ya29.renewed","expires_in":3599,"token_type":"Bearer"}"#)
        .create_async()
        .await;
    let dir = tempfile::tempdir().unwrap();
    stored(
        &dir,
        &Credential {
            access_token: "ya29.expired".to_string(),
            refresh_token: Some("1//stale".to_string()),
            scopes: vec![DRIVE_SCOPE.to_string()],
            expires_at: Some(unix_now() - 10),
        },
    );

    let prompt = SimulatedConsent::default();
    let authorizer = authorizer(&server, &dir, prompt.clone());
    let credential = authorizer.authorize("user").await.unwrap();

    assert_eq!(prompt.times_presented(), 0);
    assert_eq!(credential.access_token, "ya29.renewed");
    assert_eq!(credential.refresh_token.as_deref(), Some("1//stale"));
    assert_eq!(authorizer.store().load("user").unwrap(), Some(credential));
    token_endpoint.assert_async().await;
}

#[tokio::test]
async fn failed_refresh_falls_back_to_consent() {
    let mut server = Server::new_async().await;
    let refresh = server
        .mock("POST", "/token")
        .match_body(Matcher::Regex("grant_type=refresh_token".to_string()))
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#)
        .create_async()
        .await;
    let exchange = server
        .mock("POST", "/token")
        .match_body(Matcher::Regex("grant_type=authorization_code".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"ya29.consented","expires_in":3599,"token_type":"Bearer"}"#)
        .create_async()
        .await;
    let dir = tempfile::tempdir().unwrap();
    stored(
        &dir,
        &Credential {
            access_token: "ya29.expired".to_string(),
            refresh_token: Some("1//revoked".to_string()),
            scopes: vec![DRIVE_SCOPE.to_string()],
            expires_at: Some(unix_now() - 10),
        },
    );

    let prompt = SimulatedConsent::default();
    let credential = authorizer(&server, &dir, prompt.clone())
        .authorize("user")
        .await
        .unwrap();

    assert_eq!(prompt.times_presented(), 1);
    assert_eq!(credential.access_token, "ya29.consented");
    assert_eq!(credential.scopes, vec![DRIVE_SCOPE.to_string()]);
    refresh.assert_async().await;
    exchange.assert_async().await;
}

#[tokio::test]
async fn missing_scope_requires_consent() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"ya29.wider","token_type":"Bearer"}"#)
        .create_async()
        .await;
    let dir = tempfile::tempdir().unwrap();
    stored(
        &dir,
        &Credential {
            access_token: "ya29.narrow".to_string(),
            refresh_token: None,
            scopes: vec!["https://www.googleapis.com/auth/drive.readonly".to_string()],
            expires_at: None,
        },
    );

    let prompt = SimulatedConsent::default();
    let credential = authorizer(&server, &dir, prompt.clone())
        .authorize("user")
        .await
        .unwrap();

    assert_eq!(prompt.times_presented(), 1);
    assert_eq!(credential.access_token, "ya29.wider");
    assert_eq!(credential.expires_at, None);
}

#[tokio::test]
async fn forged_state_is_rejected() {
    let mut server = Server::new_async().await;
    let token_endpoint = server.mock("POST", "/token").expect(0).create_async().await;
    let dir = tempfile::tempdir().unwrap();

    let prompt = SimulatedConsent {
        forged_state: Some("not-the-state"),
        ..Default::default()
    };
    let authorizer = authorizer(&server, &dir, prompt);
    let err = authorizer.authorize("user").await.unwrap_err();

    assert!(err.to_string().contains("state"));
    assert_eq!(authorizer.store().load("user").unwrap(), None);
    token_endpoint.assert_async().await;
}
