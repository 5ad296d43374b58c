use crate::credential::Credential;
use crate::settings::Settings;
use anyhow::{bail, Context, Result};
use log::{debug, trace};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use url::Url;

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub function: String,
    pub oauth_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_mode: Option<bool>,
}

impl ExecutionRequest {
    pub fn new(function: impl Into<String>, oauth_token: impl Into<String>) -> Self {
        ExecutionRequest {
            function: function.into(),
            oauth_token: oauth_token.into(),
            ..Default::default()
        }
    }
}

/// Envelope of a script execution.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub done: bool,
    pub error: Option<Status>,
    pub response: Option<Map<String, Value>>,
}

impl Operation {
    /// The `result` member of the response, `None` when absent or null.
    pub fn result(&self) -> Option<&Value> {
        self.response
            .as_ref()
            .and_then(|response| response.get("result"))
            .filter(|result| !result.is_null())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Vec<Value>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptStackTraceElement {
    #[serde(default)]
    pub function: String,
    #[serde(default)]
    pub line_number: i64,
}

impl Status {
    /// Stack trace elements of a `ScriptExecutionError` detail, if any.
    pub fn script_stack_trace(&self) -> Vec<ScriptStackTraceElement> {
        self.details
            .iter()
            .filter_map(|detail| detail.get("scriptStackTraceElements"))
            .filter_map(|elements| {
                serde_json::from_value::<Vec<ScriptStackTraceElement>>(elements.clone()).ok()
            })
            .flatten()
            .collect()
    }
}

/// Error body of a failed Google API request.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct GoogleError {
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub details: Vec<Value>,
}

impl fmt::Display for GoogleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.code, self.status, self.message)
    }
}

#[derive(Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("API returned error {0}")]
    Api(GoogleError),
    #[error("request to the Apps Script API failed")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response from the Apps Script API (HTTP {status}): {body}")]
    Decode { status: u16, body: String },
}

/// Authenticated client for the Apps Script execution API.
pub struct ScriptService {
    http_client: Client,
    api_root: Url,
}

impl ScriptService {
    pub fn new(settings: &Settings) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(settings.application_name.clone())
            .timeout(settings.read_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let api_root = Url::parse(&settings.api_root)
            .with_context(|| format!("Invalid API root '{}'", settings.api_root))?;
        if api_root.cannot_be_a_base() {
            bail!("API root '{}' cannot be a base URL", settings.api_root);
        }

        Ok(ScriptService {
            http_client,
            api_root,
        })
    }

    fn run_url(&self, script_id: &str) -> Url {
        let run = format!("{}:run", script_id);
        let mut url = self.api_root.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["v1", "scripts", run.as_str()].iter());
        }
        url
    }

    /// Run `request` in the script and wait for its result.
    pub async fn run(
        &self,
        script_id: &str,
        request: &ExecutionRequest,
        credential: &Credential,
    ) -> Result<Operation, ScriptError> {
        let url = self.run_url(script_id);
        debug!("Running '{}' in script {}", request.function, script_id);

        let response = self
            .http_client
            .post(url)
            .bearer_auth(&credential.access_token)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        trace!("Apps Script API answered {}: {}", status, body);

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|_| ScriptError::Decode {
                status: status.as_u16(),
                body,
            });
        }

        match serde_json::from_str::<GoogleErrorBody>(&body) {
            Ok(error) => Err(ScriptError::Api(error.error)),
            Err(_) => Err(ScriptError::Decode {
                status: status.as_u16(),
                body,
            }),
        }
    }
}
