//! # Apps Script quickstart
//! Authorize against Google with the installed-app OAuth 2.0 flow and run a
//! single Apps Script function through the Apps Script API.
//!
//! The credential is cached on disk, so the browser consent step only
//! happens on the first run (or after the stored token can no longer be
//! refreshed).
//!
//! ## Example code
//! ```no_run
//!# async fn doc_test() -> anyhow::Result<()> {
//! use script_quickstart::{
//!     Authorizer, BrowserPrompt, ClientSecrets, FileCredentialStore, Invoker, ScriptService,
//!     Settings,
//! };
//!
//! let settings = Settings::from_env()?;
//! let secrets = ClientSecrets::load(&settings.client_secret_path)?;
//! let store = FileCredentialStore::open(&settings.credentials_dir)?;
//!
//! // Reuses the stored credential, or opens the browser for consent
//! let authorizer = Authorizer::new(&secrets, &settings, store, BrowserPrompt)?;
//! let credential = authorizer.authorize(&settings.user_id).await?;
//!
//! let invoker = Invoker::new(
//!     ScriptService::new(&settings)?,
//!     "MsawqlhMuXdiVoigEUkh9guNZK2JnVIY8",
//!     "getFoldersUnderRoot",
//! );
//! invoker.invoke(&credential, &mut std::io::stdout()).await?;
//!# Ok(())
//!# }
//! ```
mod authorizer;
mod credential;
mod credential_store;
mod invoker;
mod receiver;
mod script;
mod settings;

pub use crate::authorizer::{Authorizer, BrowserPrompt, ConsentPrompt};
pub use crate::credential::Credential;
pub use crate::credential_store::FileCredentialStore;
pub use crate::invoker::{report_api_error, report_operation, Invoker};
pub use crate::receiver::{AuthorizationResponse, LocalServerReceiver, CALLBACK_PATH};
pub use crate::script::{
    ExecutionRequest, GoogleError, Operation, ScriptError, ScriptService, ScriptStackTraceElement,
    Status,
};
pub use crate::settings::{ClientSecrets, Settings, DRIVE_SCOPE};
