use anyhow::Result;
use log::error;
use script_quickstart::{
    Authorizer, BrowserPrompt, ClientSecrets, FileCredentialStore, Invoker, ScriptService,
    Settings,
};

/// Script to call, from the Apps Script editor under Deploy > API executable.
const SCRIPT_ID: &str = "MsawqlhMuXdiVoigEUkh9guNZK2JnVIY8";

/// Takes no parameters and returns the folder names (keyed on folder id)
/// in the user's root Drive folder.
const FUNCTION_NAME: &str = "getFoldersUnderRoot";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let settings = Settings::from_env()?;
    let secrets = ClientSecrets::load(&settings.client_secret_path)?;
    let store = FileCredentialStore::open(&settings.credentials_dir)?;

    let authorizer = Authorizer::new(&secrets, &settings, store, BrowserPrompt)?;
    let credential = authorizer.authorize(&settings.user_id).await?;

    let invoker = Invoker::new(ScriptService::new(&settings)?, SCRIPT_ID, FUNCTION_NAME);
    invoker.invoke(&credential, &mut std::io::stdout()).await
}
