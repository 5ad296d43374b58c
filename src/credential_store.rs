use crate::credential::Credential;
use anyhow::{bail, Context, Result};
use log::trace;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// File-backed credential store, one `<user>.json` file per user id.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    /// Open the store, creating its directory with owner-only permissions.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create credential directory {}", dir.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
        }

        Ok(FileCredentialStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load(&self, user_id: &str) -> Result<Option<Credential>> {
        let path = self.path_for(user_id)?;
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!("No stored credential at {}", path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        let credential = serde_json::from_str(&data)
            .with_context(|| format!("Stored credential {} is corrupt", path.display()))?;
        Ok(Some(credential))
    }

    pub fn save(&self, user_id: &str, credential: &Credential) -> Result<()> {
        let path = self.path_for(user_id)?;
        let data = serde_json::to_string_pretty(credential)?;
        std::fs::write(&path, data)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        trace!("Stored credential for '{}' at {}", user_id, path.display());
        Ok(())
    }

    fn path_for(&self, user_id: &str) -> Result<PathBuf> {
        let valid = !user_id.is_empty()
            && user_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
            && !user_id.starts_with('.');
        if !valid {
            bail!("Invalid user id for credential store: '{}'", user_id);
        }

        Ok(self.dir.join(format!("{}.json", user_id)))
    }
}
