//! On-disk credential store for server sessions.
//!
//! Credentials live in `~/.preflight/credentials.toml`, one entry per
//! server address. Values are stored in plain text; the file is created
//! with owner-only permissions on Unix.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CREDENTIALS_PATH: &str = "~/.preflight/credentials.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub server: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    credentials: Vec<StoredCredential>,
}

pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn open_default() -> Self {
        let path = shellexpand::tilde(CREDENTIALS_PATH).into_owned();
        Self::at(PathBuf::from(path))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Looks up the credential stored for `server`. A missing store file is
    /// not an error, only an unparseable one is.
    pub fn find(&self, server: &str) -> Result<Option<StoredCredential>> {
        let file = self.load()?;
        Ok(file.credentials.into_iter().find(|c| c.server == server))
    }

    /// Inserts or replaces the entry for the credential's server.
    pub fn store(&self, credential: StoredCredential) -> Result<()> {
        let mut file = self.load()?;
        file.credentials.retain(|c| c.server != credential.server);
        file.credentials.push(credential);
        file.credentials.sort_by(|a, b| a.server.cmp(&b.server));
        self.save(&file)
    }

    /// Removes the entry for `server`, reporting whether one existed.
    pub fn remove(&self, server: &str) -> Result<bool> {
        let mut file = self.load()?;
        let before = file.credentials.len();
        file.credentials.retain(|c| c.server != server);
        let removed = file.credentials.len() != before;
        if removed {
            self.save(&file)?;
        }
        Ok(removed)
    }

    fn load(&self) -> Result<CredentialFile> {
        if !self.path.exists() {
            return Ok(CredentialFile::default());
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Malformed credential store {}", self.path.display()))
    }

    fn save(&self, file: &CredentialFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let text = toml::to_string_pretty(file).context("Failed to serialize credentials")?;
        fs::write(&self.path, text)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        restrict_permissions(&self.path)?;
        debug!(store = %self.path.display(), "credential store updated");
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to restrict permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn cred(server: &str, user: &str) -> StoredCredential {
        StoredCredential {
            server: server.to_owned(),
            user: user.to_owned(),
            password: "hunter2".to_owned(),
        }
    }

    #[test]
    fn store_then_find_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = CredentialStore::at(tmp.path().join("credentials.toml"));

        store.store(cred("ci.example.com:9955", "alice")).unwrap();
        let found = store.find("ci.example.com:9955").unwrap().unwrap();
        assert_eq!(found.user, "alice");
        assert!(store.find("other:1").unwrap().is_none());
    }

    #[test]
    fn storing_same_server_replaces_the_entry() {
        let tmp = TempDir::new().unwrap();
        let store = CredentialStore::at(tmp.path().join("credentials.toml"));

        store.store(cred("ci:1", "alice")).unwrap();
        store.store(cred("ci:1", "bob")).unwrap();

        let found = store.find("ci:1").unwrap().unwrap();
        assert_eq!(found.user, "bob");
    }

    #[test]
    fn remove_reports_whether_anything_was_there() {
        let tmp = TempDir::new().unwrap();
        let store = CredentialStore::at(tmp.path().join("credentials.toml"));

        assert!(!store.remove("ci:1").unwrap());
        store.store(cred("ci:1", "alice")).unwrap();
        assert!(store.remove("ci:1").unwrap());
        assert!(store.find("ci:1").unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn store_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials.toml");
        let store = CredentialStore::at(&path);
        store.store(cred("ci:1", "alice")).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
