use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{config, debug, error::TokenStoreError, types::Session, warning};

/// Persisted storage of the connected account's session.
///
/// `load` never fails: missing or unreadable data means "no session".
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Overwrites whatever session was stored before.
    async fn save(&self, session: &Session) -> Result<(), TokenStoreError>;

    async fn load(&self) -> Option<Session>;

    /// Forgets the stored session.
    async fn clear(&self) -> Result<(), TokenStoreError>;
}

/// Session stored as pretty-printed JSON in the local data directory.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        FileTokenStore { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl Default for FileTokenStore {
    fn default() -> Self {
        Self::new(config::token_path())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn save(&self, session: &Session) -> Result<(), TokenStoreError> {
        if let Some(parent) = self.path.parent() {
            async_fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(session)?;
        async_fs::write(&self.path, json).await?;
        Ok(())
    }

    async fn load(&self) -> Option<Session> {
        let content = match async_fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                debug!("No stored session at {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<Session>(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                warning!("Ignoring unreadable session file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    async fn clear(&self) -> Result<(), TokenStoreError> {
        match async_fs::remove_file(&self.path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Session kept in memory only, for embedding and tests.
#[derive(Default)]
pub struct MemoryTokenStore {
    session: Mutex<Option<Session>>,
}

impl MemoryTokenStore {
    /// Store that starts out holding `session`.
    pub fn new(session: Option<Session>) -> Self {
        MemoryTokenStore {
            session: Mutex::new(session),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn save(&self, session: &Session) -> Result<(), TokenStoreError> {
        *self.session.lock().await = Some(session.clone());
        Ok(())
    }

    async fn load(&self) -> Option<Session> {
        self.session.lock().await.clone()
    }

    async fn clear(&self) -> Result<(), TokenStoreError> {
        *self.session.lock().await = None;
        Ok(())
    }
}
