use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{io::ErrorKind, path::PathBuf, time::Duration};
use time::OffsetDateTime;
use tokio::fs;

/// Who is signed in on this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub name: String,
    pub token: Option<String>,
    /// Unix epoch milliseconds; `None` never expires.
    pub expires_at: Option<i64>,
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Time left before `session` expires, `None` when it has no expiry.
pub fn remaining(session: &Session) -> Option<Duration> {
    session
        .expires_at
        .map(|at| Duration::from_millis((at - now_millis()).max(0) as u64))
}

/// JSON file holding the current session.
pub struct SessionStore {
    file: PathBuf,
}

impl SessionStore {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self { file: file.into() }
    }

    /// Default location under the platform data directory.
    pub fn default_path() -> Result<PathBuf> {
        let proj = ProjectDirs::from("org", "circles", "circlectl")
            .context("could not determine a home directory")?;
        Ok(proj.data_dir().join("session.json"))
    }

    pub fn path(&self) -> &PathBuf {
        &self.file
    }

    /// Persist a session, replacing any previous one.
    pub async fn save(
        &self,
        user_id: &str,
        name: &str,
        token: Option<String>,
        ttl: Option<Duration>,
    ) -> Result<Session> {
        let session = Session {
            user_id: user_id.to_string(),
            name: name.to_string(),
            token,
            expires_at: ttl.map(|ttl| now_millis() + ttl.as_millis() as i64),
        };
        if let Some(dir) = self.file.parent() {
            fs::create_dir_all(dir).await?;
        }
        let bytes = serde_json::to_vec(&session)?;
        fs::write(&self.file, bytes)
            .await
            .with_context(|| format!("writing {}", self.file.display()))?;
        Ok(session)
    }

    /// Load the session. Expired or unreadable sessions are removed and
    /// reported as absent.
    pub async fn read(&self) -> Result<Option<Session>> {
        let bytes = match fs::read(&self.file).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let session: Session = match serde_json::from_slice(&bytes) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(path = %self.file.display(), "discarding corrupt session: {e}");
                self.clear().await?;
                return Ok(None);
            }
        };
        if session.expires_at.is_some_and(|at| at <= now_millis()) {
            tracing::debug!(user_id = %session.user_id, "session expired");
            self.clear().await?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    pub async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.file).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
