pub mod cli;
pub mod client;
pub mod session;

pub use client::{ApiClient, ClientError};
pub use session::{Session, SessionStore};

use anyhow::Result;

/// Load the current session or fail with a hint to sign in.
pub async fn require_session(store: &SessionStore) -> Result<Session> {
    store
        .read()
        .await?
        .ok_or_else(|| anyhow::anyhow!("not signed in; run `circlectl signin <username>` first"))
}
