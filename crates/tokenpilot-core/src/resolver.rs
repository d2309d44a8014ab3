//! Identity/session resolution
//!
//! Turns an inbound platform update into the durable `{user, session, chat}`
//! triple. Idempotent: resolving the same update twice yields the same rows.
//! Concurrent first contacts are serialized by the store's unique constraints.

use crate::models::{PlatformUpdate, ResolvedContext};
use crate::storage::{IdentityStore, StorageError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves updates against an [`IdentityStore`]
#[derive(Clone)]
pub struct SessionResolver {
    store: Arc<dyn IdentityStore>,
}

impl SessionResolver {
    /// Create a resolver over `store`
    #[must_use]
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Underlying store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }

    /// Resolve an update into its `{user, session, chat}` triple.
    ///
    /// Storage errors are returned unmodified and nothing is retried.
    ///
    /// # Errors
    ///
    /// Returns the first `StorageError` raised by the store.
    pub async fn resolve(&self, update: &PlatformUpdate) -> Result<ResolvedContext, StorageError> {
        let now = Utc::now();
        match self
            .store
            .find_session(update.platform, update.platform_user_id)
            .await?
        {
            Some(session) => self.refresh(session.id, update, now).await,
            None => {
                info!(
                    platform = %update.platform,
                    platform_user_id = update.platform_user_id,
                    "First contact, creating identity"
                );
                self.store.create_identity_bundle(update, now).await
            }
        }
    }

    async fn refresh(
        &self,
        session_id: i64,
        update: &PlatformUpdate,
        now: DateTime<Utc>,
    ) -> Result<ResolvedContext, StorageError> {
        let (user, session) = self.store.touch_session(session_id, update, now).await?;
        let chat = match self.store.find_active_chat(session.id).await? {
            Some(chat) => self.store.touch_chat(chat.id, now).await?,
            None => {
                debug!(session_id = session.id, "No active chat, opening a new one");
                self.store
                    .create_chat(&session, &update.chat_title_or_default(), now)
                    .await?
            }
        };
        Ok(ResolvedContext {
            user,
            session,
            chat,
        })
    }
}
