//! Testing helpers and fixtures.

use crate::models::{
    Chat, ChatStatus, Platform, PlatformUpdate, RecordStatus, ResolvedContext, Session, User,
};
use crate::storage::MockIdentityStore;
use chrono::{TimeZone, Utc};

/// Update from a private chat with user 42.
#[must_use]
pub fn sample_update() -> PlatformUpdate {
    PlatformUpdate {
        platform: Platform::Telegram,
        platform_user_id: 42,
        username: Some("alice".to_string()),
        first_name: "Alice".to_string(),
        last_name: None,
        language_code: Some("en".to_string()),
        is_premium: false,
        chat_id: 42,
        chat_type: "private".to_string(),
        chat_title: None,
    }
}

/// Triple matching [`sample_update`].
#[must_use]
pub fn sample_context() -> ResolvedContext {
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).single().unwrap_or_default();
    ResolvedContext {
        user: User {
            id: 1,
            username: "telegram:alice".to_string(),
            firstname: "Alice".to_string(),
            lastname: None,
            nicename: "Alice".to_string(),
            language: Some("en".to_string()),
            status: RecordStatus::Active,
        },
        session: Session {
            id: 10,
            user_id: 1,
            platform: Platform::Telegram,
            platform_user_id: 42,
            platform_username: Some("alice".to_string()),
            first_name: "Alice".to_string(),
            last_name: None,
            language_code: Some("en".to_string()),
            is_premium: false,
            chat_id: 42,
            chat_type: "private".to_string(),
            chat_title: None,
            last_interaction: at,
            status: RecordStatus::Active,
        },
        chat: Chat {
            id: 100,
            user_id: 1,
            session_id: 10,
            platform: Platform::Telegram,
            title: "Chat with Alice".to_string(),
            last_message_at: at,
            status: ChatStatus::Active,
        },
    }
}

/// Store where every call succeeds and first contact creates [`sample_context`].
///
/// `record_message` succeeds, `latest_structured_data` returns `None`.
#[must_use]
pub fn mock_store_noop() -> MockIdentityStore {
    let mut mock = MockIdentityStore::new();
    mock.expect_find_session().returning(|_, _| Ok(None));
    mock.expect_create_identity_bundle()
        .returning(|_, _| Ok(sample_context()));
    mock.expect_record_message().returning(|_, _, _| Ok(()));
    mock.expect_latest_structured_data().returning(|_| Ok(None));
    mock.expect_check_connection().returning(|| Ok(()));
    mock.expect_close().returning(|| ());
    mock
}

#[tokio::test]
async fn noop_store_resolves_sample_context() {
    use crate::resolver::SessionResolver;
    use std::sync::Arc;

    let resolver = SessionResolver::new(Arc::new(mock_store_noop()));
    match resolver.resolve(&sample_update()).await {
        Ok(ctx) => assert_eq!(ctx, sample_context()),
        Err(err) => panic!("resolve failed: {err}"),
    }
}
