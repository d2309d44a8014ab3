//! Persistent identity, session and chat records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Messaging platform a session belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Telegram Bot API
    Telegram,
}

impl Platform {
    /// Storage representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telegram" => Ok(Self::Telegram),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// Lifecycle status shared by identities and sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// In use
    Active,
    /// Dormant
    Inactive,
}

impl RecordStatus {
    /// Storage representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// Lifecycle status of a chat thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    /// Current thread of the session (at most one per session)
    Active,
    /// Closed thread
    Archived,
}

impl ChatStatus {
    /// Storage representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

impl FromStr for ChatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            other => Err(format!("unknown chat status: {other}")),
        }
    }
}

/// Durable principal representing one end user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Numeric id
    pub id: i64,
    /// Identity key, `{platform}_{platform_user_id}` (unique)
    pub username: String,
    /// First name
    pub firstname: String,
    /// Last name
    pub lastname: Option<String>,
    /// Display name
    pub nicename: String,
    /// Locale
    pub language: Option<String>,
    /// Lifecycle status
    pub status: RecordStatus,
}

/// Per-platform binding of an identity to one messaging account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Numeric id
    pub id: i64,
    /// Owning identity
    pub user_id: i64,
    /// Platform of the account
    pub platform: Platform,
    /// Account id on the platform (unique per platform)
    pub platform_user_id: i64,
    /// Platform username
    pub platform_username: Option<String>,
    /// First name reported by the platform
    pub first_name: String,
    /// Last name reported by the platform
    pub last_name: Option<String>,
    /// Language code reported by the platform
    pub language_code: Option<String>,
    /// Premium account flag
    pub is_premium: bool,
    /// Chat id at last contact
    pub chat_id: i64,
    /// Chat type at last contact
    pub chat_type: String,
    /// Chat title at last contact
    pub chat_title: Option<String>,
    /// Last interaction timestamp
    pub last_interaction: DateTime<Utc>,
    /// Lifecycle status
    pub status: RecordStatus,
}

/// Conversation thread under a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Numeric id
    pub id: i64,
    /// Owning identity
    pub user_id: i64,
    /// Owning session
    pub session_id: i64,
    /// Platform of the session
    pub platform: Platform,
    /// Thread title
    pub title: String,
    /// Timestamp of the latest message in the thread
    pub last_message_at: DateTime<Utc>,
    /// Lifecycle status
    pub status: ChatStatus,
}

/// Platform-neutral view of an inbound update, as needed by the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformUpdate {
    /// Source platform
    pub platform: Platform,
    /// Sender account id
    pub platform_user_id: i64,
    /// Sender username
    pub username: Option<String>,
    /// Sender first name (may be empty)
    pub first_name: String,
    /// Sender last name
    pub last_name: Option<String>,
    /// Sender language code
    pub language_code: Option<String>,
    /// Sender premium flag
    pub is_premium: bool,
    /// Chat the update arrived in
    pub chat_id: i64,
    /// Chat type ("private", "group", ...)
    pub chat_type: String,
    /// Chat title for group chats
    pub chat_title: Option<String>,
}

impl PlatformUpdate {
    /// Synthesized handle used when the platform reports no name
    #[must_use]
    pub fn synthesized_handle(&self) -> String {
        format!("{}_{}", self.platform, self.platform_user_id)
    }

    /// Key the identity is created-or-updated by.
    ///
    /// Built from the platform account id; platform usernames can be released
    /// and claimed by another account, so they only live on the session.
    #[must_use]
    pub fn identity_key(&self) -> String {
        self.synthesized_handle()
    }

    /// First name, falling back to the synthesized handle
    #[must_use]
    pub fn display_first_name(&self) -> String {
        let trimmed = self.first_name.trim();
        if trimmed.is_empty() {
            self.synthesized_handle()
        } else {
            trimmed.to_string()
        }
    }

    /// Display name ("First Last")
    #[must_use]
    pub fn nicename(&self) -> String {
        match self.last_name.as_deref().map(str::trim) {
            Some(last) if !last.is_empty() => format!("{} {last}", self.display_first_name()),
            _ => self.display_first_name(),
        }
    }

    /// Title given to a freshly created chat thread
    #[must_use]
    pub fn chat_title_or_default(&self) -> String {
        self.chat_title
            .clone()
            .unwrap_or_else(|| format!("Chat with {}", self.display_first_name()))
    }
}

/// Resolved `{user, session, chat}` triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContext {
    /// Identity
    pub user: User,
    /// Session
    pub session: Session,
    /// Active chat
    pub chat: Chat,
}

/// Author of a logged message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// End user
    User,
    /// Conversational backend
    Assistant,
}

impl MessageRole {
    /// Storage representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Message appended to a chat's log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Author
    pub role: MessageRole,
    /// Delivery status ("completed", "failed", ...)
    pub status: String,
    /// Text content
    pub content: String,
    /// Free-form metadata; assistant answers carry `structuredData` here
    pub metadata: serde_json::Value,
}
