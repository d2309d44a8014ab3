/// Command, message and button handlers
pub mod handlers;
/// Retry and error classification for Telegram API calls
pub mod resilient;
/// `ChatTransport` implementation over the Bot API
pub mod transport;
/// Conversion of Telegram updates into platform updates
pub mod updates;

pub use transport::TelegramTransport;
