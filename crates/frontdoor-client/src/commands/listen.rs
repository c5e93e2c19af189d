//! Notification listener.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::ClientResult;
use crate::notifications::NotificationMode;

use super::send::print_envelope;

/// Prints notifications until `count` arrived or `seconds` elapsed.
pub async fn run(config: ConnectionConfig, count: Option<usize>, seconds: u64) -> ClientResult<()> {
    let connection = Connection::connect(config.with_notification_mode(NotificationMode::Queue)).await?;
    let deadline = Instant::now() + Duration::from_secs(seconds);
    let mut received = 0usize;

    while count.is_none_or(|count| received < count) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || !connection.is_open() {
            break;
        }
        if let Some(notification) = connection.next_notification(remaining).await {
            print_envelope(&notification)?;
            received += 1;
        }
    }

    debug!(received, "listen finished");
    connection.close().await
}
