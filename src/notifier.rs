use async_trait::async_trait;
use chrono::Local;
use serde::Serialize;
use tracing::info;

use crate::error::AppResult;
use crate::models::format_due_date;

/// A due-date notification for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reminder {
    pub item_id: String,
    /// Milliseconds since the Unix epoch.
    pub trigger_at: i64,
    pub title: String,
}

impl Reminder {
    pub const BODY: &'static str = "This item is due!";

    pub fn new(item_id: impl Into<String>, trigger_at: i64, item_title: &str) -> Self {
        Self {
            item_id: item_id.into(),
            trigger_at,
            title: format!("To do: {}", item_title),
        }
    }
}

/// Shows reminders to the user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, reminder: &Reminder) -> AppResult<()>;
}

/// Writes reminders to the log.
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, reminder: &Reminder) -> AppResult<()> {
        info!(
            item_id = %reminder.item_id,
            due = %format_due_date(reminder.trigger_at, &Local),
            "{} - {}",
            reminder.title,
            Reminder::BODY
        );
        Ok(())
    }
}

pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _reminder: &Reminder) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reminder_title() {
        let reminder = Reminder::new("42", 1_700_000_000_000, "Homework");
        assert_eq!(reminder.title, "To do: Homework");
        assert_eq!(reminder.item_id, "42");
    }
}
