use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// `due_date` value meaning "no due date set".
pub const NO_DUE_DATE: i64 = -1;

const DUE_DATE_FORMAT: &str = "%d/%m/%Y, %I:%M %p";

/// A single to-do entry as stored in the `to_do_items` table.
///
/// `due_date` is milliseconds since the Unix epoch, or [`NO_DUE_DATE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub content: String,
    pub completed: bool,
    pub due_date: i64,
}

impl Item {
    pub fn new(title: impl Into<String>, content: impl Into<String>, due_date: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            content: content.into(),
            completed: false,
            due_date,
        }
    }

    /// Title shown in listings; falls back to the content when the title is blank.
    pub fn title_for_list(&self) -> &str {
        if self.title.is_empty() {
            &self.content
        } else {
            &self.title
        }
    }

    pub fn is_active(&self) -> bool {
        !self.completed
    }

    /// An item with neither title nor content cannot be saved.
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.content.is_empty()
    }

    pub fn has_due_date(&self) -> bool {
        self.due_date >= 0
    }

    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        if !self.has_due_date() {
            return None;
        }
        DateTime::from_timestamp_millis(self.due_date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewItemRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub due_date: Option<i64>,
}

/// Partial edit of an item. A `due_date` of `-1` clears the due date.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateItemRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub due_date: Option<i64>,
}

/// Renders a due date as `dd/MM/yyyy, hh:mm AM`. Unset dates render as "".
pub fn format_due_date<Tz>(millis: i64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    if millis < 0 {
        return String::new();
    }
    match DateTime::from_timestamp_millis(millis) {
        Some(dt) => dt.with_timezone(tz).format(DUE_DATE_FORMAT).to_string(),
        None => String::new(),
    }
}
