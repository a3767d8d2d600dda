use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::Item;

/// Which items a listing shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFilter {
    #[default]
    All,
    #[serde(alias = "active")]
    Incomplete,
    #[serde(alias = "completed")]
    Complete,
    WithDueDate,
    PastDue,
    DueToday,
    DueThisWeek,
}

impl ItemFilter {
    pub const VARIANTS: [ItemFilter; 7] = [
        ItemFilter::All,
        ItemFilter::Incomplete,
        ItemFilter::Complete,
        ItemFilter::WithDueDate,
        ItemFilter::PastDue,
        ItemFilter::DueToday,
        ItemFilter::DueThisWeek,
    ];

    /// Classifies `item` at instant `now`. Calendar comparisons use `now`'s time zone.
    pub fn matches<Tz: TimeZone>(&self, item: &Item, now: &DateTime<Tz>) -> bool {
        match self {
            ItemFilter::All => true,
            ItemFilter::Incomplete => item.is_active(),
            ItemFilter::Complete => item.completed,
            ItemFilter::WithDueDate => item.has_due_date(),
            ItemFilter::PastDue => {
                item.has_due_date() && item.due_date < now.timestamp_millis()
            }
            ItemFilter::DueToday => item
                .due_at()
                .map(|due| due.with_timezone(&now.timezone()).date_naive() == now.date_naive())
                .unwrap_or(false),
            ItemFilter::DueThisWeek => item
                .due_at()
                .map(|due| due.with_timezone(&now.timezone()).iso_week() == now.iso_week())
                .unwrap_or(false),
        }
    }

    /// Keeps the matching items in their original order.
    pub fn apply<Tz: TimeZone>(&self, items: Vec<Item>, now: &DateTime<Tz>) -> Vec<Item> {
        items
            .into_iter()
            .filter(|item| self.matches(item, now))
            .collect()
    }

    pub fn label(&self) -> &'static str {
        match self {
            ItemFilter::All => "All items",
            ItemFilter::Incomplete => "Active items",
            ItemFilter::Complete => "Completed items",
            ItemFilter::WithDueDate => "Items with due dates",
            ItemFilter::PastDue => "Items past due",
            ItemFilter::DueToday => "Items due today",
            ItemFilter::DueThisWeek => "Items due this week",
        }
    }

    /// Text shown when nothing matches.
    pub fn empty_message(&self) -> &'static str {
        match self {
            ItemFilter::All => "You have no to do items!",
            ItemFilter::Incomplete => "You have no active to do items!",
            ItemFilter::Complete => "You have no completed to do items!",
            ItemFilter::WithDueDate => "You have no to do items with due dates!",
            ItemFilter::PastDue => "You have no to do items past due!",
            ItemFilter::DueToday => "You have no to do items due today!",
            ItemFilter::DueThisWeek => "You have no to do items due this week!",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemFilter::All => "all",
            ItemFilter::Incomplete => "incomplete",
            ItemFilter::Complete => "complete",
            ItemFilter::WithDueDate => "with_due_date",
            ItemFilter::PastDue => "past_due",
            ItemFilter::DueToday => "due_today",
            ItemFilter::DueThisWeek => "due_this_week",
        }
    }
}

impl fmt::Display for ItemFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemFilter {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(ItemFilter::All),
            "incomplete" | "active" => Ok(ItemFilter::Incomplete),
            "complete" | "completed" => Ok(ItemFilter::Complete),
            "with_due_date" => Ok(ItemFilter::WithDueDate),
            "past_due" => Ok(ItemFilter::PastDue),
            "due_today" => Ok(ItemFilter::DueToday),
            "due_this_week" => Ok(ItemFilter::DueThisWeek),
            other => {
                let known: Vec<&str> = ItemFilter::VARIANTS.iter().map(|f| f.as_str()).collect();
                Err(AppError::BadRequest(format!(
                    "unknown filter: {} (expected one of {})",
                    other,
                    known.join(", ")
                )))
            }
        }
    }
}
