use std::sync::Arc;

use chrono::{DateTime, Local, TimeZone, Utc};
use tracing::{info, warn};

use crate::db::ItemStore;
use crate::error::{AppError, AppResult};
use crate::filter::ItemFilter;
use crate::models::{Item, NO_DUE_DATE, NewItemRequest, UpdateItemRequest};
use crate::notifier::Notifier;
use crate::repository::CachedRepository;
use crate::services::ReminderScheduler;

/// The commands the presentation layer issues, with reminders kept in step
/// with item due dates.
pub struct TodoService<S: ItemStore + 'static> {
    repository: CachedRepository<S>,
    reminders: ReminderScheduler,
}

impl<S: ItemStore + 'static> TodoService<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            repository: CachedRepository::new(store),
            reminders: ReminderScheduler::new(notifier),
        }
    }

    pub fn reminders(&self) -> &ReminderScheduler {
        &self.reminders
    }

    pub async fn create_item(&self, req: NewItemRequest) -> AppResult<Item> {
        let due_date = req.due_date.map(normalize_due_date).unwrap_or(NO_DUE_DATE);
        let item = Item::new(req.title, req.content, due_date);
        if item.is_empty() {
            return Err(AppError::BadRequest("To do items cannot be empty".to_string()));
        }

        self.repository.save_item(&item);
        if item.has_due_date() {
            self.reminders
                .schedule(&item.id, item.due_date, item.title_for_list());
        }

        info!("created item {}", item.id);
        Ok(item)
    }

    pub async fn update_item(&self, id: &str, req: UpdateItemRequest) -> AppResult<Item> {
        let current = self.repository.get_item(id).await?;

        let mut updated = current.clone();
        if let Some(title) = req.title {
            updated.title = title;
        }
        if let Some(content) = req.content {
            updated.content = content;
        }
        if let Some(due_date) = req.due_date {
            updated.due_date = normalize_due_date(due_date);
        }
        if updated.is_empty() {
            return Err(AppError::BadRequest("To do items cannot be empty".to_string()));
        }

        self.repository.save_item(&updated);
        if updated.has_due_date() {
            self.reminders
                .schedule(&updated.id, updated.due_date, updated.title_for_list());
        } else if current.has_due_date() {
            self.reminders.cancel(&updated.id);
        }

        info!("updated item {}", updated.id);
        Ok(updated)
    }

    pub async fn get_item(&self, id: &str) -> AppResult<Item> {
        self.repository.get_item(id).await
    }

    pub async fn list_items(&self, filter: ItemFilter) -> AppResult<Vec<Item>> {
        self.list_items_at(filter, &Local::now()).await
    }

    pub async fn list_items_at<Tz: TimeZone>(
        &self,
        filter: ItemFilter,
        now: &DateTime<Tz>,
    ) -> AppResult<Vec<Item>> {
        let items = self.repository.get_all_items().await?;
        Ok(filter.apply(items, now))
    }

    pub async fn complete_item(&self, id: &str) -> AppResult<Item> {
        if let Some(item) = self.repository.complete_item_by_id(id) {
            return Ok(item);
        }
        let item = self.repository.get_item(id).await?;
        Ok(self.repository.complete_item(&item))
    }

    pub async fn activate_item(&self, id: &str) -> AppResult<Item> {
        if let Some(item) = self.repository.activate_item_by_id(id) {
            return Ok(item);
        }
        let item = self.repository.get_item(id).await?;
        Ok(self.repository.activate_item(&item))
    }

    pub async fn delete_item(&self, id: &str) -> AppResult<()> {
        self.repository.delete_item(id).await?;
        self.reminders.cancel(id);
        info!("deleted item {}", id);
        Ok(())
    }

    /// Removes completed items and their reminders. Returns how many were cleared.
    pub async fn clear_completed(&self) -> usize {
        // Pruning only sees what is cached, so take a full listing first.
        if let Err(e) = self.repository.get_all_items().await {
            warn!("clearing completed items without a full listing: {}", e);
        }

        let cleared = self.repository.clear_completed_items();
        for id in &cleared {
            self.reminders.cancel(id);
        }

        info!("cleared {} completed item(s)", cleared.len());
        cleared.len()
    }

    pub async fn delete_all(&self) -> AppResult<()> {
        self.repository.delete_all_items().await?;
        self.reminders.cancel_all();
        info!("deleted all items");
        Ok(())
    }

    /// Re-arms reminders for active items whose due date is still ahead.
    pub async fn restore_reminders(&self) -> AppResult<usize> {
        let now = Utc::now().timestamp_millis();
        let items = self.repository.get_all_items().await?;

        let mut restored = 0;
        for item in items.iter().filter(|i| i.is_active() && i.due_date > now) {
            self.reminders
                .schedule(&item.id, item.due_date, item.title_for_list());
            restored += 1;
        }

        info!("restored {} reminder(s)", restored);
        Ok(restored)
    }

    /// Disarms reminders and waits for queued store writes.
    pub async fn shutdown(&self) {
        self.reminders.cancel_all();
        self.repository.shutdown().await;
    }
}

/// Any negative due date means "none" and is stored as the sentinel.
fn normalize_due_date(due_date: i64) -> i64 {
    if due_date < 0 { NO_DUE_DATE } else { due_date }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::db::{self, SqliteItemStore};
    use crate::notifier::NoopNotifier;

    async fn setup() -> (sqlx::SqlitePool, TodoService<SqliteItemStore>) {
        let pool = db::connect_in_memory()
            .await
            .expect("Failed to create test db");
        let service = TodoService::new(
            Arc::new(SqliteItemStore::new(pool.clone())),
            Arc::new(NoopNotifier),
        );
        (pool, service)
    }

    fn new_item(title: &str, due_date: Option<i64>) -> NewItemRequest {
        NewItemRequest {
            title: title.to_string(),
            content: String::new(),
            due_date,
        }
    }

    fn in_hours(hours: i64) -> i64 {
        (Utc::now() + Duration::hours(hours)).timestamp_millis()
    }

    #[tokio::test]
    async fn test_create_rejects_empty_item() {
        let (_pool, service) = setup().await;

        let err = service
            .create_item(new_item("", None))
            .await
            .expect_err("empty item should be rejected");
        assert!(matches!(err, AppError::BadRequest(_)));

        let content_only = NewItemRequest {
            title: String::new(),
            content: "x".to_string(),
            due_date: None,
        };
        assert!(service.create_item(content_only).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_schedules_reminder_only_with_due_date() {
        let (_pool, service) = setup().await;

        let plain = service
            .create_item(new_item("plain", None))
            .await
            .expect("Failed to create item");
        assert_eq!(plain.due_date, NO_DUE_DATE);
        assert!(!service.reminders().is_scheduled(&plain.id));

        let dated = service
            .create_item(new_item("dated", Some(in_hours(2))))
            .await
            .expect("Failed to create item");
        assert!(service.reminders().is_scheduled(&dated.id));
    }

    #[tokio::test]
    async fn test_create_stores_negative_due_date_as_unset() {
        let (pool, service) = setup().await;

        let item = service
            .create_item(new_item("someday", Some(-5)))
            .await
            .expect("Failed to create item");
        assert_eq!(item.due_date, NO_DUE_DATE);
        assert!(!service.reminders().is_scheduled(&item.id));

        service.repository.flush().await;
        let stored = db::repository::find_item_by_id(&pool, &item.id)
            .await
            .expect("Failed to find item")
            .expect("Item not found");
        assert_eq!(stored.due_date, NO_DUE_DATE);
    }

    #[tokio::test]
    async fn test_update_clearing_due_date_cancels_reminder() {
        let (_pool, service) = setup().await;

        let item = service
            .create_item(new_item("dated", Some(in_hours(2))))
            .await
            .expect("Failed to create item");

        let updated = service
            .update_item(
                &item.id,
                UpdateItemRequest {
                    due_date: Some(NO_DUE_DATE),
                    ..Default::default()
                },
            )
            .await
            .expect("Failed to update item");

        assert_eq!(updated.due_date, NO_DUE_DATE);
        assert_eq!(updated.title, "dated");
        assert!(!service.reminders().is_scheduled(&item.id));
    }

    #[tokio::test]
    async fn test_update_rejects_emptied_item() {
        let (_pool, service) = setup().await;

        let item = service
            .create_item(new_item("title", None))
            .await
            .expect("Failed to create item");

        let err = service
            .update_item(
                &item.id,
                UpdateItemRequest {
                    title: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .expect_err("emptied item should be rejected");
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(service.get_item(&item.id).await.expect("get failed"), item);
    }

    #[tokio::test]
    async fn test_update_missing_item() {
        let (_pool, service) = setup().await;

        let err = service
            .update_item("missing", UpdateItemRequest::default())
            .await
            .expect_err("item should be missing");
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn test_complete_and_activate_by_id() {
        let (pool, service) = setup().await;

        // Only in the store, not yet cached.
        let stored = Item::new("stored", "", NO_DUE_DATE);
        db::repository::upsert_item(&pool, &stored)
            .await
            .expect("Failed to seed item");

        let completed = service.complete_item(&stored.id).await.expect("complete failed");
        assert!(completed.completed);

        let active = service.activate_item(&stored.id).await.expect("activate failed");
        assert!(!active.completed);

        let err = service.complete_item("missing").await.expect_err("should be missing");
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn test_list_items_with_filter() {
        let (_pool, service) = setup().await;
        let now = Utc::now();

        let past = service
            .create_item(new_item("b past", Some((now - Duration::hours(1)).timestamp_millis())))
            .await
            .expect("Failed to create item");
        let plain = service
            .create_item(new_item("a plain", None))
            .await
            .expect("Failed to create item");
        service.complete_item(&plain.id).await.expect("complete failed");

        let all = service
            .list_items_at(ItemFilter::All, &now)
            .await
            .expect("Failed to list items");
        assert_eq!(
            all.iter().map(|i| i.title.as_str()).collect::<Vec<_>>(),
            vec!["a plain", "b past"]
        );

        let past_due = service
            .list_items_at(ItemFilter::PastDue, &now)
            .await
            .expect("Failed to list items");
        assert_eq!(past_due, vec![past]);

        let complete = service
            .list_items_at(ItemFilter::Complete, &now)
            .await
            .expect("Failed to list items");
        assert_eq!(complete.len(), 1);
        assert_eq!(complete[0].id, plain.id);
    }

    #[tokio::test]
    async fn test_clear_completed_cancels_reminders() {
        let (pool, service) = setup().await;

        let done = service
            .create_item(new_item("done", Some(in_hours(3))))
            .await
            .expect("Failed to create item");
        let open = service
            .create_item(new_item("open", Some(in_hours(3))))
            .await
            .expect("Failed to create item");
        service.complete_item(&done.id).await.expect("complete failed");

        assert_eq!(service.clear_completed().await, 1);
        assert!(!service.reminders().is_scheduled(&done.id));
        assert!(service.reminders().is_scheduled(&open.id));

        service.shutdown().await;
        let stored = db::repository::fetch_items(&pool)
            .await
            .expect("Failed to fetch items");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, open.id);
    }

    #[tokio::test]
    async fn test_delete_item_and_delete_all() {
        let (_pool, service) = setup().await;

        let a = service
            .create_item(new_item("a", Some(in_hours(1))))
            .await
            .expect("Failed to create item");
        let b = service
            .create_item(new_item("b", Some(in_hours(1))))
            .await
            .expect("Failed to create item");

        service.delete_item(&a.id).await.expect("delete failed");
        assert!(!service.reminders().is_scheduled(&a.id));
        assert!(matches!(service.get_item(&a.id).await, Err(AppError::NotFound)));

        service.delete_all().await.expect("delete all failed");
        assert_eq!(service.reminders().scheduled_count(), 0);
        assert!(matches!(service.get_item(&b.id).await, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn test_restore_reminders() {
        let (pool, service) = setup().await;

        let upcoming = Item::new("upcoming", "", in_hours(5));
        let overdue = Item::new("overdue", "", in_hours(-5));
        let mut finished = Item::new("finished", "", in_hours(5));
        finished.completed = true;
        let undated = Item::new("undated", "", NO_DUE_DATE);
        for item in [&upcoming, &overdue, &finished, &undated] {
            db::repository::upsert_item(&pool, item)
                .await
                .expect("Failed to seed item");
        }

        let restored = service.restore_reminders().await.expect("restore failed");
        assert_eq!(restored, 1);
        assert!(service.reminders().is_scheduled(&upcoming.id));
        assert_eq!(service.reminders().scheduled_count(), 1);
    }
}
