use std::sync::Arc;

use sqlx::SqlitePool;

use crate::db::SqliteItemStore;
use crate::notifier::Notifier;
use crate::services::TodoService;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub todos: Arc<TodoService<SqliteItemStore>>,
}

impl AppState {
    pub fn new(db: SqlitePool, notifier: Arc<dyn Notifier>) -> Self {
        let store = Arc::new(SqliteItemStore::new(db.clone()));
        Self {
            db,
            todos: Arc::new(TodoService::new(store, notifier)),
        }
    }
}
