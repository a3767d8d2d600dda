use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::db::ItemStore;
use crate::error::{AppError, AppResult};
use crate::models::Item;

/// What the repository knows about the store's contents.
#[derive(Debug, Default)]
enum CacheState {
    /// Nothing cached yet.
    #[default]
    Uninitialized,
    /// Entries known from writes or point lookups; not a complete listing.
    Partial(HashMap<String, Item>),
    /// A full listing was read from the store.
    Loaded(HashMap<String, Item>),
}

impl CacheState {
    fn get(&self, id: &str) -> Option<&Item> {
        match self {
            CacheState::Uninitialized => None,
            CacheState::Partial(items) | CacheState::Loaded(items) => items.get(id),
        }
    }

    fn insert(&mut self, item: Item) {
        match self {
            CacheState::Uninitialized => {
                *self = CacheState::Partial(HashMap::from([(item.id.clone(), item)]));
            }
            CacheState::Partial(items) | CacheState::Loaded(items) => {
                items.insert(item.id.clone(), item);
            }
        }
    }

    fn remove(&mut self, id: &str) -> Option<Item> {
        match self {
            CacheState::Uninitialized => None,
            CacheState::Partial(items) | CacheState::Loaded(items) => items.remove(id),
        }
    }

    fn clear(&mut self) {
        if let CacheState::Partial(items) | CacheState::Loaded(items) = self {
            items.clear();
        }
    }

    /// Removes completed entries, returning their ids.
    fn prune_completed(&mut self) -> Vec<String> {
        let (CacheState::Partial(items) | CacheState::Loaded(items)) = self else {
            return Vec::new();
        };
        let removed: Vec<String> = items
            .values()
            .filter(|item| item.completed)
            .map(|item| item.id.clone())
            .collect();
        items.retain(|_, item| !item.completed);
        removed
    }

    fn apply(&mut self, change: &Change) {
        match change {
            Change::Put(item) => self.insert(item.clone()),
            Change::Remove(id) => {
                self.remove(id);
            }
            Change::Clear => self.clear(),
            Change::PruneCompleted => {
                self.prune_completed();
            }
        }
    }

    /// The cached listing, sorted by title. Only a full listing counts.
    fn listing(&self) -> Option<Vec<Item>> {
        match self {
            CacheState::Loaded(items) => {
                let mut listing: Vec<Item> = items.values().cloned().collect();
                sort_by_title(&mut listing);
                Some(listing)
            }
            _ => None,
        }
    }
}

fn sort_by_title(items: &mut [Item]) {
    items.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
}

/// A cache mutation made through the repository.
#[derive(Debug)]
enum Change {
    Put(Item),
    Remove(String),
    Clear,
    PruneCompleted,
}

impl Change {
    /// Whether this change could make a store read of `item` stale.
    fn touches(&self, item: &Item) -> bool {
        match self {
            Change::Put(put) => put.id == item.id,
            Change::Remove(id) => *id == item.id,
            Change::Clear => true,
            Change::PruneCompleted => item.completed,
        }
    }
}

/// Cache contents plus a journal of changes made while store reads are in
/// flight, so a read that started earlier cannot overwrite them.
#[derive(Debug, Default)]
struct Cache {
    state: CacheState,
    generation: u64,
    journal: Vec<(u64, Change)>,
    reads_in_flight: usize,
}

impl Cache {
    fn record(&mut self, change: Change) {
        self.generation += 1;
        if self.reads_in_flight > 0 {
            self.journal.push((self.generation, change));
        }
    }

    fn changes_since(&self, since: u64) -> impl Iterator<Item = &Change> {
        self.journal
            .iter()
            .filter(move |(generation, _)| *generation > since)
            .map(|(_, change)| change)
    }

    fn put(&mut self, item: Item) {
        self.state.insert(item.clone());
        self.record(Change::Put(item));
    }

    fn remove(&mut self, id: &str) {
        self.state.remove(id);
        self.record(Change::Remove(id.to_string()));
    }

    fn clear(&mut self) {
        self.state.clear();
        self.record(Change::Clear);
    }

    fn prune_completed(&mut self) -> Vec<String> {
        let removed = self.state.prune_completed();
        self.record(Change::PruneCompleted);
        removed
    }

    /// Installs a full listing read from the store, replaying changes made
    /// since the read began on top of it.
    fn refresh(&mut self, fetched: Vec<Item>, since: u64) {
        if matches!(self.state, CacheState::Loaded(_)) {
            return;
        }
        let mut loaded = CacheState::Loaded(
            fetched
                .into_iter()
                .map(|item| (item.id.clone(), item))
                .collect(),
        );
        for change in self.changes_since(since) {
            loaded.apply(change);
        }
        self.state = loaded;
    }

    /// Caches a point read unless a newer change already covers that item.
    fn insert_fetched(&mut self, item: Item, since: u64) {
        if self.state.get(&item.id).is_some() {
            return;
        }
        if self.changes_since(since).any(|change| change.touches(&item)) {
            return;
        }
        self.state.insert(item);
    }
}

/// Marks a store read in flight. Dropping it lets the journal be discarded
/// once no read needs it.
struct StoreRead<'a> {
    cache: &'a RwLock<Cache>,
    since: u64,
}

impl Drop for StoreRead<'_> {
    fn drop(&mut self) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.reads_in_flight -= 1;
        if cache.reads_in_flight == 0 {
            cache.journal.clear();
        }
    }
}

/// Store writes issued without the caller waiting on them.
enum WriteOp {
    Upsert(Item),
    SetCompleted { id: String, completed: bool },
    DeleteCompleted,
    Flush(oneshot::Sender<()>),
}

async fn run_writer<S: ItemStore>(store: Arc<S>, mut ops: mpsc::UnboundedReceiver<WriteOp>) {
    while let Some(op) = ops.recv().await {
        match op {
            WriteOp::Upsert(item) => {
                if let Err(e) = store.upsert(&item).await {
                    error!("failed to save item {}: {}", item.id, e);
                }
            }
            WriteOp::SetCompleted { id, completed } => {
                if let Err(e) = store.set_completed(&id, completed).await {
                    error!("failed to set completed={} on item {}: {}", completed, id, e);
                }
            }
            WriteOp::DeleteCompleted => match store.delete_completed().await {
                Ok(removed) => debug!("cleared {} completed item(s) from store", removed),
                Err(e) => error!("failed to clear completed items: {}", e),
            },
            WriteOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("store writer stopped");
}

/// Read-through, write-through cache in front of an [`ItemStore`].
///
/// Writes that callers do not wait on are queued to a writer task owned by
/// the repository and applied to the store in the order they were issued.
/// A write is queued under the same cache lock that applies it, so the
/// store sees writes in cache order. [`CachedRepository::shutdown`] drains
/// that queue.
pub struct CachedRepository<S: ItemStore + 'static> {
    store: Arc<S>,
    cache: RwLock<Cache>,
    writes: Mutex<Option<mpsc::UnboundedSender<WriteOp>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl<S: ItemStore + 'static> CachedRepository<S> {
    /// Must be called from within a tokio runtime.
    pub fn new(store: Arc<S>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_writer(store.clone(), rx));

        Self {
            store,
            cache: RwLock::new(Cache::default()),
            writes: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
        }
    }

    /// All items sorted by title, from the cache when a full listing is held.
    pub async fn get_all_items(&self) -> AppResult<Vec<Item>> {
        if let Some(items) = self.cache_read().state.listing() {
            return Ok(items);
        }

        let read = self.begin_store_read();
        self.flush().await;
        let fetched = self.store.list_all().await;
        if let Ok(items) = &fetched {
            self.cache_write().refresh(items.clone(), read.since);
        }
        drop(read);

        if let Some(items) = self.cache_read().state.listing() {
            return Ok(items);
        }

        match fetched {
            Ok(items) if items.is_empty() => Ok(items),
            Ok(_) => Err(AppError::IllegalState(
                "item cache empty after refresh".to_string(),
            )),
            Err(e) => {
                error!("failed to load items: {}", e);
                Err(AppError::IllegalState(format!("error fetching items: {}", e)))
            }
        }
    }

    pub async fn get_item(&self, id: &str) -> AppResult<Item> {
        if let Some(item) = self.cached(id) {
            return Ok(item);
        }

        let read = self.begin_store_read();
        self.flush().await;
        match self.store.get_by_id(id).await? {
            Some(item) => {
                self.cache_write().insert_fetched(item.clone(), read.since);
                Ok(item)
            }
            None => Err(AppError::NotFound),
        }
    }

    /// Cached copy of `id`, without touching the store.
    pub fn cached(&self, id: &str) -> Option<Item> {
        self.cache_read().state.get(id).cloned()
    }

    pub fn save_item(&self, item: &Item) {
        self.write_through(WriteOp::Upsert(item.clone()), |cache| {
            cache.put(item.clone())
        });
    }

    /// Marks `item` completed and returns the updated copy.
    pub fn complete_item(&self, item: &Item) -> Item {
        self.set_completed(item, true)
    }

    pub fn complete_item_by_id(&self, id: &str) -> Option<Item> {
        let item = self.cached(id)?;
        Some(self.complete_item(&item))
    }

    /// Marks `item` active again and returns the updated copy.
    pub fn activate_item(&self, item: &Item) -> Item {
        self.set_completed(item, false)
    }

    pub fn activate_item_by_id(&self, id: &str) -> Option<Item> {
        let item = self.cached(id)?;
        Some(self.activate_item(&item))
    }

    fn set_completed(&self, item: &Item, completed: bool) -> Item {
        let mut updated = item.clone();
        updated.completed = completed;
        let op = WriteOp::SetCompleted {
            id: updated.id.clone(),
            completed,
        };
        self.write_through(op, |cache| cache.put(updated.clone()));
        updated
    }

    /// Best effort: the cache is pruned whether or not the store delete succeeds.
    /// Returns the ids pruned from the cache.
    pub fn clear_completed_items(&self) -> Vec<String> {
        self.write_through(WriteOp::DeleteCompleted, Cache::prune_completed)
    }

    pub async fn delete_all_items(&self) -> AppResult<()> {
        self.flush().await;
        self.store.delete_all().await?;
        self.cache_write().clear();
        Ok(())
    }

    pub async fn delete_item(&self, id: &str) -> AppResult<()> {
        self.flush().await;
        self.store.delete_by_id(id).await?;
        self.cache_write().remove(id);
        Ok(())
    }

    /// Waits until every write queued so far has been applied to the store.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.enqueue(WriteOp::Flush(done)) {
            let _ = wait.await;
        }
    }

    /// Drains queued writes and stops the writer. Later writes only reach the cache.
    pub async fn shutdown(&self) {
        let sender = self
            .writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);

        let writer = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                error!("store writer task failed: {}", e);
            }
        }
    }

    fn write_through<R>(&self, op: WriteOp, change: impl FnOnce(&mut Cache) -> R) -> R {
        let mut cache = self.cache_write();
        self.enqueue(op);
        change(&mut cache)
    }

    fn begin_store_read(&self) -> StoreRead<'_> {
        let mut cache = self.cache_write();
        cache.reads_in_flight += 1;
        StoreRead {
            cache: &self.cache,
            since: cache.generation,
        }
    }

    fn enqueue(&self, op: WriteOp) -> bool {
        let writes = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        let sent = match writes.as_ref() {
            Some(tx) => tx.send(op).is_ok(),
            None => false,
        };
        if !sent {
            warn!("store writer is closed; write dropped");
        }
        sent
    }

    fn cache_read(&self) -> RwLockReadGuard<'_, Cache> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn cache_write(&self) -> RwLockWriteGuard<'_, Cache> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn is_loaded(&self) -> bool {
        matches!(self.cache_read().state, CacheState::Loaded(_))
    }

    #[cfg(test)]
    fn cached_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = match &self.cache_read().state {
            CacheState::Uninitialized => Vec::new(),
            CacheState::Partial(items) | CacheState::Loaded(items) => {
                items.keys().cloned().collect()
            }
        };
        ids.sort();
        ids
    }
}
