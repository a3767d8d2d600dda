use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::notifier::{Notifier, Reminder};

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

type Timers = Arc<Mutex<HashMap<String, Timer>>>;

/// One-shot reminder timers, at most one per item.
pub struct ReminderScheduler {
    notifier: Arc<dyn Notifier>,
    timers: Timers,
    generation: AtomicU64,
}

impl ReminderScheduler {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            timers: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Arms a timer for `item_id` firing at `trigger_at` (epoch millis),
    /// replacing any timer already armed for that item. Past triggers fire
    /// immediately.
    pub fn schedule(&self, item_id: &str, trigger_at: i64, title: &str) {
        let reminder = Reminder::new(item_id, trigger_at, title);
        let delay = delay_until(trigger_at);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        // Held across the spawn so a timer that fires at once cannot try to
        // remove itself before it is registered.
        let mut timers = lock(&self.timers);

        let notifier = self.notifier.clone();
        let registry = self.timers.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if let Err(e) = notifier.notify(&reminder).await {
                warn!("failed to deliver reminder for item {}: {}", reminder.item_id, e);
            }

            let mut timers = lock(&registry);
            if timers
                .get(&reminder.item_id)
                .is_some_and(|t| t.generation == generation)
            {
                timers.remove(&reminder.item_id);
            }
        });

        if let Some(previous) = timers.insert(item_id.to_string(), Timer { generation, handle }) {
            previous.handle.abort();
            debug!("re-armed reminder for item {}", item_id);
        }
        info!("reminder for item {} scheduled in {:?}", item_id, delay);
    }

    /// Disarms the timer for `item_id`, if any.
    pub fn cancel(&self, item_id: &str) -> bool {
        match lock(&self.timers).remove(item_id) {
            Some(timer) => {
                timer.handle.abort();
                info!("reminder for item {} cancelled", item_id);
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let mut timers = lock(&self.timers);
        for (_, timer) in timers.drain() {
            timer.handle.abort();
        }
    }

    pub fn is_scheduled(&self, item_id: &str) -> bool {
        lock(&self.timers).contains_key(item_id)
    }

    pub fn scheduled_count(&self) -> usize {
        lock(&self.timers).len()
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

fn lock(timers: &Timers) -> std::sync::MutexGuard<'_, HashMap<String, Timer>> {
    timers.lock().unwrap_or_else(PoisonError::into_inner)
}

fn delay_until(trigger_at: i64) -> Duration {
    let remaining = trigger_at.saturating_sub(Utc::now().timestamp_millis());
    Duration::from_millis(u64::try_from(remaining).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_until() {
        assert_eq!(delay_until(0), Duration::ZERO);

        let in_a_minute = Utc::now().timestamp_millis() + 60_000;
        let delay = delay_until(in_a_minute);
        assert!(delay <= Duration::from_secs(60));
        assert!(delay > Duration::from_secs(50));
    }
}
