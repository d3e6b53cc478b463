//! Long-polling feed delivery.
//!
//! A poll re-runs the visibility-filtered item query until it returns
//! something or the deadline passes. The deadline timer and the retry loop
//! race inside one `tokio::select!`; whichever finishes first answers.
//!
//! ```text
//! poll(viewer, cursor)
//!   ├── sleep(timeout)              → empty page, cursor unchanged
//!   └── loop
//!         query → non-empty         → page, cursor = max id
//!         query → empty             → wait(interval | announce) and retry
//! ```
//!
//! Two orderings are kept apart on purpose: the incremental query walks
//! ids ascending so a full page always starts right after the cursor, and
//! the response is then flipped to newest first.
//!
//! Uploads call [`FeedPoller::announce`], which wakes every waiting poll so
//! it re-queries at once. The interval retry stays as the fallback for
//! items that arrive without an announcement (another process, a direct
//! store write).

use crate::config::FeedConfig;
use crate::model::{Item, ItemId, Viewer};
use crate::store::{Result, Store};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// Parse a client-supplied cursor. Absent, malformed, or non-positive
/// values all mean "no cursor": the poll returns the newest page.
pub fn parse_cursor(raw: Option<&str>) -> Option<ItemId> {
    raw.and_then(|s| s.trim().parse::<ItemId>().ok())
        .filter(|id| id.0 > 0)
}

/// One poll's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedPage {
    /// Highest delivered id, or the incoming cursor on timeout.
    pub cursor: Option<ItemId>,
    /// Newest first.
    pub items: Vec<Item>,
}

impl FeedPage {
    fn empty(cursor: Option<ItemId>) -> Self {
        Self {
            cursor,
            items: Vec::new(),
        }
    }
}

pub struct FeedPoller {
    store: Arc<dyn Store>,
    timeout: Duration,
    interval: Duration,
    page_size: usize,
    notify: Notify,
}

impl FeedPoller {
    pub fn new(store: Arc<dyn Store>, config: &FeedConfig) -> Self {
        Self {
            store,
            timeout: config.timeout(),
            interval: config.interval(),
            page_size: config.page_size,
            notify: Notify::new(),
        }
    }

    /// Wake every poll currently waiting between retries.
    pub fn announce(&self) {
        self.notify.notify_waiters();
    }

    /// Block until items past `cursor` become visible to `viewer`, or the
    /// deadline elapses.
    pub async fn poll(&self, viewer: Viewer, cursor: Option<ItemId>) -> Result<FeedPage> {
        tokio::select! {
            page = self.retry_until_found(viewer, cursor) => page,
            _ = tokio::time::sleep(self.timeout) => {
                debug!(?viewer, ?cursor, "feed poll timed out");
                Ok(FeedPage::empty(cursor))
            }
        }
    }

    async fn retry_until_found(&self, viewer: Viewer, cursor: Option<ItemId>) -> Result<FeedPage> {
        loop {
            // Register interest before querying so an announce that lands
            // between the query and the wait is not lost.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let items = self.query_once(viewer, cursor).await?;
            if let Some(newest) = items.first() {
                return Ok(FeedPage {
                    cursor: Some(newest.id),
                    items,
                });
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = &mut notified => {}
            }
        }
    }

    /// Single query round; result is newest first.
    async fn query_once(&self, viewer: Viewer, cursor: Option<ItemId>) -> Result<Vec<Item>> {
        match cursor {
            Some(after) => {
                let mut items = self
                    .store
                    .query_items_after(viewer, after, self.page_size)
                    .await?;
                items.reverse();
                Ok(items)
            }
            None => self.store.query_items_latest(viewer, self.page_size).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContentRef, User, Visibility};
    use crate::store::MemoryStore;
    use tokio::time::Instant;

    fn config() -> FeedConfig {
        FeedConfig {
            timeout_secs: 30,
            interval_secs: 2,
            page_size: 30,
        }
    }

    async fn setup() -> (Arc<MemoryStore>, Arc<FeedPoller>, User, User) {
        let store = Arc::new(MemoryStore::new());
        let poller = Arc::new(FeedPoller::new(store.clone(), &config()));
        let alice = store
            .create_user("alice", "ka", ContentRef::default_icon())
            .await
            .unwrap();
        let bob = store
            .create_user("bob", "kb", ContentRef::default_icon())
            .await
            .unwrap();
        (store, poller, alice, bob)
    }

    async fn post(store: &MemoryStore, owner: &User, visibility: Visibility) -> Item {
        store
            .insert_item(owner.id, ContentRef::generate(), visibility)
            .await
            .unwrap()
    }

    // =========================================================================
    // Cursor parsing
    // =========================================================================

    #[test]
    fn cursor_parsing() {
        assert_eq!(parse_cursor(Some("12")), Some(ItemId(12)));
        assert_eq!(parse_cursor(Some(" 3 ")), Some(ItemId(3)));
        assert_eq!(parse_cursor(Some("0")), None);
        assert_eq!(parse_cursor(Some("-4")), None);
        assert_eq!(parse_cursor(Some("abc")), None);
        assert_eq!(parse_cursor(Some("")), None);
        assert_eq!(parse_cursor(None), None);
    }

    // =========================================================================
    // Immediate answers
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn no_cursor_returns_newest_page_descending() {
        let (store, poller, alice, _) = setup().await;
        for _ in 0..3 {
            post(&store, &alice, Visibility::Private).await;
        }

        let start = Instant::now();
        let page = poller.poll(Viewer::User(alice.id), None).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        let ids: Vec<i64> = page.items.iter().map(|i| i.id.0).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(page.cursor, Some(ItemId(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn cursor_returns_strictly_newer_items_newest_first() {
        let (store, poller, alice, _) = setup().await;
        for _ in 0..5 {
            post(&store, &alice, Visibility::Public).await;
        }

        let page = poller
            .poll(Viewer::User(alice.id), Some(ItemId(2)))
            .await
            .unwrap();
        let ids: Vec<i64> = page.items.iter().map(|i| i.id.0).collect();
        assert_eq!(ids, vec![5, 4, 3]);
        assert_eq!(page.cursor, Some(ItemId(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn full_page_after_cursor_starts_right_after_it() {
        let store = Arc::new(MemoryStore::new());
        let poller = FeedPoller::new(
            store.clone(),
            &FeedConfig {
                page_size: 2,
                ..config()
            },
        );
        let alice = store
            .create_user("alice", "ka", ContentRef::default_icon())
            .await
            .unwrap();
        for _ in 0..6 {
            post(&store, &alice, Visibility::Public).await;
        }

        let page = poller
            .poll(Viewer::User(alice.id), Some(ItemId(1)))
            .await
            .unwrap();
        let ids: Vec<i64> = page.items.iter().map(|i| i.id.0).collect();
        assert_eq!(ids, vec![3, 2]);
        assert_eq!(page.cursor, Some(ItemId(3)));
    }

    // =========================================================================
    // Waiting
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn empty_poll_times_out_with_cursor_unchanged() {
        let (_store, poller, alice, _) = setup().await;

        let start = Instant::now();
        let page = poller
            .poll(Viewer::User(alice.id), Some(ItemId(7)))
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert!(page.items.is_empty());
        assert_eq!(page.cursor, Some(ItemId(7)));
        assert!(elapsed >= Duration::from_secs(28), "{elapsed:?}");
        assert!(elapsed <= Duration::from_secs(32), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn item_inserted_mid_poll_is_delivered_by_retry() {
        let (store, poller, alice, bob) = setup().await;

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                post(&store, &bob, Visibility::Public).await
            })
        };

        let start = Instant::now();
        let page = poller.poll(Viewer::User(alice.id), None).await.unwrap();
        let elapsed = start.elapsed();
        let inserted = writer.await.unwrap();

        assert_eq!(page.items, vec![inserted.clone()]);
        assert_eq!(page.cursor, Some(inserted.id));
        // No announce: picked up on the next retry tick
        assert!(elapsed >= Duration::from_secs(1), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(30), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn announce_wakes_waiting_poll_immediately() {
        let (store, poller, alice, bob) = setup().await;

        let writer = {
            let store = store.clone();
            let poller = poller.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                let item = post(&store, &bob, Visibility::Public).await;
                poller.announce();
                item
            })
        };

        let start = Instant::now();
        let page = poller.poll(Viewer::User(alice.id), None).await.unwrap();
        let elapsed = start.elapsed();
        let inserted = writer.await.unwrap();

        assert_eq!(page.cursor, Some(inserted.id));
        assert!(elapsed < Duration::from_secs(2), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn invisible_items_do_not_end_the_wait() {
        let (store, poller, alice, bob) = setup().await;
        post(&store, &bob, Visibility::Private).await;
        post(&store, &bob, Visibility::Followers).await;

        let start = Instant::now();
        let page = poller.poll(Viewer::User(alice.id), None).await.unwrap();
        let elapsed = start.elapsed();

        assert!(page.items.is_empty());
        assert_eq!(page.cursor, None);
        assert!(elapsed >= Duration::from_secs(28), "{elapsed:?}");
        assert!(elapsed <= Duration::from_secs(32), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn follow_makes_followers_items_visible() {
        let (store, poller, alice, bob) = setup().await;
        let item = post(&store, &bob, Visibility::Followers).await;
        store.insert_edge(alice.id, bob.id).await.unwrap();

        let page = poller.poll(Viewer::User(alice.id), None).await.unwrap();
        assert_eq!(page.items, vec![item]);
    }

    #[tokio::test(start_paused = true)]
    async fn deleted_item_disappears_from_next_poll() {
        let (store, poller, alice, _) = setup().await;
        let keep = post(&store, &alice, Visibility::Public).await;
        let gone = post(&store, &alice, Visibility::Public).await;

        let first = poller.poll(Viewer::User(alice.id), None).await.unwrap();
        assert_eq!(first.items.len(), 2);

        store.delete_item(gone.id).await.unwrap();
        let second = poller.poll(Viewer::User(alice.id), None).await.unwrap();
        assert_eq!(second.items, vec![keep.clone()]);
        assert_eq!(second.cursor, Some(keep.id));
    }

    #[tokio::test(start_paused = true)]
    async fn anonymous_viewer_sees_public_only() {
        let (store, poller, alice, _) = setup().await;
        post(&store, &alice, Visibility::Private).await;
        let public = post(&store, &alice, Visibility::Public).await;

        let page = poller.poll(Viewer::Anonymous, None).await.unwrap();
        assert_eq!(page.items, vec![public]);
    }
}
