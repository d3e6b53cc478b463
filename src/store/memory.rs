//! In-memory [`Store`] implementation.
//!
//! All state sits behind one `tokio::sync::RwLock`; each trait method takes
//! the lock once, which gives every operation single-statement atomicity.

use super::{Result, Store, StoreError};
use crate::model::{ContentRef, Edge, Item, ItemId, User, UserId, Viewer, Visibility};
use crate::visibility::is_visible;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    users: BTreeMap<UserId, User>,
    items: BTreeMap<ItemId, Item>,
    /// Insertion order; later entries are newer.
    edges: Vec<Edge>,
    last_user_id: i64,
    last_item_id: i64,
}

impl Inner {
    fn followees(&self, follower: UserId) -> HashSet<UserId> {
        self.edges
            .iter()
            .filter(|e| e.follower == follower)
            .map(|e| e.followee)
            .collect()
    }

    /// Visibility filter shared by both feed queries.
    fn visible_to(&self, viewer: Viewer) -> impl Fn(&&Item) -> bool + '_ {
        let followees = viewer.id().map(|id| self.followees(id)).unwrap_or_default();
        move |item: &&Item| is_visible(viewer, item, followees.contains(&item.owner))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, name: &str, api_key: &str, icon: ContentRef) -> Result<User> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.name == name) {
            return Err(StoreError::DuplicateName(name.to_string()));
        }
        inner.last_user_id += 1;
        let user = User {
            id: UserId(inner.last_user_id),
            name: name.to_string(),
            api_key: api_key.to_string(),
            icon,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_token(&self, api_key: &str) -> Result<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.api_key == api_key).cloned())
    }

    async fn set_icon(&self, id: UserId, icon: ContentRef) -> Result<()> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(&id)
            .ok_or(StoreError::UnknownUser(id))?;
        user.icon = icon;
        Ok(())
    }

    async fn insert_item(
        &self,
        owner: UserId,
        content_ref: ContentRef,
        visibility: Visibility,
    ) -> Result<Item> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(&owner) {
            return Err(StoreError::UnknownUser(owner));
        }
        inner.last_item_id += 1;
        let item = Item {
            id: ItemId(inner.last_item_id),
            owner,
            content_ref,
            visibility,
            created_at: Utc::now(),
        };
        inner.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn find_item(&self, id: ItemId) -> Result<Option<Item>> {
        Ok(self.inner.read().await.items.get(&id).cloned())
    }

    async fn find_item_by_content(&self, content_ref: &ContentRef) -> Result<Option<Item>> {
        let inner = self.inner.read().await;
        Ok(inner
            .items
            .values()
            .find(|i| &i.content_ref == content_ref)
            .cloned())
    }

    async fn query_items_after(
        &self,
        viewer: Viewer,
        cursor: ItemId,
        limit: usize,
    ) -> Result<Vec<Item>> {
        let inner = self.inner.read().await;
        let visible = inner.visible_to(viewer);
        Ok(inner
            .items
            .range(ItemId(cursor.0.saturating_add(1))..)
            .map(|(_, item)| item)
            .filter(visible)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn query_items_latest(&self, viewer: Viewer, limit: usize) -> Result<Vec<Item>> {
        let inner = self.inner.read().await;
        let visible = inner.visible_to(viewer);
        Ok(inner
            .items
            .values()
            .rev()
            .filter(visible)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete_item(&self, id: ItemId) -> Result<bool> {
        Ok(self.inner.write().await.items.remove(&id).is_some())
    }

    async fn insert_edge(&self, follower: UserId, followee: UserId) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner
            .edges
            .iter()
            .any(|e| e.follower == follower && e.followee == followee)
        {
            return Ok(false);
        }
        inner.edges.push(Edge {
            follower,
            followee,
            created_at: Utc::now(),
        });
        Ok(true)
    }

    async fn delete_edge(&self, follower: UserId, followee: UserId) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let before = inner.edges.len();
        inner
            .edges
            .retain(|e| !(e.follower == follower && e.followee == followee));
        Ok(inner.edges.len() != before)
    }

    async fn edge_exists(&self, follower: UserId, followee: UserId) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .edges
            .iter()
            .any(|e| e.follower == follower && e.followee == followee))
    }

    async fn list_following(&self, follower: UserId) -> Result<Vec<User>> {
        let inner = self.inner.read().await;
        // Reverse insertion order so the stable sort breaks timestamp ties
        // newest-first as well.
        let mut edges: Vec<&Edge> = inner
            .edges
            .iter()
            .rev()
            .filter(|e| e.follower == follower)
            .collect();
        edges.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(edges
            .into_iter()
            .filter_map(|e| inner.users.get(&e.followee).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn user(store: &MemoryStore, name: &str) -> User {
        store
            .create_user(name, &format!("key-{name}"), ContentRef::default_icon())
            .await
            .unwrap()
    }

    async fn post(store: &MemoryStore, owner: &User, visibility: Visibility) -> Item {
        store
            .insert_item(owner.id, ContentRef::generate(), visibility)
            .await
            .unwrap()
    }

    fn ids(items: &[Item]) -> Vec<i64> {
        items.iter().map(|i| i.id.0).collect()
    }

    #[tokio::test]
    async fn ids_are_monotonic() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice").await;
        let a = post(&store, &alice, Visibility::Public).await;
        let b = post(&store, &alice, Visibility::Public).await;
        store.delete_item(b.id).await.unwrap();
        let c = post(&store, &alice, Visibility::Public).await;
        assert!(a.id < b.id && b.id < c.id);
    }

    #[tokio::test]
    async fn duplicate_names_rejected() {
        let store = MemoryStore::new();
        user(&store, "alice").await;
        let result = store
            .create_user("alice", "other", ContentRef::default_icon())
            .await;
        assert!(matches!(result, Err(StoreError::DuplicateName(n)) if n == "alice"));
    }

    #[tokio::test]
    async fn token_lookup() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice").await;
        let found = store.find_user_by_token("key-alice").await.unwrap();
        assert_eq!(found, Some(alice));
        assert_eq!(store.find_user_by_token("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn after_query_is_ascending_and_filtered() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;

        let p1 = post(&store, &bob, Visibility::Public).await;
        let _private = post(&store, &bob, Visibility::Private).await;
        let followers = post(&store, &bob, Visibility::Followers).await;
        let own = post(&store, &alice, Visibility::Private).await;

        let viewer = Viewer::User(alice.id);
        let got = store
            .query_items_after(viewer, ItemId(0), 30)
            .await
            .unwrap();
        assert_eq!(ids(&got), vec![p1.id.0, own.id.0]);

        store.insert_edge(alice.id, bob.id).await.unwrap();
        let got = store
            .query_items_after(viewer, p1.id, 30)
            .await
            .unwrap();
        assert_eq!(ids(&got), vec![followers.id.0, own.id.0]);
    }

    #[tokio::test]
    async fn after_query_limits_from_the_cursor_side() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice").await;
        for _ in 0..5 {
            post(&store, &alice, Visibility::Public).await;
        }
        let got = store
            .query_items_after(Viewer::User(alice.id), ItemId(1), 2)
            .await
            .unwrap();
        assert_eq!(ids(&got), vec![2, 3]);
    }

    #[tokio::test]
    async fn latest_query_is_descending_and_limited() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice").await;
        for _ in 0..5 {
            post(&store, &alice, Visibility::Public).await;
        }
        let got = store
            .query_items_latest(Viewer::Anonymous, 3)
            .await
            .unwrap();
        assert_eq!(ids(&got), vec![5, 4, 3]);
    }

    #[tokio::test]
    async fn anonymous_sees_only_public() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice").await;
        let public = post(&store, &alice, Visibility::Public).await;
        post(&store, &alice, Visibility::Followers).await;
        post(&store, &alice, Visibility::Private).await;

        let got = store
            .query_items_latest(Viewer::Anonymous, 30)
            .await
            .unwrap();
        assert_eq!(ids(&got), vec![public.id.0]);
    }

    #[tokio::test]
    async fn deleted_items_disappear_immediately() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice").await;
        let item = post(&store, &alice, Visibility::Public).await;

        assert!(store.delete_item(item.id).await.unwrap());
        assert!(!store.delete_item(item.id).await.unwrap());
        assert_eq!(store.find_item(item.id).await.unwrap(), None);
        assert!(
            store
                .query_items_latest(Viewer::User(alice.id), 30)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn edges_are_unique_per_pair() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;

        assert!(store.insert_edge(alice.id, bob.id).await.unwrap());
        assert!(!store.insert_edge(alice.id, bob.id).await.unwrap());
        assert!(store.edge_exists(alice.id, bob.id).await.unwrap());
        assert!(!store.edge_exists(bob.id, alice.id).await.unwrap());

        assert!(store.delete_edge(alice.id, bob.id).await.unwrap());
        assert!(!store.delete_edge(alice.id, bob.id).await.unwrap());
    }

    #[tokio::test]
    async fn following_is_newest_first() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        let carol = user(&store, "carol").await;
        let dave = user(&store, "dave").await;

        store.insert_edge(alice.id, bob.id).await.unwrap();
        store.insert_edge(alice.id, carol.id).await.unwrap();
        store.insert_edge(alice.id, dave.id).await.unwrap();
        store.insert_edge(bob.id, alice.id).await.unwrap();

        let names: Vec<String> = store
            .list_following(alice.id)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["dave", "carol", "bob"]);
    }

    #[tokio::test]
    async fn set_icon_updates_user() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice").await;
        let icon = ContentRef::generate();
        store.set_icon(alice.id, icon.clone()).await.unwrap();
        assert_eq!(store.find_user(alice.id).await.unwrap().unwrap().icon, icon);

        let missing = store.set_icon(UserId(99), icon).await;
        assert!(matches!(missing, Err(StoreError::UnknownUser(UserId(99)))));
    }

    #[tokio::test]
    async fn find_by_content_ref() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice").await;
        let item = post(&store, &alice, Visibility::Private).await;
        let found = store.find_item_by_content(&item.content_ref).await.unwrap();
        assert_eq!(found, Some(item));
    }
}
