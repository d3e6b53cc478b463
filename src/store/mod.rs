//! Storage contract for users, items, and the follow graph.
//!
//! The relational store is an external collaborator; this trait is the set
//! of single-statement queries the rest of the crate relies on. Every
//! mutation is atomic on its own and nothing wraps several mutations in a
//! transaction.
//!
//! [`MemoryStore`] is the in-process implementation used by the CLI and the
//! tests.

mod memory;

pub use memory::MemoryStore;

use crate::model::{ContentRef, Item, ItemId, User, UserId, Viewer, Visibility};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("user name already taken: {0}")]
    DuplicateName(String),
    #[error("no such user: {0}")]
    UnknownUser(UserId),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    /// Fails with [`StoreError::DuplicateName`] when `name` is taken; the
    /// uniqueness check and the insert are one atomic step.
    async fn create_user(&self, name: &str, api_key: &str, icon: ContentRef) -> Result<User>;

    async fn find_user(&self, id: UserId) -> Result<Option<User>>;

    async fn find_user_by_token(&self, api_key: &str) -> Result<Option<User>>;

    async fn set_icon(&self, id: UserId, icon: ContentRef) -> Result<()>;

    /// Insert an item; the store assigns its id and creation time.
    async fn insert_item(
        &self,
        owner: UserId,
        content_ref: ContentRef,
        visibility: Visibility,
    ) -> Result<Item>;

    async fn find_item(&self, id: ItemId) -> Result<Option<Item>>;

    async fn find_item_by_content(&self, content_ref: &ContentRef) -> Result<Option<Item>>;

    /// Items visible to `viewer` with id strictly greater than `cursor`,
    /// **ascending** by id, at most `limit`.
    async fn query_items_after(
        &self,
        viewer: Viewer,
        cursor: ItemId,
        limit: usize,
    ) -> Result<Vec<Item>>;

    /// The newest `limit` items visible to `viewer`, **descending** by id.
    async fn query_items_latest(&self, viewer: Viewer, limit: usize) -> Result<Vec<Item>>;

    /// Hard delete. Returns whether a row was removed.
    async fn delete_item(&self, id: ItemId) -> Result<bool>;

    /// Insert-if-absent. Returns whether a new edge was created.
    async fn insert_edge(&self, follower: UserId, followee: UserId) -> Result<bool>;

    async fn delete_edge(&self, follower: UserId, followee: UserId) -> Result<bool>;

    async fn edge_exists(&self, follower: UserId, followee: UserId) -> Result<bool>;

    /// Users `follower` follows, newest edge first.
    async fn list_following(&self, follower: UserId) -> Result<Vec<User>>;
}
