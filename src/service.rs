//! Operations consumed by the HTTP layer.
//!
//! [`PhotoService`] owns every collaborator (store, feed poller, renderer)
//! and exposes one async method per operation. Handlers pass raw request
//! values in (bearer token, form fields, query strings, upload bytes) and
//! get a serializable view or a [`ServiceError`] back.
//!
//! Validation happens before any mutation, so a rejected request leaves
//! no trace. Blocking image and filesystem work runs on tokio's blocking
//! pool. Server-side failures are logged once here, at the boundary.

use crate::cache::CacheOutcome;
use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::feed::{FeedPoller, parse_cursor};
use crate::imaging::{ImageBackend, RustBackend, crop_icon};
use crate::model::{ContentRef, Item, ItemId, User, UserId, Viewer, Visibility, random_hex_token};
use crate::render::Renderer;
use crate::sizes::{DerivativeKind, SizeClass};
use crate::store::{MemoryStore, Store, StoreError};
use crate::visibility::can_view;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, LazyLock};
use tracing::{error, info, warn};

pub type Result<T> = std::result::Result<T, ServiceError>;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]{2,16}$").expect("valid hard-coded name regex"));

const IMAGE_UPLOAD_TYPES: &[&str] = &["image/jpeg", "image/jpg"];
const ICON_UPLOAD_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png"];

// ============================================================================
// Views
// ============================================================================

/// Public face of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub name: String,
    pub icon: String,
}

/// Returned once, at signup: the only time the API key is shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelfView {
    pub id: UserId,
    pub name: String,
    pub icon: String,
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemView {
    pub id: ItemId,
    pub image: String,
    pub publish_level: Visibility,
    pub user: UserView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedResponse {
    /// Cursor for the next poll; 0 when nothing has been delivered yet.
    pub latest_entry: i64,
    /// Newest first.
    pub entries: Vec<ItemView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IconView {
    pub icon: String,
}

/// Rendered derivative bytes plus their response content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivative {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub outcome: CacheOutcome,
}

fn icon_url(icon: &ContentRef) -> String {
    format!("/icon/{icon}")
}

fn image_url(content_ref: &ContentRef) -> String {
    format!("/image/{content_ref}")
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            icon: icon_url(&user.icon),
        }
    }
}

impl From<&User> for SelfView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            icon: icon_url(&user.icon),
            api_key: user.api_key.clone(),
        }
    }
}

impl ItemView {
    fn new(item: &Item, owner: &User) -> Self {
        Self {
            id: item.id,
            image: image_url(&item.content_ref),
            publish_level: item.visibility,
            user: UserView::from(owner),
        }
    }
}

// ============================================================================
// Service
// ============================================================================

pub struct PhotoService {
    store: Arc<dyn Store>,
    feed: FeedPoller,
    renderer: Arc<Renderer>,
}

/// Log server-side failures of `op`; client errors pass through quietly.
async fn reported<T>(op: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
    fut.await.inspect_err(|e| {
        if !e.is_client_error() {
            error!(op, error = %e, "request failed");
        }
    })
}

/// Run blocking work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ServiceError::Io(std::io::Error::other(e)))?
}

fn require_content_type(content_type: &str, allowed: &[&str]) -> Result<()> {
    if allowed.contains(&content_type) {
        Ok(())
    } else {
        Err(ServiceError::validation(format!(
            "unsupported content type: {content_type}"
        )))
    }
}

fn parse_targets(targets: &[impl AsRef<str>]) -> Result<Vec<UserId>> {
    targets
        .iter()
        .map(AsRef::as_ref)
        .map(|t| {
            t.parse::<UserId>()
                .map_err(|_| ServiceError::validation(format!("malformed user id: {t}")))
        })
        .collect()
}

impl PhotoService {
    pub fn new(
        config: &ServiceConfig,
        store: Arc<dyn Store>,
        backend: Box<dyn ImageBackend>,
    ) -> Self {
        Self {
            feed: FeedPoller::new(store.clone(), &config.feed),
            store,
            renderer: Arc::new(Renderer::from_config(config, backend)),
        }
    }

    /// In-memory store and the pure-Rust image backend.
    pub fn in_memory(config: &ServiceConfig) -> Self {
        Self::new(
            config,
            Arc::new(MemoryStore::new()),
            Box::new(RustBackend::new()),
        )
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    async fn authenticate(&self, token: Option<&str>) -> Result<Option<User>> {
        match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => Ok(self.store.find_user_by_token(token).await?),
            None => Ok(None),
        }
    }

    async fn require_user(&self, token: Option<&str>) -> Result<User> {
        self.authenticate(token)
            .await?
            .ok_or_else(|| ServiceError::validation("not signed in"))
    }

    /// Drop an original no row points at. Failure only leaves an orphan
    /// file behind, so it is logged rather than returned.
    async fn discard_original(&self, content_ref: ContentRef) {
        let renderer = self.renderer.clone();
        let removed = blocking(move || {
            Ok(renderer
                .originals()
                .remove(DerivativeKind::Image, &content_ref)?)
        })
        .await;
        if let Err(e) = removed {
            warn!(error = %e, "orphaned original left behind");
        }
    }

    async fn following_views(&self, user: UserId) -> Result<Vec<UserView>> {
        let users = self.store.list_following(user).await?;
        Ok(users.iter().map(UserView::from).collect())
    }

    // ------------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------------

    pub async fn create_account(&self, name: &str) -> Result<SelfView> {
        reported("create_account", async {
            if !NAME_PATTERN.is_match(name) {
                return Err(ServiceError::validation(format!(
                    "name must be 2-16 letters, digits or underscores: {name:?}"
                )));
            }
            let user = self
                .store
                .create_user(name, &random_hex_token(), ContentRef::default_icon())
                .await
                .map_err(|e| match e {
                    StoreError::DuplicateName(n) => {
                        ServiceError::validation(format!("name already taken: {n}"))
                    }
                    other => other.into(),
                })?;
            info!(user = %user.id, name = %user.name, "account created");
            Ok(SelfView::from(&user))
        })
        .await
    }

    pub async fn fetch_self(&self, token: Option<&str>) -> Result<UserView> {
        reported("fetch_self", async {
            let user = self.require_user(token).await?;
            Ok::<_, ServiceError>(UserView::from(&user))
        })
        .await
    }

    pub async fn update_icon(
        &self,
        token: Option<&str>,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<IconView> {
        reported("update_icon", async {
            let user = self.require_user(token).await?;
            require_content_type(content_type, ICON_UPLOAD_TYPES)?;

            let renderer = self.renderer.clone();
            let icon = blocking(move || {
                let png = crop_icon(renderer.backend(), &bytes).map_err(|e| {
                    ServiceError::validation(format!("icon upload is not a usable image: {e}"))
                })?;
                Ok(renderer.originals().save(DerivativeKind::Icon, &png)?)
            })
            .await?;

            self.store.set_icon(user.id, icon.clone()).await?;
            info!(user = %user.id, icon = %icon, "icon updated");
            Ok::<_, ServiceError>(IconView {
                icon: icon_url(&icon),
            })
        })
        .await
    }

    // ------------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------------

    pub async fn upload_item(
        &self,
        token: Option<&str>,
        content_type: &str,
        bytes: Vec<u8>,
        publish_level: &str,
    ) -> Result<ItemView> {
        reported("upload_item", async {
            let user = self.require_user(token).await?;
            require_content_type(content_type, IMAGE_UPLOAD_TYPES)?;
            let visibility = publish_level
                .parse::<Visibility>()
                .map_err(|e| ServiceError::validation(e.to_string()))?;

            let renderer = self.renderer.clone();
            let content_ref =
                blocking(move || Ok(renderer.originals().save(DerivativeKind::Image, &bytes)?))
                    .await?;

            let item = match self
                .store
                .insert_item(user.id, content_ref.clone(), visibility)
                .await
            {
                Ok(item) => item,
                Err(e) => {
                    self.discard_original(content_ref).await;
                    return Err(ServiceError::from(e));
                }
            };
            self.feed.announce();
            info!(item = %item.id, user = %user.id, level = visibility.level(), "item uploaded");
            Ok::<_, ServiceError>(ItemView::new(&item, &user))
        })
        .await
    }

    pub async fn delete_item(&self, token: Option<&str>, id: &str) -> Result<()> {
        reported("delete_item", async {
            let user = self.require_user(token).await?;
            let id = id
                .parse::<ItemId>()
                .map_err(|_| ServiceError::validation(format!("malformed item id: {id}")))?;
            let item = self
                .store
                .find_item(id)
                .await?
                .ok_or(ServiceError::NotFound)?;
            if item.owner != user.id {
                return Err(ServiceError::validation("only the owner may delete an item"));
            }
            self.store.delete_item(id).await?;
            info!(item = %id, user = %user.id, "item deleted");
            Ok(())
        })
        .await
    }

    // ------------------------------------------------------------------------
    // Feed
    // ------------------------------------------------------------------------

    pub async fn poll_feed(&self, token: Option<&str>, cursor: Option<&str>) -> Result<FeedResponse> {
        reported("poll_feed", async {
            let user = self.require_user(token).await?;
            let page = self
                .feed
                .poll(Viewer::User(user.id), parse_cursor(cursor))
                .await?;

            let mut owners: HashMap<UserId, User> = HashMap::new();
            let mut entries = Vec::with_capacity(page.items.len());
            for item in &page.items {
                if !owners.contains_key(&item.owner) {
                    let owner = self
                        .store
                        .find_user(item.owner)
                        .await?
                        .ok_or(StoreError::UnknownUser(item.owner))?;
                    owners.insert(item.owner, owner);
                }
                if let Some(owner) = owners.get(&item.owner) {
                    entries.push(ItemView::new(item, owner));
                }
            }

            Ok::<_, ServiceError>(FeedResponse {
                latest_entry: page.cursor.map_or(0, |c| c.0),
                entries,
            })
        })
        .await
    }

    // ------------------------------------------------------------------------
    // Derivatives
    // ------------------------------------------------------------------------

    /// Feed image at size class `size` (`s`/`m`/`l`, default `l`).
    ///
    /// Unknown references and items the caller may not see are the same
    /// [`ServiceError::NotFound`].
    pub async fn fetch_derivative(
        &self,
        token: Option<&str>,
        content_ref: &str,
        size: Option<&str>,
    ) -> Result<Derivative> {
        reported("fetch_derivative", async {
            let content_ref = ContentRef::parse(content_ref)
                .map_err(|e| ServiceError::validation(e.to_string()))?;
            let viewer = Viewer::from(self.authenticate(token).await?.as_ref());
            let item = self
                .store
                .find_item_by_content(&content_ref)
                .await?
                .ok_or(ServiceError::NotFound)?;
            if !can_view(self.store.as_ref(), viewer, &item).await? {
                return Err(ServiceError::NotFound);
            }

            let class = DerivativeKind::Image.resolve_class(size);
            self.render(DerivativeKind::Image, class, content_ref).await
        })
        .await
    }

    /// Avatar at size class `size` (`s`/`m`/`l`, default `s`). Icons are
    /// public.
    pub async fn fetch_icon(&self, icon_ref: &str, size: Option<&str>) -> Result<Derivative> {
        reported("fetch_icon", async {
            let icon = ContentRef::parse(icon_ref)
                .map_err(|e| ServiceError::validation(e.to_string()))?;
            if !self.renderer.originals().exists(DerivativeKind::Icon, &icon) {
                return Err(ServiceError::NotFound);
            }
            let class = DerivativeKind::Icon.resolve_class(size);
            self.render(DerivativeKind::Icon, class, icon).await
        })
        .await
    }

    async fn render(
        &self,
        kind: DerivativeKind,
        class: SizeClass,
        content_ref: ContentRef,
    ) -> Result<Derivative> {
        let renderer = self.renderer.clone();
        let cached = blocking(move || renderer.render(kind, class, &content_ref)).await?;
        Ok(Derivative {
            bytes: cached.bytes,
            mime: kind.format().mime_type(),
            outcome: cached.outcome,
        })
    }

    // ------------------------------------------------------------------------
    // Follow graph
    // ------------------------------------------------------------------------

    pub async fn list_following(&self, token: Option<&str>) -> Result<Vec<UserView>> {
        reported("list_following", async {
            let user = self.require_user(token).await?;
            self.following_views(user.id).await
        })
        .await
    }

    /// Follow every target; self and already-followed targets are skipped.
    /// Returns the resulting following list.
    pub async fn follow(
        &self,
        token: Option<&str>,
        targets: &[impl AsRef<str>],
    ) -> Result<Vec<UserView>> {
        reported("follow", async {
            let user = self.require_user(token).await?;
            let targets = parse_targets(targets)?;
            for &target in &targets {
                if target != user.id && self.store.find_user(target).await?.is_none() {
                    return Err(ServiceError::validation(format!("no such user: {target}")));
                }
            }
            for target in targets.into_iter().filter(|t| *t != user.id) {
                if self.store.insert_edge(user.id, target).await? {
                    info!(follower = %user.id, followee = %target, "follow");
                }
            }
            self.following_views(user.id).await
        })
        .await
    }

    pub async fn unfollow(
        &self,
        token: Option<&str>,
        targets: &[impl AsRef<str>],
    ) -> Result<Vec<UserView>> {
        reported("unfollow", async {
            let user = self.require_user(token).await?;
            let targets = parse_targets(targets)?;
            for target in targets.into_iter().filter(|t| *t != user.id) {
                if self.store.delete_edge(user.id, target).await? {
                    info!(follower = %user.id, followee = %target, "unfollow");
                }
            }
            self.following_views(user.id).await
        })
        .await
    }
}
