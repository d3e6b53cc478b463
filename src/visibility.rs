//! Who may see which item.
//!
//! Rules, first match wins:
//!
//! 1. Public items are visible to everyone, anonymous viewers included.
//! 2. Owners always see their own items.
//! 3. Followers-only items are visible to signed-in viewers following the owner.
//! 4. Everything else (private items of other users) is hidden.
//!
//! The decision is never cached. Follow edges change underneath it, so it
//! is evaluated per request against the current store.

use crate::model::{Item, Viewer, Visibility};
use crate::store::{Result, Store};

/// Pure decision given whether the viewer currently follows the owner.
pub fn is_visible(viewer: Viewer, item: &Item, viewer_follows_owner: bool) -> bool {
    match (item.visibility, viewer.id()) {
        (Visibility::Public, _) => true,
        (_, Some(id)) if id == item.owner => true,
        (Visibility::Followers, Some(_)) => viewer_follows_owner,
        _ => false,
    }
}

/// Evaluate the rules for `item`, querying the follow graph only when the
/// answer depends on it.
pub async fn can_view(store: &dyn Store, viewer: Viewer, item: &Item) -> Result<bool> {
    let follows = match (item.visibility, viewer.id()) {
        (Visibility::Followers, Some(id)) if id != item.owner => {
            store.edge_exists(id, item.owner).await?
        }
        _ => false,
    };
    Ok(is_visible(viewer, item, follows))
}
