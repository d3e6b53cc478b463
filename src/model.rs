//! Shared domain types: users, items, follow edges, viewers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use thiserror::Error;

/// Store-assigned user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Store-assigned item identifier. Monotonically increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

macro_rules! id_impls {
    ($ty:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $ty {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map($ty)
            }
        }
    };
}

id_impls!(UserId);
id_impls!(ItemId);

/// Who may see an item. Stored as the integer publish level 0/1/2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Visibility {
    Private,
    Followers,
    Public,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid publish level: {0}")]
pub struct InvalidVisibility(pub String);

impl Visibility {
    pub fn level(self) -> u8 {
        match self {
            Visibility::Private => 0,
            Visibility::Followers => 1,
            Visibility::Public => 2,
        }
    }
}

impl From<Visibility> for u8 {
    fn from(v: Visibility) -> u8 {
        v.level()
    }
}

impl TryFrom<u8> for Visibility {
    type Error = InvalidVisibility;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Visibility::Private),
            1 => Ok(Visibility::Followers),
            2 => Ok(Visibility::Public),
            other => Err(InvalidVisibility(other.to_string())),
        }
    }
}

impl FromStr for Visibility {
    type Err = InvalidVisibility;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .map_err(|_| InvalidVisibility(s.to_string()))
            .and_then(Visibility::try_from)
    }
}

/// Opaque key naming a stored original (and all its derivatives).
///
/// Restricted to `[A-Za-z0-9_-]{1,64}` so it is always a safe single path
/// component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentRef(String);

#[derive(Error, Debug, PartialEq, Eq)]
#[error("malformed content reference: {0:?}")]
pub struct InvalidContentRef(pub String);

/// Icon reference every new account starts with.
pub const DEFAULT_ICON: &str = "default";

impl ContentRef {
    pub fn parse(value: &str) -> Result<Self, InvalidContentRef> {
        let valid = !value.is_empty()
            && value.len() <= 64
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(Self(value.to_string()))
        } else {
            Err(InvalidContentRef(value.to_string()))
        }
    }

    /// Fresh unguessable reference: SHA-256 hex of a random UUID.
    pub fn generate() -> Self {
        Self(random_hex_token())
    }

    pub fn default_icon() -> Self {
        Self(DEFAULT_ICON.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContentRef {
    type Error = InvalidContentRef;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContentRef> for String {
    fn from(r: ContentRef) -> String {
        r.0
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 hex digest of a random v4 UUID. Used for API keys and content refs.
pub fn random_hex_token() -> String {
    let id = uuid::Uuid::new_v4();
    format!("{:x}", Sha256::digest(id.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub api_key: String,
    pub icon: ContentRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,
    pub owner: UserId,
    pub content_ref: ContentRef,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
}

/// Directed "follower follows followee" relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub follower: UserId,
    pub followee: UserId,
    pub created_at: DateTime<Utc>,
}

/// Identity a request is evaluated as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    User(UserId),
}

impl Viewer {
    pub fn id(self) -> Option<UserId> {
        match self {
            Viewer::Anonymous => None,
            Viewer::User(id) => Some(id),
        }
    }
}

impl From<Option<&User>> for Viewer {
    fn from(user: Option<&User>) -> Self {
        user.map_or(Viewer::Anonymous, |u| Viewer::User(u.id))
    }
}
