//! # Photofeed
//!
//! Back end of a small photo-sharing service: users upload photos at one of
//! three visibility levels, follow each other, and long-poll a feed of
//! whatever they are allowed to see. Photos and avatars are served as
//! square-cropped, resized derivatives generated on first request and kept
//! on disk.
//!
//! # Architecture
//!
//! Two request paths carry all the interesting work:
//!
//! ```text
//! poll_feed       → FeedPoller ─ query ─▶ Store (visibility-filtered)
//!                      ▲ retry every interval, or on announce()
//!                      └─ deadline timer races the retry loop
//!
//! fetch_derivative → visibility check → Renderer
//!                                        ├─ DerivativeCache hit  → bytes
//!                                        └─ miss → OriginalStore → ImageBackend → cache write
//! ```
//!
//! Everything else (accounts, uploads, follow edges) is thin glue in
//! [`service`]. Routing, HTTP framing and the relational schema live outside
//! this crate; the [`store::Store`] trait is the contract with the latter.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`service`] | Operation contract for request handlers, plus JSON views |
//! | [`feed`] | Long-polling feed with deadline/retry race and upload wakeups |
//! | [`visibility`] | Who may see which item |
//! | [`store`] | Storage contract and the in-memory implementation |
//! | [`model`] | Users, items, follow edges, content references |
//! | [`render`] | Cache-backed derivative rendering shared by requests and prewarm |
//! | [`cache`] | Content- and size-addressed on-disk derivative cache |
//! | [`originals`] | Uploaded originals, stored once per content reference |
//! | [`imaging`] | Pure-Rust decode, square-crop, resize, encode |
//! | [`sizes`] | `s` / `m` / `l` size classes for images and icons |
//! | [`prewarm`] | Parallel bulk generation of every image derivative |
//! | [`config`] | `photofeed.toml` loading and validation |
//! | [`error`] | Handler-facing error taxonomy and status codes |
//! | [`logging`] | `tracing` subscriber setup |
//!
//! # Design Decisions
//!
//! ## Not Found Means Not Visible Too
//!
//! A derivative request for an item the caller may not see gets exactly the
//! same answer as one for an item that never existed. A distinguishable
//! "forbidden" would let anyone probe for private uploads.
//!
//! ## Two Orderings in One Feed Page
//!
//! The incremental feed query walks ids ascending from the cursor, so a page
//! that fills up stops right after what the client already has and nothing
//! is skipped. The response is then flipped to newest first for display.
//! The initial load (no cursor) simply takes the newest page.
//!
//! ## Polling With a Doorbell
//!
//! The feed re-queries the store on a fixed interval until the deadline.
//! Uploads through this process additionally ring a [`tokio::sync::Notify`],
//! so waiting polls re-query at once. The interval keeps working for writes
//! that bypass the doorbell.
//!
//! ## Trusting the Cache
//!
//! Originals never change after upload, so a derivative on disk is correct
//! forever. Cache hits are served without looking at the original. Writes go
//! through temp file + rename so a crash never leaves half a JPEG behind, and
//! concurrent misses on one key are coalesced so the resample runs once.
//!
//! ## Blocking Work Off the Reactor
//!
//! Image work and filesystem access are synchronous and run on tokio's
//! blocking pool for requests, or on rayon for bulk prewarming. The async
//! side only ever awaits the store and timers.

pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
pub mod imaging;
pub mod logging;
pub mod model;
pub mod originals;
pub mod prewarm;
pub mod render;
pub mod service;
pub mod sizes;
pub mod store;
pub mod visibility;

#[cfg(test)]
pub(crate) mod test_helpers;
