//! Exchange announcement watcher: polls a fixed set of exchange feeds,
//! normalizes and classifies what they publish, deduplicates across a
//! fast cache tier and a durable sqlite tier, and forwards new records
//! to Telegram.

pub mod classify;
pub mod config;
pub mod dedup;
pub mod fetch;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod scheduler;
pub mod sources;
pub mod text;
pub mod ticker;

pub use crate::dedup::DedupStore;
pub use crate::model::{Announcement, AnnouncementKind, CategoryMapping};
pub use crate::notify::{Notifier, Router};
pub use crate::pipeline::IngestionPipeline;
