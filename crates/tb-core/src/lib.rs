pub mod admin;
pub mod auth;
pub mod blob;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod firebase;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod pg_store;
pub mod repository;
pub mod server;
pub mod store;
pub mod tribute;

pub use error::{Result, TributeError};
pub use feed::{FeedReceiver, Snapshot, Subscription, TributeFeed};
pub use repository::{BlobCleanup, TributeRepository};
pub use tribute::{PhotoUpload, Tribute};
