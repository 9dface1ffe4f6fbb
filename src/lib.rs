pub mod auth;
pub mod config;
pub mod engagement;
pub mod error;
pub mod mail;
pub mod mirror;
pub mod server;
pub mod store;

/// Seconds since the Unix epoch, as stored in the timestamp columns.
pub(crate) fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}
