//! Discovers episodes of a date-stamped radio show on its file server,
//! keeps them in a SQLite catalog, and republishes the catalog as a
//! podcast feed.

pub mod config;
pub mod discovery;
pub mod feed;
pub mod storage;
pub mod util;
