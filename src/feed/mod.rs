//! Podcast feed input and output.
//!
//! - [`render`] - projects catalog episodes into the RSS 2.0 document we publish
//! - [`upstream`] - imports the show's items from the broadcaster's own feed
//!
//! # Example
//!
//! ```ignore
//! use crate::feed::{render_feed, sync};
//!
//! sync(&db, &client, &config.upstream, &config.show).await?;
//! let xml = render_feed(&db.episodes_by_date_desc().await?, &config.channel)?;
//! ```

mod render;
mod upstream;

pub use render::{format_pub_date, render_feed, write_feed};
pub use upstream::{format_duration, parse_upstream, sync, SyncError, SyncReport};
