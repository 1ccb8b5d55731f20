//! Episode discovery and catalog consistency.
//!
//! - [`walker`] - candidate dates and the URLs derived from them (pure)
//! - [`probe`] - HEAD-only existence checks against the file server
//! - [`reconcile`] - discovery and pruning passes over the catalog
//!
//! ```ignore
//! let prober = Prober::new(client, &config.probe);
//! prune(&db, &prober).await?;
//! discover(&db, &prober, &config.show, Utc::now()).await?;
//! ```

mod probe;
mod reconcile;
mod walker;

pub use probe::{parse_http_date, ProbeError, ProbeOutcome, Prober, RemoteFile, DEFAULT_MIME_TYPE};
pub use reconcile::{
    discover, prune, synthesize_episode, DiscoveryReport, PruneReport, ReconcileError,
};
pub use walker::{candidate_url, display_date, start_date, DateRange, DateWalk};
