//! CVE domain - feed extraction, filtering, snapshots, diffing and sync.
//!
//! ```text
//! feed page ─► extract_cve ─► CveFilters ─► upsert CveRecord
//!                                        └─► build_snapshot ─► insert-or-skip
//!                                                 └─► diff_snapshots(previous, new) ─► CveChange*
//! ```

pub mod diff;
pub mod extract;
pub mod feed;
pub mod filters;
pub mod models;
pub mod settings;
pub mod snapshot;
mod store;
pub mod sync;

pub use diff::diff_snapshots;
pub use extract::{extract_cve, CveSignals, ExtractedCve};
pub use feed::{CveFeedError, CvePage, CvePageRequest, NvdClient};
pub use filters::{CveFilters, FilterReason};
pub use models::{
    AffectedProduct, ChangeType, CveChange, CveRecord, CveSnapshot, CvssMetric, Severity,
};
pub use settings::CveSyncSettings;
pub use snapshot::{build_snapshot, canonical_json, snapshot_hash};
pub use store::CveStore;
pub use sync::{run_cve_sync, sync_window, CveSyncReport};
