//! Client-side data synchronization.
//!
//! - `prices`: batch price lookup with a per-symbol fallback
//! - `coordinator`: owner of every read model and its refresh
//! - `bulk`: whole-collection export and import

pub mod bulk;
pub mod coordinator;
pub mod error;
pub mod prices;

pub use bulk::{
    filename_from_disposition, BulkReconciler, ExportedFile, ImportFile, ImportOutcome,
    OverwriteConfirm,
};
pub use coordinator::{DataSyncCoordinator, ReadModels, RefreshReport};
pub use error::{SyncError, SyncResult};
pub use prices::{BatchFetcher, PriceFetchConfig};
