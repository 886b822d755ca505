//! Effective configuration: per-scope winners and their device-wide projection.

pub mod merge;
pub mod snapshot;
pub mod store;

pub use merge::{ConfigurationMerger, EffectiveComponentSet, merge_winners};
pub use snapshot::SNAPSHOT_FILE_NAME;
pub use store::{ComponentEntry, EffectiveConfigurationStore, ScopeWinner};
