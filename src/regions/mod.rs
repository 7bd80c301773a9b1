//! Region store: normalized per-profile regions and their HUD visibility.

pub(crate) mod json_file;
pub mod model;
pub mod store;
pub mod visibility;

pub use model::{migrate_legacy, Region, RegionKey, RegionSet, MIN_REGION_EXTENT};
pub use store::RegionStore;
pub use visibility::{RegionVisibility, RegionVisibilityStore};
