//! Domain layer: work units, the deduplication cache, configuration and
//! the processing error taxonomy.

pub mod cache;
pub mod config;
pub mod errors;
pub mod work_unit;

pub use cache::{CachedWorkUnit, WorkUnitCache};
pub use config::{CacheConfig, LeakDetectionConfig, ProcessorConfig};
pub use errors::ProcessError;
pub use work_unit::{Broadcast, WorkUnit, WorkUnitState};
