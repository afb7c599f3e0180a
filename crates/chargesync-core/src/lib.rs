// chargesync-core: Dual-source polling coordinator between chargesync-api and consumers (CLI).

pub mod backoff;
pub mod budget;
pub mod config;
pub mod coordinator;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod merge;
pub mod model;
pub mod overrides;
pub mod secondary;
pub mod store;
pub mod transport;

mod poller;
mod registry;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backoff::{BackoffPolicy, BackoffSnapshot, Health};
pub use budget::{Allocation, RateBudget, allocate_interval};
pub use config::{
    BudgetConfig, CoordinatorConfig, LocalConfig, PLATFORM_DAILY_QUOTA, SecondaryPeriods,
    StaticDevice, WriteConfig,
};
pub use coordinator::Coordinator;
pub use diagnostics::{DeviceDiagnostics, Diagnostics, OverrideInfo, QuotaUsage};
pub use dispatch::WriteOutcome;
pub use error::{CoreError, ErrorClass};
pub use merge::{DeviceState, ResolvedValue, ValueSource};
pub use poller::CycleReport;
pub use store::DataStore;
pub use transport::{CloudApi, LocalApi};

// Re-export model types at the crate root for ergonomics.
pub use model::{CloudWrite, Device, DeviceId, Field, FieldSpec, Route, ValueKind};
