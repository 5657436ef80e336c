pub mod config;
pub mod metrics;
pub mod purchase;
pub mod replica;
pub mod source;
pub mod sync;

pub use metrics::Metrics;
pub use purchase::{
    PurchaseError, PurchaseEvent, PurchaseFailure, PurchaseFlow, PurchaseRecord, PurchaseState,
};
pub use replica::{OutOfRange, Replica};
pub use sync::{Command, EngineEvent, SyncEngine};
