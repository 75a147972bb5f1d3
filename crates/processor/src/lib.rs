//! The round processing pipeline: participant loading, attendance
//! reconciliation, the two-pass rating calculation, transactional write-back,
//! event routing, and the bus consumer harness that drives it all.

pub mod harness;
pub mod loader;
pub mod orchestrator;
pub mod persistor;
pub mod reconciler;
pub mod router;
pub mod warehouse;

pub use harness::ConsumerHarness;
pub use orchestrator::RoundOrchestrator;
pub use router::{DispatchOutcome, EventRouter, TopicRouting};
pub use warehouse::WarehouseHandoff;
