//! Pure Qubits rating engine. Given a slate of participants with scores and
//! prior rating tuples, produces a new rating and volatility per participant.
//! No I/O; the orchestrator composes this with the loader and persistor.

pub mod normal;
pub mod qubits;

pub use qubits::{QubitsEngine, QubitsParams};
