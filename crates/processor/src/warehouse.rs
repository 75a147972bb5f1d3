//! Legacy data-warehouse hand-offs. The downstream loads live in another
//! system; these stubs only preserve the rating-service event ordering
//! contract (ratings calculated, then coders loaded, then ratings loaded).

use anyhow::Result;
use marathon_types::RoundId;
use tracing::info;

#[derive(Clone, Copy, Debug, Default)]
pub struct WarehouseHandoff;

impl WarehouseHandoff {
    pub fn new() -> Self {
        Self
    }

    /// Fired when a RATINGS_CALCULATION success event arrives.
    pub fn load_coders(&self, round_id: RoundId) -> Result<()> {
        info!("Coder load hand-off acknowledged for round {}", round_id);
        Ok(())
    }

    /// Fired when a LOAD_CODERS success event arrives.
    pub fn load_ratings(&self, round_id: RoundId) -> Result<()> {
        info!("Rating load hand-off acknowledged for round {}", round_id);
        Ok(())
    }
}
