use crate::rating::Elo;
use serde::{Deserialize, Serialize};

/// How far apart (in rating points) Swiss opponents may be before falling back to the closest one.
pub const SWISS_WINDOW: i32 = 15;

/// Tunables for pair selection and rating updates.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct EngineConfig {
    pub elo: Elo,
    pub swiss_window: i32,
    /// Largest pool Swiss mode ranks in full. Bigger pools are paired from a random sample, without
    /// ranks. `None` always ranks the whole pool.
    pub ranked_pool_limit: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            elo: Elo::default(),
            swiss_window: SWISS_WINDOW,
            ranked_pool_limit: None,
        }
    }
}
