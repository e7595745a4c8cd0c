/// Re-run a transactional body while it fails with a serialization error.
/// The body is re-evaluated on each attempt, so it must open its own transaction.
macro_rules! retry_serializable {
    ($op:literal, $body:expr) => {{
        let mut attempt: u32 = 1;
        loop {
            match $body {
                Err($crate::engine::EngineError::Store($crate::store::StoreError::Serialization))
                    if attempt < $crate::limits::MAX_TX_RETRIES =>
                {
                    metrics::counter!($crate::observability::TX_RETRIES_TOTAL).increment(1);
                    tracing::debug!("{}: serialization failure, retry {attempt}", $op);
                    attempt += 1;
                }
                other => break other,
            }
        }
    }};
}

mod bookings;
mod cars;
mod conflict;
mod creation;
mod error;
mod owners;
mod pricing;
mod users;
mod validate;
#[cfg(test)]
mod tests;

pub use conflict::{find_conflict, has_conflict};
pub use error::EngineError;
pub use pricing::compute_price;

use std::sync::Arc;

use crate::store::{Store, StoreTx};

pub type EngineResult<T> = Result<T, EngineError>;

/// The booking and fleet engine. Stateless apart from the injected store, so
/// one instance is shared by every request handler.
pub struct Engine {
    store: Arc<dyn Store>,
    hash_cost: u32,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// bcrypt work factor for new password hashes.
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    pub(crate) async fn tx(&self) -> EngineResult<Box<dyn StoreTx>> {
        Ok(self.store.begin().await?)
    }
}
