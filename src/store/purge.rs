//! Background removal of rows whose expiry has passed.
//!
//! Expired rows are already dead to every read path; this only keeps the
//! tables small. Rows are kept for `retention` after they expire so a late
//! action token is still reported as expired rather than unknown.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error};

use super::{StoreError, TokenStore};
use crate::tokens::Clock;

pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_PURGE_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PurgeSchedule {
    pub interval: Duration,
    pub retention: Duration,
}

impl Default for PurgeSchedule {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PURGE_INTERVAL,
            retention: DEFAULT_PURGE_RETENTION,
        }
    }
}

impl PurgeSchedule {
    /// Rows with `expires_at` at or before this instant are removed.
    #[must_use]
    pub fn cutoff(&self, now: i64) -> i64 {
        let retention = i64::try_from(self.retention.as_secs()).unwrap_or(i64::MAX);
        now.saturating_sub(retention)
    }
}

/// Run one purge pass and return how many rows were removed.
///
/// # Errors
/// Returns the store error of the pass.
pub async fn purge_once(
    store: &dyn TokenStore,
    clock: &dyn Clock,
    schedule: &PurgeSchedule,
) -> Result<u64, StoreError> {
    let purged = store.purge_expired(schedule.cutoff(clock.now())).await?;
    debug!(purged, "purged expired tokens");
    Ok(purged)
}

pub fn spawn_purge_task(
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    schedule: PurgeSchedule,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(schedule.interval).await;

            if let Err(err) = purge_once(store.as_ref(), clock.as_ref(), &schedule).await {
                error!("token purge failed: {err}");
            }
        }
    })
}
