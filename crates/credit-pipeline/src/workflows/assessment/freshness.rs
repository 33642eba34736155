use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use super::domain::IdentityType;
use super::repository::FreshnessStore;

/// Decides whether a previously persisted fetch is still usable, allowing
/// the whole pipeline to be skipped in favor of cached output.
pub struct FreshnessGate<S> {
    store: Arc<S>,
    default_tolerance_days: i64,
}

impl<S: FreshnessStore> FreshnessGate<S> {
    pub fn new(store: Arc<S>, default_tolerance_days: i64) -> Self {
        Self {
            store,
            default_tolerance_days,
        }
    }

    /// True when **either** prior-fetch record is still inside the tolerance
    /// window (`now < last_fetched_at + tolerance_days`; equality is stale).
    /// Any lookup failure fails closed so a fresh bureau fetch runs rather
    /// than silently serving stale data.
    pub async fn is_cache_fresh(
        &self,
        identity_type: IdentityType,
        identity_no: &str,
        tolerance_override: Option<i64>,
    ) -> bool {
        let tolerance_days = tolerance_override.unwrap_or(self.default_tolerance_days);
        let tolerance = Duration::days(tolerance_days.max(0));
        let now = Utc::now();

        let bureau = match self
            .store
            .bureau_fetch_record(identity_type, identity_no)
            .await
        {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "freshness lookup failed, failing closed");
                return false;
            }
        };
        let summary = match self.store.summary_record(identity_type, identity_no).await {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "freshness lookup failed, failing closed");
                return false;
            }
        };

        let fresh = [bureau, summary]
            .into_iter()
            .flatten()
            .any(|record| now < record.last_fetched_at + tolerance);

        debug!(
            identity_type = identity_type.label(),
            tolerance_days, fresh, "freshness gate evaluated"
        );
        fresh
    }
}
