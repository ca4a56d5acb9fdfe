//! Per-region refresh leases.
//!
//! At most one refresh runs per region at a time. The first caller spawns
//! the refresh as its own task and publishes a shared handle to its outcome;
//! callers arriving while it runs await the same outcome instead of starting
//! a second extraction. The spawned task removes the lease itself, so a caller
//! that gives up waiting never leaves a region locked.

use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use tokio::sync::Mutex;

use crate::store::StoreError;

/// Result of one refresh attempt, shared by every caller of the lease.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// New rows were stored.
    Replaced { providers: usize, rows: u64 },
    /// Another refresh finished just before this one started.
    AlreadyFresh,
    /// The source answered without any tier prices.
    Empty,
    /// The source could not be read; carries the reason.
    ExtractionFailed(String),
    /// The refresh held its lease past the deadline and was cancelled.
    DeadlineExceeded(Duration),
    StoreFailed(StoreError),
}

/// Whether this caller ran the refresh or joined one already in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseRole {
    Leader,
    Follower,
}

type InFlight = Shared<BoxFuture<'static, RefreshOutcome>>;

pub struct RegionLeases {
    in_flight: Arc<Mutex<HashMap<String, InFlight>>>,
    deadline: Duration,
}

impl RegionLeases {
    pub fn new(deadline: Duration) -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            deadline,
        }
    }

    /// Run `refresh` under the lease for `key`, or join the refresh already
    /// holding it. `refresh` is dropped unpolled when joining.
    pub async fn run<F>(&self, key: &str, refresh: F) -> (RefreshOutcome, LeaseRole)
    where
        F: Future<Output = RefreshOutcome> + Send + 'static,
    {
        let (shared, role) = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(key) {
                Some(existing) => (existing.clone(), LeaseRole::Follower),
                None => {
                    let shared = self.spawn(key.to_string(), refresh);
                    in_flight.insert(key.to_string(), shared.clone());
                    (shared, LeaseRole::Leader)
                }
            }
        };

        (shared.await, role)
    }

    /// Number of regions currently being refreshed.
    pub async fn active(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    fn spawn<F>(&self, key: String, refresh: F) -> InFlight
    where
        F: Future<Output = RefreshOutcome> + Send + 'static,
    {
        let deadline = self.deadline;
        let in_flight = Arc::clone(&self.in_flight);

        let handle = tokio::spawn(async move {
            let outcome = match tokio::time::timeout(deadline, refresh).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(region = %key, ?deadline, "region refresh exceeded its lease deadline");
                    RefreshOutcome::DeadlineExceeded(deadline)
                }
            };
            // The entry was inserted while the map lock was held by `run`, so
            // it is ours to remove.
            in_flight.lock().await.remove(&key);
            outcome
        });

        async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => RefreshOutcome::ExtractionFailed(format!("refresh task aborted: {e}")),
            }
        }
        .boxed()
        .shared()
    }
}
