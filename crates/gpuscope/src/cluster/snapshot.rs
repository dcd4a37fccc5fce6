use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::cluster::users::UserTable;
use crate::common::config::Config;
use crate::common::utils::time::now_monotonic;
use crate::slurm::client::{ClusterBackend, FetchFuture};
use crate::slurm::records::{RawJob, RawNode};
use crate::slurm::stats::SdiagStats;
use crate::{JobId, Map};

/// Time-boxed memoization of one scheduler query.
///
/// `get` serves the stored value while it is younger than the refresh
/// interval and refetches otherwise. The fetch runs under the state lock, so
/// concurrent callers within one interval observe the same `Arc` and trigger
/// exactly one underlying query. A failed fetch keeps the last successfully
/// fetched value (initially `T::default()`); errors never reach the caller.
pub struct CachedQuery<T> {
    label: &'static str,
    interval: Duration,
    fetch: Box<dyn Fn() -> FetchFuture<T>>,
    state: Mutex<CacheState<T>>,
}

struct CacheState<T> {
    value: Arc<T>,
    fetched_at: Option<Instant>,
}

impl<T: Default> CachedQuery<T> {
    pub fn new(
        label: &'static str,
        interval: Duration,
        fetch: Box<dyn Fn() -> FetchFuture<T>>,
    ) -> Self {
        CachedQuery {
            label,
            interval,
            fetch,
            state: Mutex::new(CacheState {
                value: Arc::new(T::default()),
                fetched_at: None,
            }),
        }
    }

    pub async fn get(&self) -> Arc<T> {
        let mut state = self.state.lock().await;
        let fresh = state
            .fetched_at
            .map(|at| now_monotonic().saturating_duration_since(at) < self.interval)
            .unwrap_or(false);
        if !fresh {
            match (self.fetch)().await {
                Ok(value) => {
                    state.value = Arc::new(value);
                    state.fetched_at = Some(now_monotonic());
                }
                Err(error) => {
                    log::error!(
                        "{} query failed, serving last known state: {error:?}",
                        self.label
                    );
                }
            }
        }
        state.value.clone()
    }

    /// Forces a refetch on the next `get`.
    pub async fn invalidate(&self) {
        self.state.lock().await.fetched_at = None;
    }
}

/// The cached scheduler queries the report builders read from. Live cluster
/// state refreshes on a short interval, the identity table on a long one.
pub struct ClusterSnapshots {
    nodes: CachedQuery<Map<String, RawNode>>,
    jobs: CachedQuery<Map<JobId, RawJob>>,
    statistics: CachedQuery<SdiagStats>,
    users: CachedQuery<UserTable>,
}

impl ClusterSnapshots {
    pub fn new(backend: Arc<dyn ClusterBackend>, config: &Config) -> Self {
        let interval = config.refresh_interval();
        let b = backend.clone();
        let nodes = CachedQuery::new("node inventory", interval, Box::new(move || b.fetch_nodes()));
        let b = backend.clone();
        let jobs = CachedQuery::new("job inventory", interval, Box::new(move || b.fetch_jobs()));
        let b = backend.clone();
        let statistics = CachedQuery::new(
            "scheduler statistics",
            interval,
            Box::new(move || b.fetch_statistics()),
        );
        let users = CachedQuery::new(
            "user table",
            config.user_refresh_interval(),
            Box::new(move || backend.fetch_users()),
        );
        ClusterSnapshots {
            nodes,
            jobs,
            statistics,
            users,
        }
    }

    pub async fn nodes(&self) -> Arc<Map<String, RawNode>> {
        self.nodes.get().await
    }

    pub async fn jobs(&self) -> Arc<Map<JobId, RawJob>> {
        self.jobs.get().await
    }

    pub async fn statistics(&self) -> Arc<SdiagStats> {
        self.statistics.get().await
    }

    pub async fn users(&self) -> Arc<UserTable> {
        self.users.get().await
    }

    pub async fn invalidate_all(&self) {
        self.nodes.invalidate().await;
        self.jobs.invalidate().await;
        self.statistics.invalidate().await;
        self.users.invalidate().await;
    }
}
