//! Rate-limited, shared refresh of a device snapshot
//!
//! Every entity backed by the same device polls the same
//! [`RefreshCoordinator`]. The coordinator decides whether the network is hit:
//! - `needs_refresh` is a lock-free time check
//! - `maybe_refresh` only takes the lock when the interval has elapsed
//! - `refresh` re-checks the elapsed time after acquiring the lock, so a herd
//!   of callers queued behind an in-flight fetch collapses into that fetch

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::Result;

/// Floor below which even an explicit refresh is skipped
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// A data source whose latest state can be fetched as one unit
#[async_trait]
pub trait Fetch: Send + Sync {
    type Output: Send + Sync;

    /// Short label for log messages
    fn describe(&self) -> String;

    async fn fetch(&self) -> Result<Self::Output>;
}

/// Timing policy of a coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSettings {
    pub refresh_interval: Duration,
    pub minimum_interval: Duration,
}

impl RefreshSettings {
    /// Build settings from a configured interval in seconds.
    ///
    /// Intervals below [`MIN_REFRESH_INTERVAL`] are replaced by `default_secs`
    /// with a warning instead of being rejected.
    pub fn from_secs(section: &str, configured_secs: u64, default_secs: u64) -> Self {
        let mut refresh_interval = Duration::from_secs(configured_secs);
        if refresh_interval < MIN_REFRESH_INTERVAL {
            log::warn!(
                "Invalid {section}.refresh_interval = {configured_secs}s - using default {default_secs}s"
            );
            refresh_interval = Duration::from_secs(default_secs);
        }

        Self {
            refresh_interval,
            minimum_interval: MIN_REFRESH_INTERVAL,
        }
    }
}

struct RefreshState<T> {
    last_refresh: Option<Instant>,
    refreshed_at: Option<DateTime<Utc>>,
    latest_data: Option<Arc<T>>,
    generation: u64,
    failures: u64,
}

impl<T> Default for RefreshState<T> {
    fn default() -> Self {
        Self {
            last_refresh: None,
            refreshed_at: None,
            latest_data: None,
            generation: 0,
            failures: 0,
        }
    }
}

/// Shared cache of the latest snapshot fetched by `F`
pub struct RefreshCoordinator<F: Fetch> {
    fetcher: F,
    settings: RefreshSettings,
    refresh_lock: Mutex<()>,
    // Written only while `refresh_lock` is held.
    state: RwLock<RefreshState<F::Output>>,
}

impl<F: Fetch> std::fmt::Debug for RefreshCoordinator<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<F: Fetch> RefreshCoordinator<F> {
    pub fn new(fetcher: F, settings: RefreshSettings) -> Self {
        Self {
            fetcher,
            settings,
            refresh_lock: Mutex::new(()),
            state: RwLock::new(RefreshState::default()),
        }
    }

    /// The device facade behind this coordinator
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// True when the refresh interval has elapsed (or nothing was fetched yet)
    pub fn needs_refresh(&self) -> bool {
        match self.read_state().last_refresh {
            Some(last) => last.elapsed() >= self.settings.refresh_interval,
            None => true,
        }
    }

    /// Refresh if due. Returns whether a refresh was attempted.
    pub async fn maybe_refresh(&self) -> bool {
        if !self.needs_refresh() {
            log::debug!("Refresh of {} is not currently necessary", self.fetcher.describe());
            return false;
        }
        self.refresh().await;
        true
    }

    /// Fetch a new snapshot unless another caller did so within the minimum interval.
    ///
    /// Fetch errors are logged, the previous snapshot is kept, and the refresh
    /// timestamp still advances so a failing endpoint is not hit every poll.
    pub async fn refresh(&self) {
        let source = self.fetcher.describe();
        log::debug!("Beginning refresh of {source}");
        let _guard = self.refresh_lock.lock().await;
        log::debug!("Acquired refresh lock for {source}");

        if let Some(last) = self.last_refresh() {
            let delta = last.elapsed();
            log::debug!(
                "Last refresh of {source} was delta={} ago",
                humantime::format_duration(Duration::from_millis(delta.as_millis() as u64))
            );
            if delta < self.settings.minimum_interval {
                log::debug!("Skipping refresh of {source} - below minimum interval");
                return;
            }
        }

        let result = self.fetcher.fetch().await;

        let mut state = self.write_state();
        match result {
            Ok(data) => {
                state.latest_data = Some(Arc::new(data));
                state.generation += 1;
            }
            Err(err) => {
                log::error!("Error retrieving latest status from {source}: {err}");
                state.failures += 1;
            }
        }
        state.last_refresh = Some(Instant::now());
        state.refreshed_at = Some(Utc::now());
        log::debug!("Refresh of {source} is done");
    }

    /// Snapshot of the most recently fetched data
    pub fn latest_data(&self) -> Option<Arc<F::Output>> {
        self.read_state().latest_data.clone()
    }

    /// Counter bumped each time `latest_data` is replaced
    pub fn generation(&self) -> u64 {
        self.read_state().generation
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        self.read_state().last_refresh
    }

    pub fn status(&self) -> RefreshStatus {
        let state = self.read_state();
        RefreshStatus {
            source: self.fetcher.describe(),
            refresh_interval: humantime::format_duration(self.settings.refresh_interval)
                .to_string(),
            minimum_interval: humantime::format_duration(self.settings.minimum_interval)
                .to_string(),
            refreshed_at: state.refreshed_at,
            age_secs: state.last_refresh.map(|last| last.elapsed().as_secs()),
            due: state
                .last_refresh
                .map_or(true, |last| last.elapsed() >= self.settings.refresh_interval),
            has_data: state.latest_data.is_some(),
            generation: state.generation,
            failures: state.failures,
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, RefreshState<F::Output>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, RefreshState<F::Output>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Serializable summary of a coordinator
#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatus {
    pub source: String,
    pub refresh_interval: String,
    pub minimum_interval: String,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub age_secs: Option<u64>,
    pub due: bool,
    pub has_data: bool,
    pub generation: u64,
    pub failures: u64,
}
