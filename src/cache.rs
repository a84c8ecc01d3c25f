//! Maintaining the local VRP cache.
//!
//! The cache holds the currently installed VRP snapshot. It is updated by
//! fetching a new VRP list from the connector and, if the list passes the
//! freshness checks, building a new snapshot from it and swapping it in.
//! Updates can be triggered explicitly or run on a schedule.

use std::sync::{Arc, Weak};
use std::time::Duration;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{info, warn};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use crate::connector::Connector;
use crate::error::{Error, StaleReason};
use crate::payload::{SharedSnapshot, VrpList, VrpSnapshot};
use crate::utils::sync::Mutex;


//------------ Configuration -------------------------------------------------

/// The default maximum age of VRP data.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(2 * 3600);


//------------ Freshness -----------------------------------------------------

/// The outcome of a successful freshness check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Freshness {
    /// The data has the same build time as the installed data.
    Unchanged,

    /// The data should be installed.
    Rebuild,
}

/// Checks whether data built at `build_time` may replace installed data.
///
/// Data without a build time is always accepted. Data with a build time is
/// rejected if it is more than `max_age` older than `now` or older than
/// the installed data.
pub fn check_freshness(
    build_time: Option<DateTime<Utc>>,
    installed: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    max_age: Duration,
) -> Result<Freshness, StaleReason> {
    let build_time = match build_time {
        Some(build_time) => build_time,
        None => return Ok(Freshness::Rebuild)
    };
    if matches!((now - build_time).to_std(), Ok(age) if age > max_age) {
        return Err(StaleReason::TooOld { build_time, now })
    }
    match installed {
        Some(installed) if build_time < installed => {
            Err(StaleReason::OlderThanInstalled { build_time, installed })
        }
        Some(installed) if build_time == installed => {
            Ok(Freshness::Unchanged)
        }
        _ => Ok(Freshness::Rebuild)
    }
}


//------------ VrpCache ------------------------------------------------------

/// The local VRP cache.
pub struct VrpCache {
    /// The source of VRP data.
    connector: Arc<Connector>,

    /// The installed snapshot.
    snapshot: SharedSnapshot,

    /// The maximum age of data to be installed.
    max_age: Duration,

    /// The refresh schedule.
    schedule: Mutex<Schedule>,

    /// The refresh started by the first caller to ask for the cache.
    ///
    /// Concurrent callers share this refresh instead of starting their own.
    first: Mutex<Option<RefreshFuture>>,
}

type RefreshFuture = Shared<BoxFuture<'static, Result<bool, Error>>>;

/// The refresh schedule.
#[derive(Debug, Default)]
struct Schedule {
    /// The interval in minutes.
    every: Option<u64>,

    /// The task performing the scheduled refreshes.
    task: Option<JoinHandle<()>>,
}

impl VrpCache {
    pub fn new(connector: Arc<Connector>, max_age: Duration) -> Self {
        VrpCache {
            connector,
            snapshot: SharedSnapshot::new(),
            max_age,
            schedule: Default::default(),
            first: Default::default(),
        }
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    pub fn snapshot(&self) -> &SharedSnapshot {
        &self.snapshot
    }

    /// Returns the current snapshot if there is one.
    pub fn current(&self) -> Option<Arc<VrpSnapshot>> {
        self.snapshot.current()
    }

    /// Updates the cache from the connector.
    ///
    /// Unless `force` is true, nothing happens if a snapshot is already
    /// installed. Resolves to `false` if the connector didn’t provide a VRP
    /// list. If the list is rejected because of its age, the installed
    /// snapshot is kept and an error returned.
    pub async fn refresh(&self, force: bool) -> Result<bool, Error> {
        if !force && self.snapshot.is_active() {
            return Ok(true)
        }
        self.snapshot.mark_update_start(Utc::now());
        info!("Fetching VRPs from {} connector.", self.connector.kind());
        match self.connector.get_vrps().await? {
            Some(list) => self.install_list(list, Utc::now()),
            None => Ok(false)
        }
    }

    /// Installs a VRP list if it passes the freshness checks.
    pub fn install_list(
        &self, list: VrpList, now: DateTime<Utc>
    ) -> Result<bool, Error> {
        let freshness = check_freshness(
            list.build_time, self.snapshot.build_time(), now, self.max_age
        ).map_err(|reason| {
            warn!("Rejecting VRP data: {}.", reason);
            reason
        })?;
        if freshness == Freshness::Unchanged {
            info!("VRP data unchanged.");
            self.snapshot.mark_update_done(now, list.metadata);
            return Ok(true)
        }
        let snapshot = VrpSnapshot::from_list(list, now);
        let (len, dropped) = (snapshot.len(), snapshot.dropped());
        self.snapshot.install(snapshot).map_err(|reason| {
            warn!("Rejecting VRP data: {}.", reason);
            reason
        })?;
        if dropped > 0 {
            warn!("Installed {} VRPs, skipped {} malformed VRPs.", len, dropped);
        }
        else {
            info!("Installed {} VRPs.", len);
        }
        Ok(true)
    }

    /// Makes sure there is a snapshot.
    ///
    /// If there is none yet, refreshes the cache. Concurrent calls share a
    /// single refresh. A finished refresh is never reused, so calling again
    /// after a failure tries again.
    pub async fn pre_cache(self: &Arc<Self>) -> Result<bool, Error> {
        if self.snapshot.is_active() {
            return Ok(true)
        }
        let refresh = {
            let mut first = self.first.lock();
            match first.as_ref() {
                Some(refresh) if refresh.peek().is_none() => refresh.clone(),
                _ => {
                    let cache = self.clone();
                    let refresh = async move {
                        cache.refresh(false).await
                    }.boxed().shared();
                    *first = Some(refresh.clone());
                    refresh
                }
            }
        };
        refresh.await
    }

    /// Sets the refresh schedule.
    ///
    /// With `Some(_)` interval in minutes, the cache is refreshed that
    /// often. The interval must not be shorter than the connector’s
    /// minimum. An interval of zero as well as `None` stop refreshing.
    /// Setting the same interval again leaves the schedule untouched.
    ///
    /// Either way, the method resolves once there is a snapshot or the
    /// initial refresh has failed.
    pub async fn schedule_refresh(
        self: &Arc<Self>, every: Option<u64>
    ) -> Result<bool, Error> {
        if let Some(every) = every {
            let minimum = self.connector.minimum_refresh_minutes();
            if every < minimum {
                return Err(Error::RefreshTooFrequent {
                    requested: every, minimum
                })
            }
        }
        self.set_schedule(every.filter(|every| *every > 0));
        self.pre_cache().await
    }

    fn set_schedule(self: &Arc<Self>, every: Option<u64>) {
        let mut schedule = self.schedule.lock();
        if schedule.every == every {
            return
        }
        if let Some(task) = schedule.task.take() {
            task.abort();
        }
        schedule.every = every;
        if let Some(every) = every {
            info!("Refreshing VRPs every {} minutes.", every);
            schedule.task = Some(tokio::spawn(Self::refresh_loop(
                Arc::downgrade(self), Duration::from_secs(every * 60)
            )));
        }
    }

    async fn refresh_loop(cache: Weak<Self>, period: Duration) {
        let mut interval = tokio::time::interval_at(
            Instant::now() + period, period
        );
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let cache = match cache.upgrade() {
                Some(cache) => cache,
                None => break
            };
            if let Err(err) = cache.refresh(true).await {
                warn!("Scheduled VRP refresh failed: {}", err);
            }
        }
    }

    /// Returns the current refresh interval in minutes.
    pub fn refresh_interval(&self) -> Option<u64> {
        self.schedule.lock().every
    }

    /// Stops scheduled refreshing.
    pub fn cancel(&self) {
        let mut schedule = self.schedule.lock();
        schedule.every = None;
        if let Some(task) = schedule.task.take() {
            task.abort();
        }
    }
}

impl Drop for VrpCache {
    fn drop(&mut self) {
        self.cancel()
    }
}


//============ Tests =========================================================
