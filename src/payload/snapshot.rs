//! The currently installed set of VRPs.
//!
//! This is a private module. Its public types are re-exported by the parent.

use std::sync::Arc;
use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use crate::error::StaleReason;
use crate::utils::sync::RwLock;
use super::store::PrefixStore;
use super::vrp::{Vrp, VrpRecord};


//------------ VrpList -------------------------------------------------------

/// A list of VRPs as delivered by a connector.
#[derive(Clone, Debug, Default)]
pub struct VrpList {
    /// The VRPs, unchecked.
    pub vrps: Vec<VrpRecord>,

    /// The time the source says the data was built, if it says so.
    pub build_time: Option<DateTime<Utc>>,

    /// Any further metadata provided by the source.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl VrpList {
    pub fn new(vrps: Vec<VrpRecord>) -> Self {
        VrpList { vrps, .. Default::default() }
    }

    pub fn with_build_time(mut self, build_time: DateTime<Utc>) -> Self {
        self.build_time = Some(build_time);
        self
    }
}


//------------ VrpSnapshot ---------------------------------------------------

/// A complete, immutable set of VRPs ready for validation.
#[derive(Clone, Debug)]
pub struct VrpSnapshot {
    /// The VRPs.
    store: PrefixStore,

    /// The time the source built the data, if known.
    build_time: Option<DateTime<Utc>>,

    /// The time this snapshot was created.
    created: DateTime<Utc>,

    /// The number of records dropped as malformed.
    dropped: usize,

    /// Metadata provided by the source.
    source: serde_json::Map<String, serde_json::Value>,
}

impl VrpSnapshot {
    /// Builds a snapshot from a list.
    ///
    /// Malformed records are logged and skipped. They never cause the whole
    /// list to be rejected.
    pub fn from_list(list: VrpList, now: DateTime<Utc>) -> Self {
        let mut store = PrefixStore::new();
        let mut dropped = 0;
        for record in &list.vrps {
            match Vrp::check(record) {
                Ok(vrp) => store.insert(vrp),
                Err(err) => {
                    debug!(
                        "Skipping malformed VRP {:?}/{:?}/{:?}: {}",
                        record.prefix, record.max_length, record.asn, err
                    );
                    dropped += 1;
                }
            }
        }
        VrpSnapshot {
            store,
            build_time: list.build_time,
            created: now,
            dropped,
            source: list.metadata,
        }
    }

    /// Returns the VRP store.
    pub fn store(&self) -> &PrefixStore {
        &self.store
    }

    /// Returns the time the source says the data was built.
    pub fn build_time(&self) -> Option<DateTime<Utc>> {
        self.build_time
    }

    /// Returns when this snapshot was created.
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Returns the number of records dropped when building the snapshot.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Returns the number of VRPs in the snapshot.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns whether the snapshot contains no VRPs at all.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Returns an iterator over the VRPs.
    pub fn iter(&self) -> impl Iterator<Item = &Vrp> + '_ {
        self.store.iter()
    }

    /// Returns the metadata provided by the source.
    pub fn source(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.source
    }
}


//------------ SharedSnapshot ------------------------------------------------

/// A shareable holder of the current snapshot.
///
/// There is one writer that installs new snapshots and any number of
/// readers. Readers grab an `Arc` of the current snapshot and keep using it
/// for as long as they like. Installing a new snapshot only swaps the
/// `Arc`, so a reader sees either the complete old or the complete new
/// data.
#[derive(Clone, Debug, Default)]
pub struct SharedSnapshot(Arc<RwLock<SnapshotState>>);

#[derive(Debug, Default)]
struct SnapshotState {
    /// The current snapshot if we have one yet.
    current: Option<Arc<VrpSnapshot>>,

    /// When the last update was started.
    last_update_attempt: Option<DateTime<Utc>>,

    /// When the last update successfully finished.
    last_successful_update: Option<DateTime<Utc>>,

    /// Metadata provided by the source with the last successful update.
    source: serde_json::Map<String, serde_json::Value>,
}

impl SharedSnapshot {
    /// Creates a new, inactive shared snapshot.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns a shareable reference to the current snapshot.
    ///
    /// If no snapshot has been installed yet, returns `None`.
    pub fn current(&self) -> Option<Arc<VrpSnapshot>> {
        self.0.read().current.clone()
    }

    /// Returns whether a snapshot has been installed.
    pub fn is_active(&self) -> bool {
        self.0.read().current.is_some()
    }

    /// Returns the build time of the current snapshot.
    pub fn build_time(&self) -> Option<DateTime<Utc>> {
        self.0.read().current.as_ref().and_then(|current| {
            current.build_time()
        })
    }

    /// Marks the beginning of an update.
    pub fn mark_update_start(&self, now: DateTime<Utc>) {
        self.0.write().last_update_attempt = Some(now);
    }

    /// Marks the successful end of an update that didn’t change the data.
    ///
    /// The VRPs stay as they are but the source metadata is taken from
    /// the update.
    pub fn mark_update_done(
        &self,
        now: DateTime<Utc>,
        source: serde_json::Map<String, serde_json::Value>,
    ) {
        let mut state = self.0.write();
        state.last_successful_update = Some(now);
        state.source = source;
    }

    /// Installs a new snapshot.
    ///
    /// Since the snapshot was built without holding the lock, another
    /// update may have installed newer data in the mean time. The build
    /// times are therefore compared again and the snapshot is refused if it
    /// is older than the one now installed.
    pub fn install(
        &self, snapshot: VrpSnapshot
    ) -> Result<Arc<VrpSnapshot>, StaleReason> {
        let mut state = self.0.write();
        if let (Some(build_time), Some(installed)) = (
            snapshot.build_time(),
            state.current.as_ref().and_then(|current| current.build_time())
        ) {
            if build_time < installed {
                return Err(StaleReason::OlderThanInstalled {
                    build_time, installed
                })
            }
        }
        let snapshot = Arc::new(snapshot);
        state.last_successful_update = Some(snapshot.created());
        state.source = snapshot.source().clone();
        state.current = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Removes the current snapshot.
    pub fn clear(&self) {
        let mut state = self.0.write();
        state.current = None;
        state.source = Default::default();
    }

    /// Returns the metadata of the current state.
    pub fn metadata(&self) -> CacheMetadata {
        let state = self.0.read();
        CacheMetadata {
            build_time: state.current.as_ref().and_then(|current| {
                current.build_time()
            }),
            last_update_attempt: state.last_update_attempt,
            last_successful_update: state.last_successful_update,
            vrp_count: state.current.as_ref().map(|current| {
                current.len()
            }).unwrap_or(0),
            source: state.source.clone(),
        }
    }
}


//------------ CacheMetadata -------------------------------------------------

/// Information about the state of the VRP cache.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    /// The build time of the installed data if known.
    pub build_time: Option<DateTime<Utc>>,

    /// When an update was last started.
    pub last_update_attempt: Option<DateTime<Utc>>,

    /// When an update last succeeded.
    pub last_successful_update: Option<DateTime<Utc>>,

    /// The number of VRPs installed.
    pub vrp_count: usize,

    /// Metadata provided by the source of the installed data.
    pub source: serde_json::Map<String, serde_json::Value>,
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use chrono::{Duration, TimeZone};
    use super::*;

    fn list(build_time: Option<DateTime<Utc>>) -> VrpList {
        VrpList {
            vrps: vec![
                VrpRecord::new("218.103.58.0/23", 24, 4515),
                VrpRecord::new("218.103.58.0/23", 22, 4515),
                VrpRecord::new("not a prefix", 24, 4515),
            ],
            build_time,
            metadata: Default::default(),
        }
    }

    #[test]
    fn malformed_records_are_dropped() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let snapshot = VrpSnapshot::from_list(list(None), now);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.dropped(), 2);
        assert_eq!(snapshot.created(), now);
    }

    #[test]
    fn install_keeps_newer_data() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let shared = SharedSnapshot::new();
        assert!(!shared.is_active());
        assert_eq!(shared.metadata().vrp_count, 0);

        shared.install(VrpSnapshot::from_list(list(Some(now)), now)).unwrap();
        assert!(shared.is_active());
        assert_eq!(shared.build_time(), Some(now));

        let older = now - Duration::minutes(5);
        assert_eq!(
            shared.install(
                VrpSnapshot::from_list(list(Some(older)), now)
            ).unwrap_err(),
            StaleReason::OlderThanInstalled {
                build_time: older, installed: now
            }
        );
        assert_eq!(shared.build_time(), Some(now));

        // Data without a build time is always accepted.
        shared.install(VrpSnapshot::from_list(list(None), now)).unwrap();
        assert_eq!(shared.build_time(), None);

        let meta = shared.metadata();
        assert_eq!(meta.vrp_count, 1);
        assert_eq!(meta.last_successful_update, Some(now));

        shared.clear();
        assert!(!shared.is_active());
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let now = Utc::now();
        let shared = SharedSnapshot::new();
        shared.install(VrpSnapshot::from_list(list(None), now)).unwrap();
        let reader = shared.current().unwrap();
        shared.install(
            VrpSnapshot::from_list(VrpList::new(Vec::new()), now)
        ).unwrap();
        assert_eq!(reader.len(), 1);
        assert_eq!(shared.current().unwrap().len(), 0);
    }
}
