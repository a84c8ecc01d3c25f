//! The validator.
//!
//! [`Validator`] ties together the VRP cache, the online validation queue,
//! and the object metadata. It answers validation requests from the local
//! snapshot once there is one and from the remote validator until then.

use std::sync::{Arc, Weak};
use std::time::Duration;
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use log::{debug, info};
use tokio::task::JoinHandle;
use crate::cache::{DEFAULT_MAX_AGE, VrpCache};
use crate::config::Config;
use crate::connector::{Connector, HttpClient};
use crate::error::{Error, Failed};
use crate::meta::{MetaIndex, ObjectRecord};
use crate::payload::{
    Asn, CacheMetadata, SharedSnapshot, Vrp, VrpKey, VrpList, VrpRecord,
    VrpSnapshot, parse_origin, parse_prefix,
};
use crate::queue::ValidationQueue;
use crate::remote::{BatchValidator, GraphqlValidator};
use crate::utils::sync::{Mutex, RwLock};
use crate::validity::{RouteValidity, Validation};


//------------ ValidatorOptions ----------------------------------------------

/// The tunables of a validator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ValidatorOptions {
    /// The maximum age of VRP data to be installed.
    pub max_data_age: Duration,

    /// How often the validation queue is flushed.
    pub flush_interval: Duration,

    /// How long fetched object metadata is kept.
    pub meta_ttl: Duration,
}

impl ValidatorOptions {
    pub fn from_config(config: &Config) -> Self {
        ValidatorOptions {
            max_data_age: config.max_data_age,
            flush_interval: config.flush_interval,
            meta_ttl: config.meta_ttl,
        }
    }
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        ValidatorOptions {
            max_data_age: DEFAULT_MAX_AGE,
            flush_interval: Duration::from_millis(500),
            meta_ttl: Duration::from_secs(3600),
        }
    }
}


//------------ Validator -----------------------------------------------------

/// Validates route announcements.
///
/// Any number of validators can exist side by side. Each one owns its
/// background tasks and stops them when dropped or destroyed.
pub struct Validator {
    /// The VRP cache.
    cache: Arc<VrpCache>,

    /// The queue for validating online.
    queue: Arc<ValidationQueue>,

    /// The task flushing the queue.
    ///
    /// This is only started once the first request is queued.
    flush_task: Mutex<Option<JoinHandle<()>>>,

    /// The cached object metadata.
    meta: Arc<MetaCache>,

    /// The tunables.
    options: ValidatorOptions,
}

impl Validator {
    /// Creates a validator from the configuration.
    pub fn new(config: &Config) -> Result<Self, Failed> {
        let client = HttpClient::new(config)?;
        let connector = Connector::from_config(config, &client)?;
        let remote = GraphqlValidator::new(
            client, config.validation_url.clone()
        );
        Ok(Self::with_parts(
            connector, Arc::new(remote), ValidatorOptions::from_config(config)
        ))
    }

    /// Creates a validator from its parts.
    pub fn with_parts(
        connector: Connector,
        remote: Arc<dyn BatchValidator>,
        options: ValidatorOptions,
    ) -> Self {
        Validator {
            cache: Arc::new(VrpCache::new(
                Arc::new(connector), options.max_data_age
            )),
            queue: Arc::new(ValidationQueue::new(remote)),
            flush_task: Mutex::new(None),
            meta: Arc::new(MetaCache::new(options.meta_ttl)),
            options,
        }
    }

    /// Returns the connector in use.
    pub fn connector(&self) -> &Connector {
        self.cache.connector()
    }

    /// Validates a route given as strings.
    ///
    /// The prefix must be in CIDR notation. The origin can be given with
    /// or without an `AS` prefix. Both are checked before anything else
    /// happens, so bad input is always reported as such.
    pub async fn validate(
        &self, prefix: &str, origin: &str, verbose: bool
    ) -> Result<Validation, Error> {
        let origin = parse_origin(origin)?;
        let prefix = parse_prefix(prefix)?;
        self.validate_route(prefix, origin, verbose).await
    }

    /// Validates a route.
    ///
    /// If there is a local snapshot, the route is validated right away.
    /// Otherwise, it is queued for online validation and the returned
    /// future resolves after the next flush of the queue.
    pub async fn validate_route(
        &self, prefix: IpNet, origin: Asn, verbose: bool
    ) -> Result<Validation, Error> {
        if let Some(res) = self.validate_from_cache(prefix, origin, verbose) {
            return Ok(res)
        }
        self.ensure_flush_task();
        let validity = self.queue.enqueue(prefix, origin).await?;
        Ok(validity.to_validation(verbose))
    }

    /// Validates a route using the local snapshot only.
    ///
    /// Returns `None` if there is no snapshot yet.
    pub fn validate_from_cache(
        &self, prefix: IpNet, origin: Asn, verbose: bool
    ) -> Option<Validation> {
        self.cache.current().map(|snapshot| {
            RouteValidity::from_snapshot(
                prefix.trunc(), origin, &snapshot
            ).into_validation(verbose)
        })
    }

    fn ensure_flush_task(&self) {
        let mut task = self.flush_task.lock();
        if task.is_none() {
            debug!(
                "Starting online validation, flushing every {:?}.",
                self.options.flush_interval
            );
            *task = Some(self.queue.spawn_flush(self.options.flush_interval));
        }
    }

    /// Makes sure there is a local snapshot.
    ///
    /// With `every` given, also sets up refreshing every so many minutes.
    /// Without it, or with zero, any refreshing set up earlier is stopped.
    /// Resolves once the first refresh has finished.
    pub async fn pre_cache(&self, every: Option<u64>) -> Result<bool, Error> {
        self.cache.schedule_refresh(every).await
    }

    /// Refreshes the local snapshot.
    ///
    /// Unless `force` is true, nothing happens if there is a snapshot.
    pub async fn refresh(&self, force: bool) -> Result<bool, Error> {
        self.cache.refresh(force).await
    }

    /// Hands a VRP list to the connector.
    ///
    /// This only works with the external connector. The list is installed
    /// with the next refresh.
    pub fn set_vrps(&self, list: VrpList) -> Result<(), Error> {
        self.cache.connector().set_vrps(list)
    }

    /// Returns the installed VRPs in the format sources deliver them.
    pub fn get_vrps(&self) -> Vec<VrpRecord> {
        self.cache.current().map(|snapshot| {
            snapshot.iter().map(VrpRecord::from).collect()
        }).unwrap_or_default()
    }

    /// Returns the installed VRPs.
    pub fn to_array(&self) -> Vec<Vrp> {
        self.cache.current().map(|snapshot| {
            snapshot.iter().cloned().collect()
        }).unwrap_or_default()
    }

    /// Returns the installed snapshot if there is one.
    pub fn snapshot(&self) -> Option<Arc<VrpSnapshot>> {
        self.cache.current()
    }

    /// Returns the shared snapshot for readers that outlive a call.
    pub fn shared_snapshot(&self) -> SharedSnapshot {
        self.cache.snapshot().clone()
    }

    pub fn metadata(&self) -> CacheMetadata {
        self.cache.snapshot().metadata()
    }

    /// Returns the number of installed VRPs.
    pub fn len(&self) -> usize {
        self.cache.current().map(|snapshot| snapshot.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the object metadata index.
    ///
    /// The index is fetched from the connector and kept for a while. Fails
    /// with [`Error::NotSupported`] if the connector has no metadata.
    pub async fn advanced_stats(&self) -> Result<Arc<MetaIndex>, Error> {
        if !self.cache.connector().has_advanced_stats() {
            return Err(Error::NotSupported("Advanced stats"))
        }
        if let Some(index) = self.meta.get() {
            return Ok(index)
        }
        let index = self.cache.connector().get_advanced_stats().await?;
        info!("Loaded metadata for {} RPKI objects.", index.len());
        Ok(self.meta.install(index))
    }

    /// Returns the objects on a VRP’s path that expire at `expires_at`.
    ///
    /// Only objects already valid at `as_of` are included.
    pub async fn expiring_elements(
        &self,
        vrp: &VrpKey,
        expires_at: DateTime<Utc>,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Arc<ObjectRecord>>, Error> {
        Ok(self.advanced_stats().await?.expiring(vrp, expires_at, as_of))
    }

    /// Shuts the validator down.
    ///
    /// Stops all background tasks, rejects all queued requests with
    /// [`Error::QueueClosed`], and drops the object metadata. The installed
    /// snapshot is kept.
    pub fn destroy(&self) {
        self.cache.cancel();
        self.stop_flush();
        self.queue.close();
        self.meta.clear();
    }

    fn stop_flush(&self) {
        if let Some(task) = self.flush_task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for Validator {
    fn drop(&mut self) {
        self.stop_flush();
        self.meta.clear();
    }
}


//------------ MetaCache -----------------------------------------------------

/// The object metadata index kept for a limited time.
struct MetaCache {
    /// The current index.
    index: RwLock<Option<Arc<MetaIndex>>>,

    /// The task evicting the current index.
    eviction: Mutex<Option<JoinHandle<()>>>,

    /// How long an index is kept.
    ttl: Duration,
}

impl MetaCache {
    fn new(ttl: Duration) -> Self {
        MetaCache {
            index: RwLock::new(None),
            eviction: Mutex::new(None),
            ttl,
        }
    }

    fn get(&self) -> Option<Arc<MetaIndex>> {
        self.index.read().clone()
    }

    /// Installs a new index and schedules its eviction.
    fn install(self: &Arc<Self>, index: MetaIndex) -> Arc<MetaIndex> {
        let index = Arc::new(index);
        let mut eviction = self.eviction.lock();
        if let Some(task) = eviction.take() {
            task.abort();
        }
        *self.index.write() = Some(index.clone());
        *eviction = Some(tokio::spawn(
            Self::evict_after(Arc::downgrade(self), self.ttl)
        ));
        index
    }

    async fn evict_after(cache: Weak<Self>, ttl: Duration) {
        tokio::time::sleep(ttl).await;
        if let Some(cache) = cache.upgrade() {
            debug!("Evicting object metadata.");
            cache.index.write().take();
        }
    }

    fn clear(&self) {
        if let Some(task) = self.eviction.lock().take() {
            task.abort();
        }
        self.index.write().take();
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use futures::future::BoxFuture;
    use crate::connector::ExternalConnector;
    use crate::meta::ObjectType;
    use crate::remote::{RemoteAnswer, RequestKey};
    use crate::validity::{REASON_BAD_LENGTH, REASON_NOT_FOUND};
    use super::*;

    /// A remote validator that knows a single VRP.
    #[derive(Default)]
    struct MockRemote {
        calls: AtomicUsize,
        hang: bool,
    }

    impl BatchValidator for MockRemote {
        fn validate_batch(
            &self, batch: Vec<RequestKey>
        ) -> BoxFuture<'_, Result<HashMap<RequestKey, RemoteAnswer>, Error>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                return Box::pin(futures::future::pending())
            }
            let vrp = Vrp::new(
                IpNet::from_str("218.103.58.0/23").unwrap(),
                24, Asn::from(4515)
            ).unwrap();
            let res = batch.into_iter().map(|key| {
                let covering = if vrp.covers(key.prefix) {
                    vec![vrp.clone()]
                }
                else {
                    Vec::new()
                };
                (key, RemoteAnswer::new(covering))
            }).collect();
            Box::pin(async move { Ok(res) })
        }
    }

    fn options() -> ValidatorOptions {
        ValidatorOptions {
            flush_interval: Duration::from_millis(10),
            .. Default::default()
        }
    }

    fn validator(remote: Arc<MockRemote>) -> Validator {
        let list = VrpList::new(vec![
            VrpRecord::new("218.103.58.0/23", 24, 4515)
                .with_trust_anchor("apnic"),
        ]);
        Validator::with_parts(
            ExternalConnector::with_vrps(list).into(), remote, options()
        )
    }

    #[tokio::test]
    async fn validate_from_snapshot() {
        let remote = Arc::new(MockRemote::default());
        let validator = validator(remote.clone());
        assert!(validator.pre_cache(None).await.unwrap());
        assert_eq!(validator.len(), 1);

        assert_eq!(
            validator.validate("218.103.58.0/23", "4515", false).await,
            Ok(Validation::Terse(Some(true)))
        );
        assert_eq!(
            validator.validate("218.103.58.0/24", "AS4515", false).await,
            Ok(Validation::Terse(Some(true)))
        );
        assert_eq!(
            validator.validate("218.103.58.0/25", "4515", false).await,
            Ok(Validation::Terse(Some(false)))
        );
        assert_eq!(
            validator.validate("218.103.58.0/23", "9999", false).await,
            Ok(Validation::Terse(Some(false)))
        );
        assert_eq!(
            validator.validate("203.126.124.0/8", "9404", false).await,
            Ok(Validation::Terse(None))
        );

        let res = validator.validate(
            "218.103.58.0/25", "4515", true
        ).await.unwrap();
        let report = res.report().unwrap();
        assert_eq!(report.valid, Some(false));
        assert_eq!(report.reason, Some(REASON_BAD_LENGTH));
        assert_eq!(report.covering.len(), 1);

        let res = validator.validate(
            "203.126.124.0/8", "9404", true
        ).await.unwrap();
        let report = res.report().unwrap();
        assert_eq!(report.valid, None);
        assert_eq!(report.reason, Some(REASON_NOT_FOUND));
        assert!(report.covering.is_empty());

        // With a snapshot, the remote validator is never asked.
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bad_input() {
        let validator = validator(Default::default());
        assert_eq!(
            validator.validate("218.103.58.0/23", "", false).await,
            Err(Error::MissingOrigin)
        );
        assert!(matches!(
            validator.validate("218.103.58.0/23", "ASx", false).await,
            Err(Error::InvalidOrigin(_))
        ));
        assert!(matches!(
            validator.validate("218.103.58.0", "4515", false).await,
            Err(Error::InvalidPrefix(_))
        ));
        assert!(matches!(
            validator.validate("", "4515", true).await,
            Err(Error::InvalidPrefix(_))
        ));
        // Nothing got queued.
        assert!(validator.queue.is_empty());
    }

    #[tokio::test]
    async fn online_validation_coalesces() {
        let remote = Arc::new(MockRemote::default());
        let validator = validator(remote.clone());
        let (first, second, third) = futures::join!(
            validator.validate("218.103.58.0/24", "4515", false),
            validator.validate("218.103.58.0/24", "4515", false),
            validator.validate("218.103.58.0/24", "4515", true),
        );
        assert_eq!(first, Ok(Validation::Terse(Some(true))));
        assert_eq!(second, Ok(Validation::Terse(Some(true))));
        assert_eq!(third.unwrap().report().unwrap().valid, Some(true));
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
        assert!(validator.snapshot().is_none());
    }

    #[tokio::test]
    async fn destroy_rejects_pending() {
        let remote = Arc::new(MockRemote { hang: true, .. Default::default() });
        let validator = Arc::new(validator(remote));
        let pending = tokio::spawn({
            let validator = validator.clone();
            async move {
                validator.validate("218.103.58.0/24", "4515", false).await
            }
        });
        while validator.queue.is_empty() {
            tokio::task::yield_now().await;
        }
        validator.destroy();
        assert_eq!(pending.await.unwrap(), Err(Error::QueueClosed));
    }

    #[tokio::test]
    async fn set_vrps() {
        let validator = validator(Default::default());
        validator.pre_cache(Some(0)).await.unwrap();
        assert_eq!(validator.to_array().len(), 1);

        validator.set_vrps(
            VrpList::new(vec![
                VrpRecord::new("10.0.0.0/8", 16, 64500),
                VrpRecord::new("10.0.0.0/8", 4, 64500),
                VrpRecord::new("2001:db8::/32", 48, 64501),
            ]).with_build_time(Utc::now())
        ).unwrap();
        // Not installed before the next refresh.
        assert_eq!(validator.len(), 1);
        assert!(validator.refresh(true).await.unwrap());
        assert_eq!(validator.len(), 2);
        assert_eq!(validator.get_vrps().len(), 2);
        let metadata = validator.metadata();
        assert_eq!(metadata.vrp_count, 2);
        assert!(metadata.build_time.is_some());
        assert_eq!(
            validator.validate("10.1.0.0/16", "64500", false).await,
            Ok(Validation::Terse(Some(true)))
        );
    }

    #[tokio::test]
    async fn pre_cache_without_interval_stops_schedule() {
        let validator = validator(Default::default());
        assert!(validator.pre_cache(Some(60)).await.unwrap());
        assert_eq!(validator.cache.refresh_interval(), Some(60));
        assert!(validator.pre_cache(None).await.unwrap());
        assert_eq!(validator.cache.refresh_interval(), None);

        assert!(validator.pre_cache(Some(60)).await.unwrap());
        assert!(validator.pre_cache(Some(0)).await.unwrap());
        assert_eq!(validator.cache.refresh_interval(), None);
    }

    #[tokio::test]
    async fn advanced_stats_not_supported() {
        let validator = validator(Default::default());
        assert_eq!(
            validator.advanced_stats().await.unwrap_err(),
            Error::NotSupported("Advanced stats")
        );
        let vrp = VrpKey::new(
            IpNet::from_str("218.103.58.0/23").unwrap(), Asn::from(4515), 24
        );
        assert_eq!(
            validator.expiring_elements(
                &vrp, Utc::now(), Utc::now()
            ).await.unwrap_err(),
            Error::NotSupported("Advanced stats")
        );
    }

    #[tokio::test]
    async fn meta_cache_eviction() {
        let cache = Arc::new(MetaCache::new(Duration::from_millis(20)));
        let mut index = MetaIndex::new();
        index.add(ObjectRecord::new(ObjectType::Cert, "c1"));
        let index = cache.install(index);
        assert!(Arc::ptr_eq(&index, &cache.get().unwrap()));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(cache.get().is_none());

        cache.install(MetaIndex::new());
        assert!(cache.get().is_some());
        cache.clear();
        assert!(cache.get().is_none());
    }
}
