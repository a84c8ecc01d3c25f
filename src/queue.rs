//! The queue for validating routes online.
//!
//! As long as there is no local VRP snapshot, validation requests are put
//! into a queue which is periodically flushed by sending all pending
//! requests in one batch to a remote validator. Concurrent requests for
//! the same prefix and origin share a single queue entry and thus a single
//! remote query.

use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::collections::HashMap;
use std::time::Duration;
use futures::future::{BoxFuture, FutureExt, Shared};
use ipnet::IpNet;
use log::{debug, warn};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use crate::error::Error;
use crate::payload::Asn;
use crate::remote::{BatchValidator, RequestKey};
use crate::utils::sync::Mutex;
use crate::validity::RouteValidity;


//------------ PendingValidation ---------------------------------------------

/// The result of a queued validation.
pub type ValidationResult = Result<Arc<RouteValidity>, Error>;

/// A future resolving to the result of a queued validation.
///
/// The future can be cloned. All clones resolve to the same result.
pub type PendingValidation = Shared<BoxFuture<'static, ValidationResult>>;


//------------ ValidationQueue -----------------------------------------------

/// The queue of pending validation requests.
pub struct ValidationQueue {
    /// The pending requests.
    ///
    /// There is at most one entry per key. An entry stays here until the
    /// batch it was sent with has been answered.
    pending: Mutex<HashMap<RequestKey, PendingRequest>>,

    /// The remote validator.
    remote: Arc<dyn BatchValidator>,

    /// The number of the next batch.
    next_batch: AtomicU64,
}

/// A single entry in the queue.
struct PendingRequest {
    /// The sending side of the channel delivering the result.
    sender: oneshot::Sender<ValidationResult>,

    /// The future handed out to all callers for this entry.
    handle: PendingValidation,

    /// The batch the request has been sent with, if any.
    batch: Option<u64>,
}

impl ValidationQueue {
    pub fn new(remote: Arc<dyn BatchValidator>) -> Self {
        ValidationQueue {
            pending: Default::default(),
            remote,
            next_batch: AtomicU64::new(0),
        }
    }

    /// Adds a request to the queue.
    ///
    /// If there already is a request for the same prefix and origin, its
    /// future is returned and no new entry is created.
    pub fn enqueue(&self, prefix: IpNet, origin: Asn) -> PendingValidation {
        let key = RequestKey::new(prefix, origin);
        let mut pending = self.pending.lock();
        if let Some(request) = pending.get(&key) {
            return request.handle.clone()
        }
        let (sender, receiver) = oneshot::channel();
        let handle = receiver.map(|res| {
            res.unwrap_or(Err(Error::QueueClosed))
        }).boxed().shared();
        pending.insert(key, PendingRequest {
            sender,
            handle: handle.clone(),
            batch: None,
        });
        handle
    }

    /// Sends all requests not yet sent as a single batch.
    ///
    /// Every request of the batch is resolved once the answer arrives. If
    /// the remote validator fails, all requests of the batch are rejected
    /// with its error. Requests the remote validator did not answer are
    /// rejected, too. Either way, they are removed from the queue.
    ///
    /// Entries added for the same key after the queue was closed belong
    /// to a later batch and are left alone.
    ///
    /// Returns the number of requests in the batch.
    pub async fn flush(&self) -> usize {
        let id = self.next_batch.fetch_add(1, Ordering::Relaxed);
        let batch: Vec<_> = {
            let mut pending = self.pending.lock();
            pending.iter_mut().filter(|(_, request)| {
                request.batch.is_none()
            }).map(|(key, request)| {
                request.batch = Some(id);
                *key
            }).collect()
        };
        if batch.is_empty() {
            return 0
        }
        debug!("Sending batch of {} validation requests.", batch.len());

        let res = self.remote.validate_batch(batch.clone()).await;

        let mut pending = self.pending.lock();
        match res {
            Ok(mut answers) => {
                for key in &batch {
                    let request = match take_request(&mut pending, key, id) {
                        Some(request) => request,
                        None => continue
                    };
                    let res = match answers.remove(key) {
                        Some(answer) => {
                            Ok(Arc::new(RouteValidity::new(
                                key.prefix, key.origin, answer.covering
                            )))
                        }
                        None => {
                            Err(Error::Transport(
                                format!("no answer received for {}", key)
                            ))
                        }
                    };
                    let _ = request.sender.send(res);
                }
            }
            Err(err) => {
                warn!(
                    "Batch validation of {} requests failed: {}",
                    batch.len(), err
                );
                for key in &batch {
                    if let Some(request) = take_request(&mut pending, key, id) {
                        let _ = request.sender.send(Err(err.clone()));
                    }
                }
            }
        }
        batch.len()
    }

    /// Spawns a task flushing the queue every `every`.
    ///
    /// Each flush runs as a task of its own so a slow remote validator
    /// doesn’t delay the next tick. The task ends once the queue has been
    /// dropped.
    pub fn spawn_flush(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let queue = Arc::downgrade(self);
        tokio::spawn(Self::flush_loop(queue, every))
    }

    async fn flush_loop(queue: Weak<Self>, every: Duration) {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let queue = match queue.upgrade() {
                Some(queue) => queue,
                None => break
            };
            if queue.is_empty() {
                continue
            }
            tokio::spawn(async move {
                queue.flush().await;
            });
        }
    }

    /// Drops all pending requests.
    ///
    /// Their callers receive [`Error::QueueClosed`].
    pub fn close(&self) {
        self.pending.lock().clear()
    }

    /// Returns the number of pending requests.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns whether there are no pending requests.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}


/// Removes the request for `key` if it was sent with batch `id`.
fn take_request(
    pending: &mut HashMap<RequestKey, PendingRequest>,
    key: &RequestKey,
    id: u64,
) -> Option<PendingRequest> {
    match pending.get(key) {
        Some(request) if request.batch == Some(id) => pending.remove(key),
        _ => None
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use std::str::FromStr;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;
    use crate::payload::Vrp;
    use crate::remote::RemoteAnswer;
    use super::*;

    /// A remote validator that knows one VRP and counts its calls.
    #[derive(Default)]
    struct MockRemote {
        calls: AtomicUsize,
        fail: bool,
        silent: bool,
        gate: Option<Arc<Notify>>,
    }

    impl BatchValidator for MockRemote {
        fn validate_batch(
            &self, batch: Vec<RequestKey>
        ) -> BoxFuture<'_, Result<HashMap<RequestKey, RemoteAnswer>, Error>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let res = if self.fail {
                Err(Error::Transport("connection refused".into()))
            }
            else if self.silent {
                Ok(HashMap::new())
            }
            else {
                let vrp = Vrp::new(
                    IpNet::from_str("218.103.58.0/23").unwrap(),
                    24, Asn::from(4515)
                ).unwrap();
                Ok(batch.into_iter().map(|key| {
                    let covering = if vrp.covers(key.prefix) {
                        vec![vrp.clone()]
                    }
                    else {
                        Vec::new()
                    };
                    (key, RemoteAnswer::new(covering))
                }).collect())
            };
            let gate = self.gate.clone();
            Box::pin(async move {
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                res
            })
        }
    }

    fn net(s: &str) -> IpNet {
        IpNet::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn coalesces_requests() {
        let remote = Arc::new(MockRemote::default());
        let queue = ValidationQueue::new(remote.clone());
        let first = queue.enqueue(net("218.103.58.0/24"), Asn::from(4515));
        let second = queue.enqueue(net("218.103.58.0/24"), Asn::from(4515));
        let third = queue.enqueue(net("218.103.58.0/25"), Asn::from(4515));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.flush().await, 2);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
        assert!(queue.is_empty());

        let first = first.await.unwrap();
        let second = second.await.unwrap();
        assert_eq!(first.valid(), Some(true));
        assert_eq!(second.valid(), Some(true));
        assert_eq!(first.covering(), second.covering());
        assert_eq!(third.await.unwrap().valid(), Some(false));

        // Nothing left, so no further remote call.
        assert_eq!(queue.flush().await, 0);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn decides_locally() {
        let remote = Arc::new(MockRemote::default());
        let queue = ValidationQueue::new(remote);
        let bad_origin = queue.enqueue(net("218.103.58.0/23"), Asn::from(9999));
        let not_found = queue.enqueue(net("203.126.124.0/8"), Asn::from(9404));
        queue.flush().await;
        let bad_origin = bad_origin.await.unwrap();
        assert_eq!(bad_origin.valid(), Some(false));
        assert_eq!(bad_origin.reason(), Some("Not valid origin"));
        assert_eq!(not_found.await.unwrap().valid(), None);
    }

    #[tokio::test]
    async fn failure_rejects_batch() {
        let remote = Arc::new(MockRemote { fail: true, .. Default::default() });
        let queue = ValidationQueue::new(remote.clone());
        let first = queue.enqueue(net("218.103.58.0/24"), Asn::from(4515));
        let second = queue.enqueue(net("10.0.0.0/8"), Asn::from(1));
        queue.flush().await;
        assert!(queue.is_empty());
        assert!(matches!(first.await, Err(Error::Transport(_))));
        assert!(matches!(second.await, Err(Error::Transport(_))));

        // A new request gets a new entry.
        let third = queue.enqueue(net("218.103.58.0/24"), Asn::from(4515));
        assert_eq!(queue.len(), 1);
        queue.flush().await;
        assert!(third.await.is_err());
        assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unanswered_requests_are_rejected() {
        let remote = Arc::new(
            MockRemote { silent: true, .. Default::default() }
        );
        let queue = ValidationQueue::new(remote);
        let pending = queue.enqueue(net("218.103.58.0/24"), Asn::from(4515));
        queue.flush().await;
        assert!(queue.is_empty());
        assert!(matches!(pending.await, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn close_rejects_pending() {
        let queue = ValidationQueue::new(Arc::new(MockRemote::default()));
        let pending = queue.enqueue(net("218.103.58.0/24"), Asn::from(4515));
        queue.close();
        assert_eq!(pending.await.unwrap_err(), Error::QueueClosed);
    }

    #[tokio::test]
    async fn close_during_flush() {
        let gate = Arc::new(Notify::new());
        let remote = Arc::new(MockRemote {
            gate: Some(gate.clone()), .. Default::default()
        });
        let queue = Arc::new(ValidationQueue::new(remote.clone()));
        let first = queue.enqueue(net("218.103.58.0/24"), Asn::from(4515));
        let flush = tokio::spawn({
            let queue = queue.clone();
            async move { queue.flush().await }
        });
        while remote.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        // The same key enqueued again after closing belongs to the next
        // batch, not to the one still waiting for its answer.
        queue.close();
        let second = queue.enqueue(net("218.103.58.0/24"), Asn::from(4515));
        gate.notify_one();
        assert_eq!(flush.await.unwrap(), 1);
        assert_eq!(first.await.unwrap_err(), Error::QueueClosed);
        assert_eq!(queue.len(), 1);
        assert!(second.peek().is_none());

        gate.notify_one();
        assert_eq!(queue.flush().await, 1);
        assert_eq!(second.await.unwrap().valid(), Some(true));
        assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn flush_task() {
        let remote = Arc::new(MockRemote::default());
        let queue = Arc::new(ValidationQueue::new(remote.clone()));
        let task = queue.spawn_flush(Duration::from_millis(10));
        let first = queue.enqueue(net("218.103.58.0/24"), Asn::from(4515));
        let second = queue.enqueue(net("218.103.58.0/24"), Asn::from(4515));
        assert_eq!(first.await.unwrap().valid(), Some(true));
        assert_eq!(second.await.unwrap().valid(), Some(true));
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
        drop(queue);
        task.await.unwrap();
    }
}
