//! Cache observer trait, composite fan-out, and the IP data refresh queue.
//!
//! Defines [`CacheObserver`] for reacting to entities entering or being
//! served from an [`EntityCache`](super::EntityCache), and
//! [`CompositeCacheObserver`] which fans notifications out to several
//! observers.

use std::sync::Arc;

use banstick_core::{Entity, Ip, IpKey, SurrogateId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use super::handle::EntityHandle;

/// Observer for entities passing through an `EntityCache`.
///
/// Every hook defaults to a no-op. Hooks run on the caller's task and must
/// not block.
///
/// Used as `Arc<dyn CacheObserver<E>>`.
pub trait CacheObserver<E: Entity>: Send + Sync {
    /// A lookup was served from memory.
    fn on_hit(&self, _handle: &EntityHandle<E>) {}

    /// A lookup missed memory and was loaded from the backing store.
    fn on_load(&self, _handle: &EntityHandle<E>) {}

    /// A brand-new record was persisted and cached.
    fn on_create(&self, _handle: &EntityHandle<E>) {}

    /// A record was inserted by the preload task.
    fn on_preload(&self, _handle: &EntityHandle<E>) {}
}

/// Composite observer that fans out to multiple observers.
pub struct CompositeCacheObserver<E: Entity> {
    observers: Vec<Arc<dyn CacheObserver<E>>>,
}

impl<E: Entity> CompositeCacheObserver<E> {
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn CacheObserver<E>>>) -> Self {
        Self { observers }
    }
}

impl<E: Entity> Default for CompositeCacheObserver<E> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<E: Entity> CacheObserver<E> for CompositeCacheObserver<E> {
    fn on_hit(&self, handle: &EntityHandle<E>) {
        for observer in &self.observers {
            observer.on_hit(handle);
        }
    }

    fn on_load(&self, handle: &EntityHandle<E>) {
        for observer in &self.observers {
            observer.on_load(handle);
        }
    }

    fn on_create(&self, handle: &EntityHandle<E>) {
        for observer in &self.observers {
            observer.on_create(handle);
        }
    }

    fn on_preload(&self, handle: &EntityHandle<E>) {
        for observer in &self.observers {
            observer.on_preload(handle);
        }
    }
}

/// An IP record that should have its geolocation/proxy data looked up again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshRequest {
    pub ip: SurrogateId,
    pub key: IpKey,
}

/// Queues already-known IPs for a future IP data lookup.
///
/// Attached to the Ip cache: whenever an existing address is looked up
/// (served from memory or loaded from the store, but not freshly created)
/// it is offered to a bounded channel. A full channel drops the request.
pub struct IpDataRefreshQueue {
    tx: mpsc::Sender<RefreshRequest>,
}

impl IpDataRefreshQueue {
    /// Creates the queue and the receiver an IP data resolver drains.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RefreshRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    fn offer(&self, handle: &EntityHandle<Ip>) {
        let request = RefreshRequest {
            ip: handle.id(),
            key: *handle.key(),
        };
        match self.tx.try_send(request) {
            Ok(()) => debug!(ip = %request.key, "registered future retrieval of ip data"),
            Err(TrySendError::Full(_)) => {
                warn!(ip = %request.key, "ip data refresh queue full; dropping request");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

impl CacheObserver<Ip> for IpDataRefreshQueue {
    fn on_hit(&self, handle: &EntityHandle<Ip>) {
        self.offer(handle);
    }

    fn on_load(&self, handle: &EntityHandle<Ip>) {
        self.offer(handle);
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use banstick_core::Ban;

    use super::*;

    /// Test observer that counts how many times each hook is called.
    #[derive(Default)]
    #[allow(clippy::struct_field_names)]
    struct CountingObserver {
        hit_count: AtomicUsize,
        load_count: AtomicUsize,
        create_count: AtomicUsize,
        preload_count: AtomicUsize,
    }

    impl CacheObserver<Ban> for CountingObserver {
        fn on_hit(&self, _: &EntityHandle<Ban>) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
        }
        fn on_load(&self, _: &EntityHandle<Ban>) {
            self.load_count.fetch_add(1, Ordering::Relaxed);
        }
        fn on_create(&self, _: &EntityHandle<Ban>) {
            self.create_count.fetch_add(1, Ordering::Relaxed);
        }
        fn on_preload(&self, _: &EntityHandle<Ban>) {
            self.preload_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn ban_handle() -> EntityHandle<Ban> {
        EntityHandle::clean(SurrogateId(1), SurrogateId(1), Ban::admin(0, "x"))
    }

    fn ip_handle(last_octet: u8) -> EntityHandle<Ip> {
        let key = IpKey::host(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last_octet)));
        EntityHandle::clean(SurrogateId(u64::from(last_octet)), key, Ip::new(key, 0))
    }

    #[test]
    fn empty_composite_does_not_panic() {
        let composite = CompositeCacheObserver::<Ban>::default();
        let handle = ban_handle();
        composite.on_hit(&handle);
        composite.on_load(&handle);
        composite.on_create(&handle);
        composite.on_preload(&handle);
    }

    #[test]
    fn multiple_observers_all_receive_notifications() {
        let obs1 = Arc::new(CountingObserver::default());
        let obs2 = Arc::new(CountingObserver::default());
        let composite = CompositeCacheObserver::new(vec![
            Arc::clone(&obs1) as Arc<dyn CacheObserver<Ban>>,
            Arc::clone(&obs2) as Arc<dyn CacheObserver<Ban>>,
        ]);

        let handle = ban_handle();
        composite.on_hit(&handle);
        composite.on_hit(&handle);
        composite.on_load(&handle);
        composite.on_create(&handle);
        composite.on_preload(&handle);

        for obs in [&obs1, &obs2] {
            assert_eq!(obs.hit_count.load(Ordering::Relaxed), 2);
            assert_eq!(obs.load_count.load(Ordering::Relaxed), 1);
            assert_eq!(obs.create_count.load(Ordering::Relaxed), 1);
            assert_eq!(obs.preload_count.load(Ordering::Relaxed), 1);
        }
    }

    #[test]
    fn refresh_queue_offers_hits_and_loads_but_not_creates() {
        let (queue, mut rx) = IpDataRefreshQueue::new(8);
        let handle = ip_handle(5);

        queue.on_create(&handle);
        queue.on_preload(&handle);
        assert!(rx.try_recv().is_err());

        queue.on_hit(&handle);
        queue.on_load(&handle);
        let first = rx.try_recv().unwrap();
        assert_eq!(first.ip, SurrogateId(5));
        assert_eq!(first.key, *handle.key());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn refresh_queue_drops_when_full() {
        let (queue, mut rx) = IpDataRefreshQueue::new(1);
        queue.on_hit(&ip_handle(1));
        queue.on_hit(&ip_handle(2));

        assert_eq!(rx.try_recv().unwrap().ip, SurrogateId(1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn refresh_queue_tolerates_closed_receiver() {
        let (queue, rx) = IpDataRefreshQueue::new(1);
        drop(rx);
        queue.on_hit(&ip_handle(1));
    }

    #[test]
    fn cache_observer_is_object_safe() {
        fn _assert_object_safe(_: &Arc<dyn CacheObserver<Ip>>) {}
    }
}
