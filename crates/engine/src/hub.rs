use crate::controller::Snapshot;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::watch;

type Observer = Arc<dyn Fn(&Arc<Snapshot>) + Send + Sync>;

struct Inner {
    next_id: u64,
    observers: BTreeMap<u64, Observer>,
    latest: Arc<Snapshot>,
}

/// Fans playback snapshots out to every registered observer.
///
/// Observers are called on the publishing task, in registration order, and
/// only when the snapshot actually changed. Deliveries are serialized, so an
/// observer never sees an older snapshot after a newer one. An observer must
/// not call [`StateHub::publish`] or [`StateHub::subscribe`] itself.
#[derive(Clone)]
pub struct StateHub {
    inner: Arc<Mutex<Inner>>,
    delivery: Arc<Mutex<()>>,
    watch: Arc<watch::Sender<Arc<Snapshot>>>,
}

impl StateHub {
    pub fn new(initial: Snapshot) -> Self {
        let latest = Arc::new(initial);
        let (watch, _) = watch::channel(latest.clone());
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 0,
                observers: BTreeMap::new(),
                latest,
            })),
            delivery: Arc::new(Mutex::new(())),
            watch: Arc::new(watch),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn deliver(&self) -> MutexGuard<'_, ()> {
        self.delivery.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The observer is invoked once right away with the current snapshot.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&Arc<Snapshot>) + Send + Sync + 'static,
    {
        let observer: Observer = Arc::new(observer);
        let _delivering = self.deliver();
        let (id, latest) = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.observers.insert(id, observer.clone());
            (id, inner.latest.clone())
        };
        observer(&latest);
        Subscription {
            id,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Returns false when nothing changed and no observer was called.
    pub fn publish(&self, snapshot: Snapshot) -> bool {
        let _delivering = self.deliver();
        let (latest, observers) = {
            let mut inner = self.lock();
            if *inner.latest == snapshot {
                return false;
            }
            inner.latest = Arc::new(snapshot);
            let observers: Vec<Observer> = inner.observers.values().cloned().collect();
            (inner.latest.clone(), observers)
        };
        self.watch.send_replace(latest.clone());
        for observer in observers {
            observer(&latest);
        }
        true
    }

    pub fn latest(&self) -> Arc<Snapshot> {
        self.lock().latest.clone()
    }

    pub fn watch(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.watch.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }
}

/// Keeps an observer registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the observer"]
pub struct Subscription {
    id: u64,
    hub: Weak<Mutex<Inner>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            let mut inner = inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            inner.observers.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::StateHub;
    use crate::controller::Snapshot;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    fn volume(v: f64) -> Snapshot {
        Snapshot {
            volume: v,
            ..Snapshot::default()
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<f64>>>, impl Fn(&Arc<Snapshot>) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |s: &Arc<Snapshot>| sink.lock().unwrap().push(s.volume))
    }

    #[test]
    fn subscribers_see_current_state_then_changes() {
        let hub = StateHub::new(volume(0.9));
        let (seen, observer) = recorder();
        let _sub = hub.subscribe(observer);

        assert!(hub.publish(volume(0.5)));
        assert!(!hub.publish(volume(0.5)));
        assert!(hub.publish(volume(0.2)));

        assert_eq!(*seen.lock().unwrap(), vec![0.9, 0.5, 0.2]);
        assert_eq!(hub.latest().volume, 0.2);
    }

    #[test]
    fn every_observer_is_notified() {
        let hub = StateHub::new(volume(0.0));
        let (a, obs_a) = recorder();
        let (b, obs_b) = recorder();
        let _sa = hub.subscribe(obs_a);
        let _sb = hub.subscribe(obs_b);

        hub.publish(volume(1.0));
        assert_eq!(*a.lock().unwrap(), vec![0.0, 1.0]);
        assert_eq!(*b.lock().unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn dropped_subscription_stops_notifications() {
        let hub = StateHub::new(volume(0.0));
        let (seen, observer) = recorder();
        let sub = hub.subscribe(observer);
        assert_eq!(hub.observer_count(), 1);

        sub.unsubscribe();
        assert_eq!(hub.observer_count(), 0);
        hub.publish(volume(0.7));
        assert_eq!(*seen.lock().unwrap(), vec![0.0]);
    }

    #[test]
    fn observer_may_read_the_hub_while_notified() {
        let hub = StateHub::new(volume(0.0));
        let reader = hub.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = hub.subscribe(move |_| sink.lock().unwrap().push(reader.latest().volume));

        hub.publish(volume(0.3));
        assert_eq!(*seen.lock().unwrap(), vec![0.0, 0.3]);
    }

    #[test]
    fn publish_during_first_delivery_is_seen_last() {
        let hub = StateHub::new(volume(0.0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (entered_tx, entered_rx) = mpsc::channel();
        let entered_tx = Mutex::new(entered_tx);
        let first = AtomicBool::new(true);

        let sink = seen.clone();
        let subscriber = hub.clone();
        let worker = thread::spawn(move || {
            subscriber.subscribe(move |s: &Arc<Snapshot>| {
                if first.swap(false, Ordering::SeqCst) {
                    entered_tx.lock().unwrap().send(()).unwrap();
                    thread::sleep(Duration::from_millis(50));
                }
                sink.lock().unwrap().push(s.volume);
            })
        });

        entered_rx.recv().unwrap();
        assert!(hub.publish(volume(0.5)));
        let _sub = worker.join().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0.0, 0.5]);
        assert_eq!(hub.latest().volume, 0.5);
    }

    #[tokio::test]
    async fn watch_receivers_track_the_latest_snapshot() {
        let hub = StateHub::new(volume(0.0));
        let mut rx = hub.watch();
        hub.publish(volume(0.4));

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().volume, 0.4);
    }
}
