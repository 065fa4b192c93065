//! Explicit publish/subscribe dispatcher.
//!
//! A bus is constructed by the session and handed to every component that produces or
//! consumes events. Each subscriber gets its own unbounded queue; the frame loop drains
//! its queues with non-blocking reads. Dropping a [`Subscription`] unregisters it.

use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::trace;

struct Registry<E> {
    next_id: u64,
    subscribers: Vec<(u64, Sender<E>)>,
}

pub struct EventBus<E> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<E>(registry: &Mutex<Registry<E>>) -> MutexGuard<'_, Registry<E>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    pub fn subscribe(&self) -> Subscription<E> {
        let (tx, rx) = unbounded();
        let mut reg = lock(&self.registry);
        let id = reg.next_id;
        reg.next_id += 1;
        reg.subscribers.push((id, tx));
        trace!("bus subscriber {} registered", id);
        Subscription {
            id,
            receiver: rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Delivers `event` to every live subscriber and returns how many received it.
    pub fn publish(&self, event: E) -> usize {
        let mut reg = lock(&self.registry);
        let mut delivered = 0;
        reg.subscribers.retain(|(_, tx)| {
            let ok = tx.send(event.clone()).is_ok();
            delivered += ok as usize;
            ok
        });
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).subscribers.len()
    }
}

/// Scoped registration on an [`EventBus`].
pub struct Subscription<E> {
    id: u64,
    receiver: Receiver<E>,
    registry: Weak<Mutex<Registry<E>>>,
}

impl<E> Subscription<E> {
    pub fn try_recv(&self) -> Option<E> {
        self.receiver.try_recv().ok()
    }

    /// Everything queued since the last read, oldest first.
    pub fn drain(&self) -> Vec<E> {
        self.receiver.try_iter().collect()
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).subscribers.retain(|(id, _)| *id != self.id);
            trace!("bus subscriber {} unregistered", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fans_out_to_every_subscriber() {
        let bus = EventBus::<u32>::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        assert_eq!(bus.publish(7), 2);
        assert_eq!(a.drain(), vec![7]);
        assert_eq!(b.try_recv(), Some(7));
        assert_eq!(b.try_recv(), None);
    }

    #[test]
    fn dropping_a_subscription_unregisters_it() {
        let bus = EventBus::<&'static str>::new();
        let a = bus.subscribe();
        {
            let _b = bus.subscribe();
            assert_eq!(bus.subscriber_count(), 2);
        }
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.publish("calibration"), 1);
        assert_eq!(a.drain(), vec!["calibration"]);
    }

    #[test]
    fn publishes_across_threads() {
        let bus = EventBus::<String>::new();
        let sub = bus.subscribe();
        let producer = bus.clone();
        std::thread::spawn(move || {
            producer.publish("Begin".to_string());
        })
        .join()
        .unwrap();
        assert_eq!(sub.drain(), vec!["Begin".to_string()]);
    }

    #[test]
    fn subscription_outliving_the_bus_is_harmless() {
        let bus = EventBus::<u8>::new();
        let sub = bus.subscribe();
        bus.publish(1);
        drop(bus);
        assert_eq!(sub.drain(), vec![1]);
    }
}
