//! Typed pub/sub event channels.
//!
//! Systems subscribe named delegates to event types during
//! `subscribe_to_events`. Delivery is either immediate (`trigger_event`)
//! or deferred through a queue drained by `dispatch_queued`, typically
//! once per frame between scheduler passes.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

type ErasedHandler = Box<dyn Fn(&dyn Any) + Send + Sync>;

struct Subscription {
    name: String,
    handler: ErasedHandler,
}

/// Event channel registry shared by all systems through `EngineManagers`.
#[derive(Default)]
pub struct EventManager {
    channels: RwLock<HashMap<TypeId, Vec<Subscription>>>,
    queue: Mutex<Vec<(TypeId, Box<dyn Any + Send>)>>,
}

impl EventManager {
    /// Creates a manager with no channels and an empty deferred queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a named delegate to events of type `E`.
    ///
    /// A second delegate with the same name on the same event type is a
    /// no-op: the existing subscription is kept and a warning is logged.
    pub fn subscribe<E: 'static>(
        &self,
        name: &str,
        handler: impl Fn(&E) + Send + Sync + 'static,
    ) {
        let mut channels = match self.channels.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let subscriptions = channels.entry(TypeId::of::<E>()).or_default();
        if subscriptions.iter().any(|s| s.name == name) {
            log::warn!(
                "duplicate event subscription '{}' for {}, keeping the existing delegate",
                name,
                std::any::type_name::<E>()
            );
            return;
        }
        subscriptions.push(Subscription {
            name: name.to_owned(),
            handler: Box::new(move |any| {
                if let Some(event) = any.downcast_ref::<E>() {
                    handler(event);
                }
            }),
        });
    }

    /// Delivers `event` to every subscribed delegate, on the calling
    /// thread, before returning.
    pub fn trigger_event<E: 'static>(&self, event: &E) {
        self.fan_out(TypeId::of::<E>(), event);
    }

    /// Queues `event` for the next `dispatch_queued` call.
    pub fn enqueue_event<E: 'static + Send>(&self, event: E) {
        let mut queue = match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        queue.push((TypeId::of::<E>(), Box::new(event)));
    }

    /// Drains the deferred queue and delivers each event in enqueue
    /// order. Events enqueued by a delegate during the drain are held
    /// for the next call.
    pub fn dispatch_queued(&self) {
        let drained = {
            let mut queue = match self.queue.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::take(&mut *queue)
        };
        for (type_id, event) in &drained {
            self.fan_out(*type_id, event.as_ref());
        }
    }

    fn fan_out(&self, type_id: TypeId, event: &dyn Any) {
        let channels = match self.channels.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(subscriptions) = channels.get(&type_id) {
            for subscription in subscriptions {
                (subscription.handler)(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    struct Collision {
        impulse: u32,
    }

    #[test]
    fn trigger_fans_out_to_all_delegates() {
        let events = EventManager::new();
        let total = Arc::new(AtomicU32::new(0));

        let t = total.clone();
        events.subscribe::<Collision>("physics", move |c| {
            t.fetch_add(c.impulse, Ordering::Relaxed);
        });
        let t = total.clone();
        events.subscribe::<Collision>("audio", move |c| {
            t.fetch_add(c.impulse, Ordering::Relaxed);
        });

        events.trigger_event(&Collision { impulse: 3 });
        assert_eq!(total.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn duplicate_subscription_is_a_no_op() {
        let events = EventManager::new();
        let hits = Arc::new(AtomicU32::new(0));

        let h = hits.clone();
        events.subscribe::<Collision>("physics", move |_| {
            h.fetch_add(1, Ordering::Relaxed);
        });
        let h = hits.clone();
        events.subscribe::<Collision>("physics", move |_| {
            h.fetch_add(100, Ordering::Relaxed);
        });

        events.trigger_event(&Collision { impulse: 0 });
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn queued_events_deliver_on_dispatch_only() {
        let events = EventManager::new();
        let hits = Arc::new(AtomicU32::new(0));

        let h = hits.clone();
        events.subscribe::<Collision>("physics", move |c| {
            h.fetch_add(c.impulse, Ordering::Relaxed);
        });

        events.enqueue_event(Collision { impulse: 2 });
        events.enqueue_event(Collision { impulse: 5 });
        assert_eq!(hits.load(Ordering::Relaxed), 0);

        events.dispatch_queued();
        assert_eq!(hits.load(Ordering::Relaxed), 7);

        events.dispatch_queued();
        assert_eq!(hits.load(Ordering::Relaxed), 7);
    }
}
