//! Replay-last-value publisher used for the selected game and the derived
//! asset URL map.
//!
//! New subscribers receive the current value immediately, then every
//! published value in publish order. Delivery runs on the thread that started
//! the round, with the state lock released, so subscribers may call back into
//! the publisher. Anything published while a round is running is queued and
//! delivered by that round.

use std::collections::VecDeque;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<T> = Arc<Mutex<Box<dyn FnMut(&T) + Send>>>;

enum Sink<T> {
    Callback(Callback<T>),
    Channel(Sender<T>),
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Callback(callback) => Self::Callback(Arc::clone(callback)),
            Self::Channel(sender) => Self::Channel(sender.clone()),
        }
    }
}

impl<T: Clone> Sink<T> {
    fn deliver(&self, value: &T) -> bool {
        match self {
            Self::Callback(callback) => {
                let mut callback = match callback.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let callback: &mut (dyn FnMut(&T) + Send) = &mut **callback;
                callback(value);
                true
            }
            Self::Channel(sender) => sender.send(value.clone()).is_ok(),
        }
    }
}

struct Subscriber<T> {
    id: SubscriptionId,
    sink: Sink<T>,
}

struct PublisherState<T> {
    current: T,
    subscribers: Vec<Subscriber<T>>,
    pending: VecDeque<T>,
    delivering: bool,
    next_id: u64,
}

pub struct Publisher<T> {
    state: Arc<Mutex<PublisherState<T>>>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock_state(&self.state);
        f.debug_struct("Publisher")
            .field("current", &state.current)
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}

impl<T: Clone + Send + 'static> Publisher<T> {
    pub fn new(initial: T) -> Self {
        Self {
            state: Arc::new(Mutex::new(PublisherState {
                current: initial,
                subscribers: Vec::new(),
                pending: VecDeque::new(),
                delivering: false,
                next_id: 0,
            })),
        }
    }

    pub fn current(&self) -> T {
        lock_state(&self.state).current.clone()
    }

    /// Replaces the current value. When no round is running, the caller's
    /// thread delivers it to every subscriber before returning. While a round
    /// is running, from a subscriber or from another thread, the value is
    /// queued and that round delivers it; this call returns right away.
    pub fn publish(&self, value: T) {
        {
            let mut state = lock_state(&self.state);
            state.current = value.clone();
            state.pending.push_back(value);
            if state.delivering {
                return;
            }
            state.delivering = true;
        }
        let mut round = DeliveryRound {
            state: &self.state,
            finished: false,
        };
        round.drain();
    }

    pub fn subscribe(&self, callback: impl FnMut(&T) + Send + 'static) -> SubscriptionId {
        let callback: Callback<T> = Arc::new(Mutex::new(Box::new(callback)));
        let (id, current) = {
            let mut state = lock_state(&self.state);
            let id = register(&mut state, Sink::Callback(Arc::clone(&callback)));
            (id, state.current.clone())
        };
        Sink::Callback(callback).deliver(&current);
        id
    }

    pub fn stream(&self) -> Receiver<T> {
        let (sender, receiver) = mpsc::channel();
        let mut state = lock_state(&self.state);
        if sender.send(state.current.clone()).is_ok() {
            register(&mut state, Sink::Channel(sender));
        }
        receiver
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = lock_state(&self.state);
        let before = state.subscribers.len();
        state.subscribers.retain(|subscriber| subscriber.id != id);
        state.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        lock_state(&self.state).subscribers.len()
    }
}

fn register<T>(state: &mut PublisherState<T>, sink: Sink<T>) -> SubscriptionId {
    state.next_id += 1;
    let id = SubscriptionId(state.next_id);
    state.subscribers.push(Subscriber { id, sink });
    id
}

fn lock_state<T>(state: &Mutex<PublisherState<T>>) -> MutexGuard<'_, PublisherState<T>> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct DeliveryRound<'a, T> {
    state: &'a Mutex<PublisherState<T>>,
    finished: bool,
}

impl<T: Clone> DeliveryRound<'_, T> {
    fn drain(&mut self) {
        loop {
            let (value, sinks) = {
                let mut state = lock_state(self.state);
                let Some(value) = state.pending.pop_front() else {
                    state.delivering = false;
                    self.finished = true;
                    return;
                };
                let sinks = state
                    .subscribers
                    .iter()
                    .map(|subscriber| (subscriber.id, subscriber.sink.clone()))
                    .collect::<Vec<_>>();
                (value, sinks)
            };

            let disconnected = sinks
                .into_iter()
                .filter(|(_, sink)| !sink.deliver(&value))
                .map(|(id, _)| id)
                .collect::<Vec<_>>();
            if !disconnected.is_empty() {
                lock_state(self.state)
                    .subscribers
                    .retain(|subscriber| !disconnected.contains(&subscriber.id));
            }
        }
    }
}

impl<T> Drop for DeliveryRound<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            let mut state = lock_state(self.state);
            state.pending.clear();
            state.delivering = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};

    use super::*;

    fn recorder(publisher: &Publisher<u32>) -> Arc<Mutex<Vec<u32>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        publisher.subscribe(move |value| sink.lock().expect("seen").push(*value));
        seen
    }

    #[test]
    fn new_subscriber_gets_current_value_then_changes() {
        let publisher = Publisher::new(1u32);
        publisher.publish(2);
        let seen = recorder(&publisher);
        publisher.publish(3);
        assert_eq!(*seen.lock().expect("seen"), vec![2, 3]);
    }

    #[test]
    fn subscribers_are_notified_in_subscription_order() {
        let publisher = Publisher::new(0u32);
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            publisher.subscribe(move |value| {
                if *value == 7 {
                    order.lock().expect("order").push(tag);
                }
            });
        }
        publisher.publish(7);
        assert_eq!(
            *order.lock().expect("order"),
            vec!["first", "second", "third"]
        );
    }

    #[test]
    fn publishing_from_a_subscriber_is_queued_behind_current_round() {
        let publisher = Publisher::new(0u32);
        let inner = publisher.clone();
        publisher.subscribe(move |value| {
            if *value == 1 {
                inner.publish(2);
            }
        });
        let seen = recorder(&publisher);

        publisher.publish(1);

        assert_eq!(*seen.lock().expect("seen"), vec![0, 1, 2]);
        assert_eq!(publisher.current(), 2);
    }

    #[test]
    fn publish_from_another_thread_during_a_round_is_delivered_by_that_round() {
        let publisher = Publisher::new(0u32);
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        publisher.subscribe(move |value| {
            if *value == 1 {
                entered_tx.send(()).expect("entered");
                release_rx.recv().expect("release");
            }
        });
        let seen = recorder(&publisher);

        let first = publisher.clone();
        let round = std::thread::spawn(move || first.publish(1));
        entered_rx.recv().expect("round started");

        publisher.publish(2);
        assert_eq!(*seen.lock().expect("seen"), vec![0]);
        assert_eq!(publisher.current(), 2);

        release_tx.send(()).expect("release");
        round.join().expect("round thread");
        assert_eq!(*seen.lock().expect("seen"), vec![0, 1, 2]);
    }

    #[test]
    fn stream_replays_current_and_prunes_dropped_receivers() {
        let publisher = Publisher::new(String::from("none"));
        let receiver = publisher.stream();
        publisher.publish(String::from("game-1"));

        assert_eq!(receiver.try_recv().expect("replay"), "none");
        assert_eq!(receiver.try_recv().expect("update"), "game-1");

        drop(receiver);
        publisher.publish(String::from("game-2"));
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn unsubscribed_callback_stops_receiving() {
        let publisher = Publisher::new(0u32);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = publisher.subscribe(move |value| sink.lock().expect("seen").push(*value));

        assert!(publisher.unsubscribe(id));
        assert!(!publisher.unsubscribe(id));
        publisher.publish(5);
        assert_eq!(*seen.lock().expect("seen"), vec![0]);
    }

    #[test]
    fn panicking_subscriber_does_not_wedge_delivery() {
        let publisher = Publisher::new(0u32);
        let id = publisher.subscribe(|value| {
            if *value == 1 {
                panic!("subscriber failure");
            }
        });
        let result = panic::catch_unwind(AssertUnwindSafe(|| publisher.publish(1)));
        assert!(result.is_err());

        publisher.unsubscribe(id);
        let seen = recorder(&publisher);
        publisher.publish(2);
        assert_eq!(*seen.lock().expect("seen"), vec![1, 2]);
    }
}
