// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// A failed directed delivery.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// No subscriber is registered under the recipient key.
    #[error("no subscriber registered for '{0}'")]
    UnknownRecipient(String),
    /// The subscriber dropped its receiver.
    #[error("subscriber '{0}' disconnected")]
    Disconnected(String),
}

/// A keyed publish/subscribe bus supporting directed and broadcast delivery.
///
/// Each subscriber owns an unbounded `flume` channel. A broadcast clones the
/// message once per subscriber, so every subscriber sees every broadcast
/// exactly once; the order in which subscribers are served is unspecified.
#[derive(Debug)]
pub struct MessageBus<K, T>
where
    K: Eq + Hash + Clone + Debug,
    T: Clone + Send + 'static,
{
    subscribers: Mutex<HashMap<K, flume::Sender<T>>>,
}

impl<K, T> MessageBus<K, T>
where
    K: Eq + Hash + Clone + Debug,
    T: Clone + Send + 'static,
{
    /// Creates a bus with no subscribers.
    pub fn new() -> Self {
        log::debug!("MessageBus initialized.");
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<K, flume::Sender<T>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes `key`, returning the receiving end of its channel.
    ///
    /// Subscribing an existing key replaces its previous channel.
    pub fn subscribe(&self, key: K) -> flume::Receiver<T> {
        let (tx, rx) = flume::unbounded();
        if self.subscribers().insert(key.clone(), tx).is_some() {
            log::debug!("MessageBus: replaced subscription for {key:?}");
        }
        rx
    }

    /// Removes a subscriber. Returns `true` if it was registered.
    pub fn unsubscribe(&self, key: &K) -> bool {
        self.subscribers().remove(key).is_some()
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    /// Delivers a message to a single subscriber.
    pub fn send_to(&self, key: &K, message: T) -> Result<(), BusError> {
        let mut subscribers = self.subscribers();
        let sender = subscribers
            .get(key)
            .ok_or_else(|| BusError::UnknownRecipient(format!("{key:?}")))?;
        if sender.send(message).is_err() {
            subscribers.remove(key);
            return Err(BusError::Disconnected(format!("{key:?}")));
        }
        Ok(())
    }

    /// Delivers a message to every subscriber, returning how many received it.
    ///
    /// Subscribers whose receiver was dropped are pruned.
    pub fn broadcast(&self, message: T) -> usize {
        log::trace!("Broadcasting a message.");
        let mut subscribers = self.subscribers();
        let mut delivered = 0;
        subscribers.retain(|key, sender| match sender.send(message.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => {
                log::debug!("MessageBus: pruning disconnected subscriber {key:?}");
                false
            }
        });
        delivered
    }
}

impl<K, T> Default for MessageBus<K, T>
where
    K: Eq + Hash + Clone + Debug,
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flume::TryRecvError;
    use std::{sync::Arc, thread, time::Duration};

    #[derive(Debug, Clone, PartialEq)]
    enum TestMessage {
        Resized { width: u32, height: u32 },
        Ping,
    }

    #[test]
    fn directed_delivery_reaches_only_recipient() {
        let bus = MessageBus::<&'static str, TestMessage>::new();
        let a = bus.subscribe("a");
        let b = bus.subscribe("b");

        bus.send_to(&"a", TestMessage::Ping).expect("send should succeed");

        assert_eq!(a.try_recv(), Ok(TestMessage::Ping));
        assert_eq!(b.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn broadcast_reaches_every_subscriber_once() {
        let bus = MessageBus::<u8, TestMessage>::new();
        let receivers: Vec<_> = (0..3).map(|k| bus.subscribe(k)).collect();
        let msg = TestMessage::Resized {
            width: 1,
            height: 2,
        };

        assert_eq!(bus.broadcast(msg.clone()), 3);

        for rx in &receivers {
            assert_eq!(rx.try_recv(), Ok(msg.clone()));
            assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        }
    }

    #[test]
    fn unknown_recipient_is_an_error() {
        let bus = MessageBus::<u8, TestMessage>::new();
        assert_eq!(
            bus.send_to(&9, TestMessage::Ping),
            Err(BusError::UnknownRecipient("9".to_string()))
        );
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let bus = MessageBus::<u8, TestMessage>::new();
        let keep = bus.subscribe(1);
        drop(bus.subscribe(2));

        assert_eq!(bus.broadcast(TestMessage::Ping), 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.try_recv(), Ok(TestMessage::Ping));

        drop(keep);
        assert!(matches!(
            bus.send_to(&1, TestMessage::Ping),
            Err(BusError::Disconnected(_))
        ));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn resubscribe_replaces_channel() {
        let bus = MessageBus::<u8, TestMessage>::new();
        let old = bus.subscribe(1);
        let new = bus.subscribe(1);
        bus.broadcast(TestMessage::Ping);
        assert!(old.try_recv().is_err());
        assert_eq!(new.try_recv(), Ok(TestMessage::Ping));
    }

    #[test]
    fn broadcast_from_thread() {
        let bus = Arc::new(MessageBus::<u8, TestMessage>::new());
        let rx = bus.subscribe(0);
        let bus_clone = Arc::clone(&bus);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            bus_clone.broadcast(TestMessage::Ping);
        });

        match rx.recv_timeout(Duration::from_secs(1)) {
            Ok(message) => assert_eq!(message, TestMessage::Ping),
            Err(e) => panic!("Failed to receive broadcast from thread: {e:?}"),
        }
        handle.join().expect("Thread join failed");
    }
}
