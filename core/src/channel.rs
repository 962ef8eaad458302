//! Synchronous publish/subscribe channels.

use std::fmt;

/// Handle returned when subscribing, used to unsubscribe later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Ordered subscriber list for a single notification channel.
///
/// Events are delivered synchronously to every subscriber in subscription
/// order before [`Notifier::publish`] returns. Nothing is queued.
pub struct Notifier<E> {
    subscribers: Vec<(SubscriptionId, Box<dyn FnMut(&E)>)>,
    next_id: u64,
}

impl<E> Notifier<E> {
    /// Creates a channel without subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            next_id: 0,
        }
    }

    /// Appends a subscriber to the delivery order.
    pub fn subscribe<F>(&mut self, subscriber: F) -> SubscriptionId
    where
        F: FnMut(&E) + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    /// Removes a subscriber. Returns `false` when the id is unknown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(candidate, _)| *candidate != id);
        self.subscribers.len() != before
    }

    /// Delivers `event` to every subscriber.
    pub fn publish(&mut self, event: &E) {
        for (_, subscriber) in &mut self.subscribers {
            subscriber(event);
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<E> Default for Notifier<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Notifier<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Result of subscribing to a [`OneShot`] channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OneShotSubscription {
    /// The callback is stored and runs when the channel fires.
    Pending(SubscriptionId),
    /// The channel already fired; the callback was dropped without running.
    AlreadyFired,
}

/// Channel that fires at most once.
///
/// Callbacks registered before the channel fires run exactly once. Late
/// subscribers are told the signal is gone so they can take the immediate
/// path instead of waiting forever.
pub struct OneShot<E> {
    pending: Vec<(SubscriptionId, Box<dyn FnOnce(&E)>)>,
    fired: bool,
    next_id: u64,
}

impl<E> OneShot<E> {
    /// Creates a channel that has not fired yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            fired: false,
            next_id: 0,
        }
    }

    /// Reports whether the channel already fired.
    #[must_use]
    pub const fn is_fired(&self) -> bool {
        self.fired
    }

    /// Stores a callback for the upcoming signal.
    pub fn subscribe<F>(&mut self, callback: F) -> OneShotSubscription
    where
        F: FnOnce(&E) + 'static,
    {
        if self.fired {
            return OneShotSubscription::AlreadyFired;
        }

        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.pending.push((id, Box::new(callback)));
        OneShotSubscription::Pending(id)
    }

    /// Drops a stored callback. Returns `false` when the id is unknown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(candidate, _)| *candidate != id);
        self.pending.len() != before
    }

    /// Fires the channel. Returns `false` if it had already fired.
    pub fn fire(&mut self, event: &E) -> bool {
        if self.fired {
            return false;
        }

        self.fired = true;
        for (_, callback) in self.pending.drain(..) {
            callback(event);
        }
        true
    }
}

impl<E> Default for OneShot<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for OneShot<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneShot")
            .field("pending", &self.pending.len())
            .field("fired", &self.fired)
            .finish()
    }
}
