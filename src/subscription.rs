//! Disposal handles and the registry that releases them together.

use smallvec::SmallVec;
use std::{
  any::Any,
  fmt::{Debug, Formatter},
  sync::{Arc, Mutex},
};

/// A cancellable handle returned by `subscribe`.
///
/// `unsubscribe` is idempotent: the second and every later call is a no-op
/// and never an error.
pub trait Subscription {
  /// Detaches whatever this handle stands for. Safe to call any number of
  /// times.
  fn unsubscribe(&mut self);

  fn is_closed(&self) -> bool;

  /// Activates RAII behavior: the subscription is unsubscribed as soon as
  /// the returned guard goes out of scope.
  fn unsubscribe_when_dropped(self) -> SubscriptionGuard<Self>
  where
    Self: Sized,
  {
    SubscriptionGuard(self)
  }
}

impl<T: Subscription + ?Sized> Subscription for Box<T> {
  #[inline]
  fn unsubscribe(&mut self) { (**self).unsubscribe() }

  #[inline]
  fn is_closed(&self) -> bool { (**self).is_closed() }
}

struct Inner<T: Subscription> {
  closed: bool,
  teardown: SmallVec<[T; 1]>,
}

impl<T: Subscription> Inner<T> {
  fn add(&mut self, mut subscription: T) {
    if self.closed {
      subscription.unsubscribe();
    } else {
      self.teardown.retain(|s| !s.is_closed());
      self.teardown.push(subscription);
    }
  }

  fn unsubscribe(&mut self) {
    if !self.closed {
      self.closed = true;
      for s in &mut self.teardown {
        s.unsubscribe();
      }
      self.teardown.clear();
    }
  }
}

impl<T: Subscription> Default for Inner<T> {
  fn default() -> Self { Inner { closed: false, teardown: SmallVec::new() } }
}

// Scope end behaves like explicit disposal, so a registry dropped with its
// owner still cancels everything it collected.
impl<T: Subscription> Drop for Inner<T> {
  fn drop(&mut self) { self.unsubscribe(); }
}

/// A scoped collection of subscriptions, released together.
///
/// Clones share one underlying registry. Disposal happens on explicit
/// `unsubscribe` or when the last handle is dropped, whichever comes first.
/// Every collected subscription is unsubscribed exactly once; adding to an
/// already disposed registry unsubscribes the input immediately.
#[derive(Clone, Default)]
pub struct SharedSubscription(
  Arc<Mutex<Inner<Box<dyn Subscription + Send + Sync>>>>,
);

impl SharedSubscription {
  pub fn new() -> Self { Self::default() }

  /// Collects `subscription`. Adding a registry to itself is ignored.
  pub fn add<S: Subscription + Send + Sync + 'static>(&self, subscription: S) {
    if !self.is_same(&subscription) {
      self.0.lock().unwrap().add(Box::new(subscription));
    }
  }

  fn is_same(&self, other: &dyn Any) -> bool {
    if let Some(other) = other.downcast_ref::<Self>() {
      Arc::ptr_eq(&self.0, &other.0)
    } else {
      false
    }
  }

  /// Number of live entries currently collected.
  pub fn teardown_size(&self) -> usize {
    self.0.lock().unwrap().teardown.len()
  }
}

impl Subscription for SharedSubscription {
  #[inline]
  fn unsubscribe(&mut self) { self.0.lock().unwrap().unsubscribe(); }

  #[inline]
  fn is_closed(&self) -> bool { self.0.lock().unwrap().closed }
}

impl Debug for SharedSubscription {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let inner = self.0.lock().unwrap();
    f.debug_struct("SharedSubscription")
      .field("closed", &inner.closed)
      .field("teardown_count", &inner.teardown.len())
      .finish()
  }
}

/// An RAII wrapper of a subscription: when the guard is dropped (falls out
/// of scope), the wrapped subscription is unsubscribed.
///
/// If the guard is not bound to a variable it is dropped immediately, which
/// is rarely what you want; hence `must_use`.
#[derive(Debug)]
#[must_use]
pub struct SubscriptionGuard<T: Subscription>(pub(crate) T);

impl<T: Subscription> SubscriptionGuard<T> {
  pub fn new(subscription: T) -> SubscriptionGuard<T> {
    SubscriptionGuard(subscription)
  }
}

impl<T: Subscription> Drop for SubscriptionGuard<T> {
  #[inline]
  fn drop(&mut self) { self.0.unsubscribe() }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn disposes_everything_once() {
    let registry = SharedSubscription::new();
    let first = SharedSubscription::new();
    let second = SharedSubscription::new();
    registry.add(first.clone());
    registry.add(second.clone());
    assert_eq!(registry.teardown_size(), 2);

    let mut handle = registry.clone();
    handle.unsubscribe();
    assert!(first.is_closed());
    assert!(second.is_closed());
    assert!(registry.is_closed());

    // Second disposal is a no-op.
    handle.unsubscribe();
    assert!(registry.is_closed());
  }

  #[test]
  fn add_after_disposal_unsubscribes_immediately() {
    let mut registry = SharedSubscription::new();
    registry.unsubscribe();

    let late = SharedSubscription::new();
    registry.add(late.clone());
    assert!(late.is_closed());
    assert_eq!(registry.teardown_size(), 0);
  }

  #[test]
  fn add_prunes_already_closed_entries() {
    let registry = SharedSubscription::new();
    let mut gone = SharedSubscription::new();
    registry.add(gone.clone());
    gone.unsubscribe();

    registry.add(SharedSubscription::new());
    assert_eq!(registry.teardown_size(), 1);
  }

  #[test]
  fn adding_registry_to_itself_is_ignored() {
    let registry = SharedSubscription::new();
    registry.add(registry.clone());
    assert_eq!(registry.teardown_size(), 0);
  }

  #[test]
  fn dropping_last_handle_disposes() {
    let child = SharedSubscription::new();
    {
      let registry = SharedSubscription::new();
      registry.add(child.clone());
      assert!(!child.is_closed());
    }
    assert!(child.is_closed());
  }

  #[test]
  fn guard_unsubscribes_on_drop() {
    let tracked = SharedSubscription::new();
    {
      let _guard = tracked.clone().unsubscribe_when_dropped();
      assert!(!tracked.is_closed());
    }
    assert!(tracked.is_closed());
  }
}
