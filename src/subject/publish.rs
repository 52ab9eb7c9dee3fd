//! A broadcast subject: no replay, future events only.

use std::sync::Arc;

use crate::observable::Observable;
use crate::observer::{Event, Observer};
use crate::subject::core::{weak_host, CoreDisposer, SubjectCore, Terminal};
use crate::subject::subject_subscription::SubjectSubscription;
use crate::subscription::{SharedSubscription, Subscription};

/// Multicasts events to whoever is subscribed at emission time.
///
/// Nothing is buffered: a subscriber only sees events emitted after it
/// joined, and one joining after `complete`/`error` gets an already closed
/// handle. Every subscription handed out, plus any link the subject holds
/// itself (a merge arm, an upstream source), lives in its owned registry;
/// disposing the registry cancels them all at once.
pub struct PublishSubject<Item, Err = ()> {
  core: Arc<SubjectCore<(), Item, Err>>,
  registry: SharedSubscription,
}

impl<Item, Err> Clone for PublishSubject<Item, Err> {
  fn clone(&self) -> Self {
    PublishSubject {
      core: self.core.clone(),
      registry: self.registry.clone(),
    }
  }
}

impl<Item, Err> PublishSubject<Item, Err>
where
  Item: Send + 'static,
  Err: Send + 'static,
{
  pub fn new() -> Self { Self::with_registry(SharedSubscription::new()) }

  /// Ties the subject's lifetime to an externally owned registry: when the
  /// host disposes `registry`, the subject is disposed with it.
  pub fn with_registry(registry: SharedSubscription) -> Self {
    let core = Arc::new(SubjectCore::new(()));
    registry.add(CoreDisposer::new(weak_host(&core)));
    PublishSubject { core, registry }
  }

  /// Adds `subscription` to the subject's owned registry, sharing its
  /// lifetime.
  pub fn track<S: Subscription + Send + Sync + 'static>(
    &self,
    subscription: S,
  ) {
    self.registry.add(subscription);
  }

  /// A sink handle feeding this subject.
  pub fn as_observer(&self) -> Self { self.clone() }
}

impl<Item, Err> Default for PublishSubject<Item, Err>
where
  Item: Send + 'static,
  Err: Send + 'static,
{
  fn default() -> Self { Self::new() }
}

impl<Item, Err> Observable<Item, Err> for PublishSubject<Item, Err>
where
  Item: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  type Unsub = SubjectSubscription;

  fn actual_subscribe<O>(&self, observer: O) -> Self::Unsub
  where
    O: Observer<Item, Err> + Send + 'static,
  {
    let subscription = self.core.commit(|state| {
      if state.is_stopped() {
        return SubjectSubscription::closed();
      }
      let (id, slot) = state.subscribers.add(Box::new(observer));
      SubjectSubscription::new(slot.closed_flag(), weak_host(&self.core), id)
    });
    if !subscription.is_closed() {
      self.registry.add(subscription.clone());
    }
    subscription
  }
}

impl<Item, Err> Observer<Item, Err> for PublishSubject<Item, Err>
where
  Item: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  fn next(&mut self, value: Item) {
    self.core.commit(|state| {
      if !state.is_stopped() {
        state.emit_all(Event::Next(value));
      }
    });
  }

  fn error(&mut self, err: Err) {
    self.core.commit(|state| state.stop(Terminal::Error(err)));
  }

  fn complete(&mut self) {
    self.core.commit(|state| state.stop(Terminal::Complete));
  }
}

/// Disposing the subject disposes its registry, and with it every
/// outstanding subscription.
impl<Item, Err> Subscription for PublishSubject<Item, Err> {
  fn unsubscribe(&mut self) { self.registry.unsubscribe(); }

  fn is_closed(&self) -> bool { self.registry.is_closed() }
}
