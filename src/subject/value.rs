//! A subject holding a current value: snapshot on subscribe, then the feed.

use smallvec::smallvec;
use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc, Weak,
};

use crate::observable::{Observable, Subscribe};
use crate::observer::{Event, Observer};
use crate::subject::core::{weak_host, CoreDisposer, SubjectCore};
use crate::subject::subject_subscription::SubjectSubscription;
use crate::subscription::{SharedSubscription, Subscription};

/// A mutable value that broadcasts every change.
///
/// Subscribing synchronously delivers the value current at subscribe time
/// and registers for every later change: the snapshot and the registration
/// share one critical section, so a concurrent write is observed either in
/// the snapshot or as a live event, never both and never neither. Writes
/// commit under the subject lock but notify outside of it, so a handler may
/// freely read or write the subject it is being notified by.
///
/// A value subject has no `complete`/`error` state; it only stops when its
/// owned registry is disposed, which cancels every outstanding subscription.
pub struct ValueSubject<Item, Err = ()> {
  core: Arc<SubjectCore<Item, Item, Err>>,
  registry: SharedSubscription,
}

impl<Item, Err> Clone for ValueSubject<Item, Err> {
  fn clone(&self) -> Self {
    ValueSubject { core: self.core.clone(), registry: self.registry.clone() }
  }
}

impl<Item, Err> ValueSubject<Item, Err>
where
  Item: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  pub fn new(initial: Item) -> Self {
    let core = Arc::new(SubjectCore::new(initial));
    let registry = SharedSubscription::new();
    registry.add(CoreDisposer::new(weak_host(&core)));
    ValueSubject { core, registry }
  }

  /// The value as of now.
  pub fn value(&self) -> Item { self.core.read(|state| state.extra.clone()) }

  /// Commits `value` under the lock, then broadcasts it.
  pub fn set_value(&self, value: Item) { commit_value(&self.core, value) }

  /// Mutates the value in place under the lock, broadcasting the result.
  pub fn update<F: FnOnce(&mut Item)>(&self, f: F) {
    self.core.commit(|state| {
      if state.is_stopped() {
        return;
      }
      f(&mut state.extra);
      state.emit_all(Event::Next(state.extra.clone()));
    });
  }

  /// A sink handle feeding this subject; see the [`Observer`] impl.
  pub fn as_observer(&self) -> Self { self.clone() }

  /// A sink that does not keep the subject alive: once the last strong
  /// handle is dropped, feeding it becomes a no-op.
  pub fn weak_observer(&self) -> WeakValueObserver<Item, Err> {
    WeakValueObserver { core: Arc::downgrade(&self.core) }
  }

  /// Adds `subscription` to the subject's owned registry, sharing its
  /// lifetime.
  pub fn track<S: Subscription + Send + Sync + 'static>(
    &self,
    subscription: S,
  ) {
    self.registry.add(subscription);
  }

  /// Derives a two-way bound child subject through an accessor pair.
  ///
  /// `get` reads the projected part out of the parent value, `set` writes
  /// it back. A write on either side is relayed to the other; a shared
  /// relay flag keeps the update from echoing back to where it came from.
  /// Both relays reference their target weakly, so dropping one side makes
  /// the other side's relay a no-op instead of keeping it alive.
  pub fn project<U, G, S>(&self, get: G, set: S) -> ValueSubject<U, Err>
  where
    U: Clone + Send + 'static,
    G: Fn(&Item) -> U + Send + 'static,
    S: Fn(&mut Item, U) + Send + 'static,
  {
    let child = ValueSubject::<U, Err>::new(get(&self.value()));
    let relaying = Arc::new(AtomicBool::new(false));

    let down_target = Arc::downgrade(&child.core);
    let down_relay = relaying.clone();
    let down = self.subscribe(move |value: Item| {
      if !down_relay.swap(true, Ordering::AcqRel) {
        if let Some(core) = down_target.upgrade() {
          commit_value(&core, get(&value));
        }
        down_relay.store(false, Ordering::Release);
      }
    });
    child.track(down);

    let up_target = Arc::downgrade(&self.core);
    let _up = child.subscribe(move |value: U| {
      if !relaying.swap(true, Ordering::AcqRel) {
        if let Some(core) = up_target.upgrade() {
          core.commit(|state| {
            if !state.is_stopped() {
              set(&mut state.extra, value);
              state.emit_all(Event::Next(state.extra.clone()));
            }
          });
        }
        relaying.store(false, Ordering::Release);
      }
    });
    child
  }

  /// Keeps two subjects equal both ways: `other` first adopts this
  /// subject's current value, afterwards a write to either side is relayed
  /// to the other with the echo suppressed. Returns one handle covering
  /// both directions; dropping it tears the mirror down.
  #[must_use = "dropping the returned handle tears the mirror down"]
  pub fn mirror(&self, other: &ValueSubject<Item, Err>) -> SharedSubscription {
    let links = SharedSubscription::new();
    let relaying = Arc::new(AtomicBool::new(false));

    let forth_target = Arc::downgrade(&other.core);
    let forth_relay = relaying.clone();
    links.add(
      self.subscribe(move |value| relay(&forth_relay, &forth_target, value)),
    );

    let back_target = Arc::downgrade(&self.core);
    links
      .add(other.subscribe(move |value| relay(&relaying, &back_target, value)));
    links
  }
}

fn commit_value<Item, Err>(core: &SubjectCore<Item, Item, Err>, value: Item)
where
  Item: Clone,
  Err: Clone,
{
  core.commit(|state| {
    if state.is_stopped() {
      return;
    }
    state.extra = value.clone();
    state.emit_all(Event::Next(value));
  });
}

fn relay<Item, Err>(
  flag: &AtomicBool,
  target: &Weak<SubjectCore<Item, Item, Err>>,
  value: Item,
) where
  Item: Clone,
  Err: Clone,
{
  if !flag.swap(true, Ordering::AcqRel) {
    if let Some(core) = target.upgrade() {
      commit_value(&core, value);
    }
    flag.store(false, Ordering::Release);
  }
}

impl<Item, Err> Observable<Item, Err> for ValueSubject<Item, Err>
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
      // Snapshot and registration in one critical section: a concurrent
      // write lands either in the snapshot or behind it in the queue.
      state.emit_to(Event::Next(state.extra.clone()), smallvec![slot.clone()]);
      SubjectSubscription::new(slot.closed_flag(), weak_host(&self.core), id)
    });
    if !subscription.is_closed() {
      self.registry.add(subscription.clone());
    }
    subscription
  }
}

/// Feeding the subject a value is a locked set; a value subject has no
/// terminal, so `error` and `complete` are ignored.
impl<Item, Err> Observer<Item, Err> for ValueSubject<Item, Err>
where
  Item: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  fn next(&mut self, value: Item) { self.set_value(value) }

  fn error(&mut self, _err: Err) {}

  fn complete(&mut self) {}
}

/// Disposing the subject disposes its registry, and with it every
/// outstanding subscription.
impl<Item, Err> Subscription for ValueSubject<Item, Err> {
  fn unsubscribe(&mut self) { self.registry.unsubscribe(); }

  fn is_closed(&self) -> bool { self.registry.is_closed() }
}

/// Serializes as the wrapped value alone; subscribers and registry are
/// runtime wiring, not state.
#[cfg(feature = "serde")]
impl<Item, Err> serde::Serialize for ValueSubject<Item, Err>
where
  Item: serde::Serialize + Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    self.value().serialize(serializer)
  }
}

/// Deserializes a value into a fresh subject with no subscribers.
#[cfg(feature = "serde")]
impl<'de, Item, Err> serde::Deserialize<'de> for ValueSubject<Item, Err>
where
  Item: serde::Deserialize<'de> + Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    Item::deserialize(deserializer).map(ValueSubject::new)
  }
}

/// Sink handle holding its subject weakly; see
/// [`ValueSubject::weak_observer`].
pub struct WeakValueObserver<Item, Err = ()> {
  core: Weak<SubjectCore<Item, Item, Err>>,
}

impl<Item, Err> Clone for WeakValueObserver<Item, Err> {
  fn clone(&self) -> Self { WeakValueObserver { core: self.core.clone() } }
}

impl<Item, Err> Observer<Item, Err> for WeakValueObserver<Item, Err>
where
  Item: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  fn next(&mut self, value: Item) {
    if let Some(core) = self.core.upgrade() {
      commit_value(&core, value);
    }
  }

  fn error(&mut self, _err: Err) {}

  fn complete(&mut self) {}
}
