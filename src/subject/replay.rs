//! A subject replaying a bounded history to every new subscriber.

use smallvec::smallvec;
use std::sync::{Arc, Weak};

use crate::error::StreamError;
use crate::observable::Observable;
use crate::observer::{Event, Observer};
use crate::ring_buffer::RingBuffer;
use crate::subject::core::{
  weak_host, CoreDisposer, CoreState, SubjectCore, Terminal,
};
use crate::subject::subject_subscription::SubjectSubscription;
use crate::subject::subscribers::Slot;
use crate::subscription::{SharedSubscription, Subscription};

/// Records the most recent values of a stream and replays them.
///
/// A new subscriber first receives the buffered history in emission order,
/// then the stored terminal event if the subject already stopped, otherwise
/// a live registration. Replay and registration share one critical section,
/// so a value arriving concurrently with a subscribe is either part of the
/// history or delivered live, never both and never dropped. A source error
/// is captured once and replayed to every late subscriber, never rethrown.
pub struct ReplaySubject<Item, Err = ()> {
  core: Arc<SubjectCore<RingBuffer<Item>, Item, Err>>,
  registry: SharedSubscription,
}

impl<Item, Err> Clone for ReplaySubject<Item, Err> {
  fn clone(&self) -> Self {
    ReplaySubject { core: self.core.clone(), registry: self.registry.clone() }
  }
}

impl<Item, Err> ReplaySubject<Item, Err>
where
  Item: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  /// A standalone subject keeping the `capacity` most recent values,
  /// clamped to at least one. Feed it through its [`Observer`] impl.
  pub fn with_capacity(capacity: usize) -> Self {
    let core = Arc::new(SubjectCore::new(RingBuffer::new(capacity)));
    let registry = SharedSubscription::new();
    registry.add(CoreDisposer::new(weak_host(&core)));
    ReplaySubject { core, registry }
  }

  /// Wraps `source`: every value it emits lands in the history and is
  /// forwarded live, its terminal event freezes the history. The upstream
  /// link lives in the subject's owned registry and the forwarder holds the
  /// subject weakly, so dropping every handle tears the link down.
  pub fn new<S>(source: &S, capacity: usize) -> Self
  where
    S: Observable<Item, Err>,
    S::Unsub: Send + Sync + 'static,
  {
    let subject = Self::with_capacity(capacity);
    let upstream = source.actual_subscribe(UpstreamForwarder {
      core: Arc::downgrade(&subject.core),
    });
    subject.registry.add(upstream);
    subject
  }

  /// Ordered snapshot of the buffered history, oldest first.
  pub fn values(&self) -> Vec<Item> {
    self.core.read(|state| state.extra.to_vec())
  }

  /// Adjusts the history bound, keeping the most recent values.
  pub fn set_capacity(&self, capacity: usize) {
    self.core.commit(|state| state.extra.set_capacity(capacity));
  }

  /// A sink handle feeding this subject.
  pub fn as_observer(&self) -> Self { self.clone() }

  /// Adds `subscription` to the subject's owned registry, sharing its
  /// lifetime.
  pub fn track<S: Subscription + Send + Sync + 'static>(
    &self,
    subscription: S,
  ) {
    self.registry.add(subscription);
  }

  /// Derives a projected subject without another upstream subscription:
  /// the history is mapped through `f`, the terminal state is copied, and
  /// future values of this subject are forwarded through `f` live. Seeding
  /// and attachment share this subject's critical section, so no value
  /// falls between them.
  pub fn map<U, F>(&self, f: F) -> ReplaySubject<U, Err>
  where
    U: Clone + Send + 'static,
    F: Fn(&Item) -> U + Send + 'static,
  {
    let (child, link) = self.core.commit(|state| {
      let child_core = Arc::new(SubjectCore::with_terminal(
        state.extra.map(&f),
        state.terminal.clone(),
      ));
      let registry = SharedSubscription::new();
      registry.add(CoreDisposer::new(weak_host(&child_core)));
      let child = ReplaySubject { core: child_core, registry };

      if state.is_stopped() {
        (child, None)
      } else {
        let forwarder =
          MapForwarder { core: Arc::downgrade(&child.core), f };
        let (id, slot) = state.subscribers.add(Box::new(forwarder));
        let link = SubjectSubscription::new(
          slot.closed_flag(),
          weak_host(&self.core),
          id,
        );
        (child, Some(link))
      }
    });
    if let Some(link) = link {
      // Dropping the child releases the parent slot; the parent registry
      // covers the other direction.
      child.registry.add(link.clone());
      self.registry.add(link);
    }
    child
  }
}

impl<Item, Err> ReplaySubject<Item, Err>
where
  Item: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  /// Bridges a single-shot callback API into a subject of capacity one.
  ///
  /// The callback receives a [`Completer`]; whichever of `resolve` or
  /// `reject` it calls becomes the subject's outcome, replayed to every
  /// subscriber. A completer dropped without reporting either yields
  /// [`StreamError::Unknown`]; silence is never treated as success.
  pub fn from_callback<F>(f: F) -> ReplaySubject<Item, StreamError<Err>>
  where
    F: FnOnce(Completer<Item, Err>),
  {
    let subject = ReplaySubject::with_capacity(1);
    f(Completer { subject: subject.clone(), done: false });
    subject
  }
}

fn record<Item, Err>(
  core: &SubjectCore<RingBuffer<Item>, Item, Err>,
  value: Item,
) where
  Item: Clone,
  Err: Clone,
{
  core.commit(|state| {
    if state.is_stopped() {
      return;
    }
    state.extra.push(value.clone());
    state.emit_all(Event::Next(value));
  });
}

fn settle<Item, Err>(
  core: &SubjectCore<RingBuffer<Item>, Item, Err>,
  terminal: Terminal<Err>,
) where
  Item: Clone,
  Err: Clone,
{
  core.commit(|state| state.stop(terminal));
}

/// Replays history plus the terminal event to an observer that arrived
/// after the subject stopped; no slot is registered.
fn replay_stopped<Item, Err>(
  state: &mut CoreState<RingBuffer<Item>, Item, Err>,
  observer: Box<dyn Observer<Item, Err> + Send>,
  terminal: Event<Item, Err>,
) -> SubjectSubscription
where
  Item: Clone,
  Err: Clone,
{
  let slot = Slot::new(observer);
  for value in state.extra.to_vec() {
    state.emit_to(Event::Next(value), smallvec![slot.clone()]);
  }
  state.emit_to(terminal, smallvec![slot]);
  SubjectSubscription::closed()
}

impl<Item, Err> Observable<Item, Err> for ReplaySubject<Item, Err>
where
  Item: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  type Unsub = SubjectSubscription;

  fn actual_subscribe<O>(&self, observer: O) -> Self::Unsub
  where
    O: Observer<Item, Err> + Send + 'static,
  {
    let subscription = self.core.commit(|state| match state.terminal.clone() {
      Some(Terminal::Disposed) => SubjectSubscription::closed(),
      Some(Terminal::Complete) => {
        replay_stopped(state, Box::new(observer), Event::Complete)
      }
      Some(Terminal::Error(err)) => {
        replay_stopped(state, Box::new(observer), Event::Error(err))
      }
      None => {
        let history = state.extra.to_vec();
        let (id, slot) = state.subscribers.add(Box::new(observer));
        for value in history {
          state.emit_to(Event::Next(value), smallvec![slot.clone()]);
        }
        SubjectSubscription::new(slot.closed_flag(), weak_host(&self.core), id)
      }
    });
    if !subscription.is_closed() {
      self.registry.add(subscription.clone());
    }
    subscription
  }
}

impl<Item, Err> Observer<Item, Err> for ReplaySubject<Item, Err>
where
  Item: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  fn next(&mut self, value: Item) { record(&self.core, value) }

  fn error(&mut self, err: Err) { settle(&self.core, Terminal::Error(err)) }

  fn complete(&mut self) { settle(&self.core, Terminal::Complete) }
}

/// Disposing the subject disposes its registry: the upstream link, every
/// subscriber handle, everything.
impl<Item, Err> Subscription for ReplaySubject<Item, Err> {
  fn unsubscribe(&mut self) { self.registry.unsubscribe(); }

  fn is_closed(&self) -> bool { self.registry.is_closed() }
}

struct UpstreamForwarder<Item, Err> {
  core: Weak<SubjectCore<RingBuffer<Item>, Item, Err>>,
}

impl<Item, Err> Observer<Item, Err> for UpstreamForwarder<Item, Err>
where
  Item: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  fn next(&mut self, value: Item) {
    if let Some(core) = self.core.upgrade() {
      record(&core, value);
    }
  }

  fn error(&mut self, err: Err) {
    if let Some(core) = self.core.upgrade() {
      settle(&core, Terminal::Error(err));
    }
  }

  fn complete(&mut self) {
    if let Some(core) = self.core.upgrade() {
      settle(&core, Terminal::Complete);
    }
  }
}

struct MapForwarder<U, Err, F> {
  core: Weak<SubjectCore<RingBuffer<U>, U, Err>>,
  f: F,
}

impl<Item, U, Err, F> Observer<Item, Err> for MapForwarder<U, Err, F>
where
  U: Clone + Send + 'static,
  Err: Clone + Send + 'static,
  F: Fn(&Item) -> U + Send + 'static,
{
  fn next(&mut self, value: Item) {
    if let Some(core) = self.core.upgrade() {
      record(&core, (self.f)(&value));
    }
  }

  fn error(&mut self, err: Err) {
    if let Some(core) = self.core.upgrade() {
      settle(&core, Terminal::Error(err));
    }
  }

  fn complete(&mut self) {
    if let Some(core) = self.core.upgrade() {
      settle(&core, Terminal::Complete);
    }
  }
}

/// One-shot outcome reporter handed to the callback of
/// [`ReplaySubject::from_callback`].
pub struct Completer<Item, Err = ()>
where
  Item: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  subject: ReplaySubject<Item, StreamError<Err>>,
  done: bool,
}

impl<Item, Err> Completer<Item, Err>
where
  Item: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  /// Reports success: the subject emits `value` and completes.
  pub fn resolve(mut self, value: Item) {
    self.done = true;
    let mut sink = self.subject.as_observer();
    sink.next(value);
    sink.complete();
  }

  /// Reports failure: the subject errors with [`StreamError::Source`].
  pub fn reject(mut self, err: Err) {
    self.done = true;
    self.subject.as_observer().error(StreamError::Source(err));
  }
}

impl<Item, Err> Drop for Completer<Item, Err>
where
  Item: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  fn drop(&mut self) {
    if !self.done {
      self.subject.as_observer().error(StreamError::Unknown);
    }
  }
}
