//! The multicast core shared by every subject kind.
//!
//! One mutex guards the whole per-subject state: the kind-specific payload
//! (current value, history buffer), the slot table, the terminal state and a
//! queue of pending emissions. Commits run under the lock and only enqueue;
//! delivery to observers happens strictly outside the lock, in commit order,
//! by a single draining frame per subject. Observer code therefore never
//! runs while the subject lock is held, which is what lets a handler read
//! and write the subject it is being notified by.

use smallvec::SmallVec;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

use crate::observer::Event;
use crate::subject::subscribers::{Slot, Subscribers};
use crate::subscription::Subscription;

/// Why a subject stopped accepting events.
#[derive(Clone)]
pub(crate) enum Terminal<Err> {
  Complete,
  Error(Err),
  Disposed,
}

/// One queued broadcast: an event and the slots that were live when it was
/// committed. Slots closed between commit and delivery are skipped.
struct Emission<Item, Err> {
  event: Event<Item, Err>,
  targets: SmallVec<[Slot<Item, Err>; 2]>,
}

impl<Item: Clone, Err: Clone> Emission<Item, Err> {
  fn deliver(self) {
    let Emission { event, mut targets } = self;
    targets.retain(|slot| !slot.is_closed());
    // Clone the event for every target but the last.
    let last = targets.pop();
    for slot in &targets {
      slot.deliver(event.clone());
    }
    if let Some(slot) = last {
      slot.deliver(event);
    }
  }
}

pub(crate) struct CoreState<X, Item, Err> {
  pub(crate) extra: X,
  pub(crate) subscribers: Subscribers<Item, Err>,
  pub(crate) terminal: Option<Terminal<Err>>,
  queue: VecDeque<Emission<Item, Err>>,
  draining: bool,
}

impl<X, Item, Err> CoreState<X, Item, Err> {
  pub(crate) fn is_stopped(&self) -> bool { self.terminal.is_some() }

  /// Queues `event` for the given slots only.
  pub(crate) fn emit_to(
    &mut self,
    event: Event<Item, Err>,
    targets: SmallVec<[Slot<Item, Err>; 2]>,
  ) {
    if !targets.is_empty() {
      self.queue.push_back(Emission { event, targets });
    }
  }

  /// Queues `event` for every observer registered right now.
  pub(crate) fn emit_all(&mut self, event: Event<Item, Err>) {
    let targets = self.subscribers.live();
    self.emit_to(event, targets);
  }

  /// Commits a `Complete` or `Error` transition. The first terminal wins;
  /// everything after it is dropped. Live slots get the terminal event and
  /// the table is emptied, so no later emission can reach them.
  pub(crate) fn stop(&mut self, terminal: Terminal<Err>)
  where
    Err: Clone,
  {
    if self.is_stopped() {
      return;
    }
    let event = match &terminal {
      Terminal::Complete => Event::Complete,
      Terminal::Error(err) => Event::Error(err.clone()),
      Terminal::Disposed => return,
    };
    self.terminal = Some(terminal);
    let targets = self.subscribers.drain();
    self.emit_to(event, targets);
  }
}

pub(crate) struct SubjectCore<X, Item, Err> {
  state: Mutex<CoreState<X, Item, Err>>,
}

impl<X, Item, Err> SubjectCore<X, Item, Err> {
  pub(crate) fn new(extra: X) -> Self { Self::with_terminal(extra, None) }

  pub(crate) fn with_terminal(
    extra: X,
    terminal: Option<Terminal<Err>>,
  ) -> Self {
    SubjectCore {
      state: Mutex::new(CoreState {
        extra,
        subscribers: Subscribers::default(),
        terminal,
        queue: VecDeque::new(),
        draining: false,
      }),
    }
  }

  /// Locked read access, no emission.
  pub(crate) fn read<R>(&self, f: impl FnOnce(&CoreState<X, Item, Err>) -> R) -> R {
    f(&self.state.lock().unwrap())
  }
}

impl<X, Item: Clone, Err: Clone> SubjectCore<X, Item, Err> {
  /// Runs `f` under the subject lock, then delivers whatever it queued.
  ///
  /// Only the first frame to find the queue idle drains it. A commit made
  /// while a drain is in progress (a reentrant write from inside an
  /// observer, or a racing thread) queues behind the pending emissions and
  /// is delivered by the draining frame. Reentrancy depth stays at one
  /// frame and the lock is never held during an observer call.
  pub(crate) fn commit<R>(
    &self,
    f: impl FnOnce(&mut CoreState<X, Item, Err>) -> R,
  ) -> R {
    let result = {
      let mut state = self.state.lock().unwrap();
      let result = f(&mut state);
      if state.draining || state.queue.is_empty() {
        return result;
      }
      state.draining = true;
      result
    };
    loop {
      let emission = {
        let mut state = self.state.lock().unwrap();
        match state.queue.pop_front() {
          Some(emission) => emission,
          None => {
            state.draining = false;
            break;
          }
        }
      };
      emission.deliver();
    }
    result
  }
}

/// Type-erased view of a core, held weakly by the handles that outlive it.
/// Once the last strong subject handle is gone every operation through this
/// trait turns into a no-op.
pub(crate) trait SlotHost: Send + Sync {
  /// Drops the observer slot `id`.
  fn release(&self, id: usize);
  /// Marks the core disposed, discards undelivered emissions and closes
  /// every live slot. Valid from any state, terminal ones included.
  fn dispose(&self);
  fn is_disposed(&self) -> bool;
}

impl<X, Item, Err> SlotHost for SubjectCore<X, Item, Err>
where
  X: Send + 'static,
  Item: Send + 'static,
  Err: Send + 'static,
{
  fn release(&self, id: usize) {
    self.state.lock().unwrap().subscribers.remove(id);
  }

  fn dispose(&self) {
    let mut state = self.state.lock().unwrap();
    state.queue.clear();
    state.terminal = Some(Terminal::Disposed);
    for slot in state.subscribers.drain() {
      slot.close();
    }
  }

  fn is_disposed(&self) -> bool {
    matches!(self.state.lock().unwrap().terminal, Some(Terminal::Disposed))
  }
}

pub(crate) fn weak_host<X, Item, Err>(
  core: &Arc<SubjectCore<X, Item, Err>>,
) -> Weak<dyn SlotHost>
where
  X: Send + 'static,
  Item: Send + 'static,
  Err: Send + 'static,
{
  // Bind the concrete weak first; the unsizing coercion happens on return.
  let host = Arc::downgrade(core);
  host
}

/// Registry entry that turns registry teardown into core disposal. Holds
/// the core weakly so a registry entry never keeps a dropped subject alive.
pub(crate) struct CoreDisposer(Weak<dyn SlotHost>);

impl CoreDisposer {
  pub(crate) fn new(host: Weak<dyn SlotHost>) -> Self { CoreDisposer(host) }
}

impl Subscription for CoreDisposer {
  fn unsubscribe(&mut self) {
    if let Some(host) = self.0.upgrade() {
      host.dispose();
    }
  }

  fn is_closed(&self) -> bool {
    self.0.upgrade().map_or(true, |host| host.is_disposed())
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::observer::{Observer, ObserverNext};

  fn boxed<F: FnMut(i32) + Send + 'static>(
    f: F,
  ) -> Box<dyn Observer<i32, ()> + Send> {
    Box::new(ObserverNext(f))
  }

  #[test]
  fn delivery_happens_in_commit_order() {
    let core = Arc::new(SubjectCore::<(), i32, ()>::new(()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    core.commit(|state| {
      state.subscribers.add(boxed(move |v| sink.lock().unwrap().push(v)));
    });
    core.commit(|state| {
      state.emit_all(Event::Next(1));
      state.emit_all(Event::Next(2));
    });
    assert_eq!(*seen.lock().unwrap(), [1, 2]);
  }

  #[test]
  fn reentrant_commit_queues_behind_the_draining_frame() {
    let core = Arc::new(SubjectCore::<(), i32, ()>::new(()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let reentrant = core.clone();
    core.commit(|state| {
      state.subscribers.add(boxed(move |v| {
        sink.lock().unwrap().push(v);
        if v == 1 {
          // Writes back while being notified; must not deadlock and must
          // be delivered after the event in flight.
          reentrant.commit(|state| state.emit_all(Event::Next(10)));
        }
      }));
    });
    core.commit(|state| {
      state.emit_all(Event::Next(1));
      state.emit_all(Event::Next(2));
    });
    assert_eq!(*seen.lock().unwrap(), [1, 2, 10]);
  }

  #[test]
  fn first_terminal_wins() {
    let core = Arc::new(SubjectCore::<(), i32, ()>::new(()));
    let completions = Arc::new(Mutex::new(0));
    let sink = completions.clone();
    core.commit(|state| {
      state.subscribers.add(Box::new(crate::observer::ObserverAll::new(
        |_: i32| {},
        |_: ()| panic!("error after complete"),
        move || *sink.lock().unwrap() += 1,
      )));
    });
    core.commit(|state| state.stop(Terminal::Complete));
    core.commit(|state| state.stop(Terminal::Error(())));
    core.commit(|state| {
      assert!(state.is_stopped());
      state.emit_all(Event::Next(1));
    });
    assert_eq!(*completions.lock().unwrap(), 1);
  }

  #[test]
  fn dispose_discards_pending_emissions() {
    let core = Arc::new(SubjectCore::<(), i32, ()>::new(()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let host = core.clone();
    core.commit(|state| {
      state.subscribers.add(boxed(move |v| {
        sink.lock().unwrap().push(v);
        host.dispose();
      }));
    });
    core.commit(|state| {
      state.emit_all(Event::Next(1));
      state.emit_all(Event::Next(2));
    });
    // The handler disposed the core after the first event; the second was
    // still queued and must be dropped.
    assert_eq!(*seen.lock().unwrap(), [1]);
  }

  #[test]
  fn erased_host_releases_slots() {
    let core = Arc::new(SubjectCore::<(), i32, ()>::new(()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let (id, slot) = core.commit(|state| {
      state.subscribers.add(boxed(move |v| sink.lock().unwrap().push(v)))
    });

    let host = weak_host(&core);
    host.upgrade().unwrap().release(id);
    assert!(slot.is_closed());
    core.commit(|state| state.emit_all(Event::Next(1)));
    assert!(seen.lock().unwrap().is_empty());
  }

  #[test]
  fn disposer_is_a_noop_for_a_dead_core() {
    let core = Arc::new(SubjectCore::<(), i32, ()>::new(()));
    let mut disposer = CoreDisposer::new(weak_host(&core));
    assert!(!disposer.is_closed());
    drop(core);
    assert!(disposer.is_closed());
    disposer.unsubscribe();
  }
}
