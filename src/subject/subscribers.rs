//! Id-keyed observer slots shared between a subject and its handles.

use smallvec::SmallVec;
use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc, Mutex,
};

use crate::observer::{Event, Observer};

type SharedObserver<Item, Err> =
  Arc<Mutex<Box<dyn Observer<Item, Err> + Send>>>;

/// One registered observer: the cell events are delivered through, plus the
/// closed flag shared with the subscription handle that can detach it.
pub(crate) struct Slot<Item, Err> {
  observer: SharedObserver<Item, Err>,
  closed: Arc<AtomicBool>,
}

impl<Item, Err> Clone for Slot<Item, Err> {
  fn clone(&self) -> Self {
    Slot { observer: self.observer.clone(), closed: self.closed.clone() }
  }
}

impl<Item, Err> Slot<Item, Err> {
  pub(crate) fn new(observer: Box<dyn Observer<Item, Err> + Send>) -> Self {
    Slot {
      observer: Arc::new(Mutex::new(observer)),
      closed: Arc::new(AtomicBool::new(false)),
    }
  }

  pub(crate) fn closed_flag(&self) -> Arc<AtomicBool> { self.closed.clone() }

  pub(crate) fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Acquire)
  }

  pub(crate) fn close(&self) { self.closed.store(true, Ordering::Release) }

  /// Hands `event` to the observer unless the slot was closed meanwhile. A
  /// terminal event closes the slot after delivery.
  pub(crate) fn deliver(&self, event: Event<Item, Err>) {
    if self.is_closed() {
      return;
    }
    let stops = !matches!(event, Event::Next(_));
    self.observer.lock().unwrap().on(event);
    if stops {
      self.close();
    }
  }
}

/// The subject-side slot table. Ids grow monotonically, so a handle can
/// never release a slot that was reassigned to someone else.
pub(crate) struct Subscribers<Item, Err> {
  next_id: usize,
  slots: SmallVec<[(usize, Slot<Item, Err>); 2]>,
}

impl<Item, Err> Default for Subscribers<Item, Err> {
  fn default() -> Self { Subscribers { next_id: 0, slots: SmallVec::new() } }
}

impl<Item, Err> Subscribers<Item, Err> {
  pub(crate) fn add(
    &mut self,
    observer: Box<dyn Observer<Item, Err> + Send>,
  ) -> (usize, Slot<Item, Err>) {
    let id = self.next_id;
    self.next_id += 1;
    let slot = Slot::new(observer);
    self.slots.push((id, slot.clone()));
    (id, slot)
  }

  /// Closes and drops the slot `id`; emissions already queued for it find
  /// the raised flag and skip it.
  pub(crate) fn remove(&mut self, id: usize) {
    if let Some(index) =
      self.slots.iter().position(|(slot_id, _)| *slot_id == id)
    {
      let (_, slot) = self.slots.remove(index);
      slot.close();
    }
  }

  /// Clones of every slot still open, pruning the ones that are not.
  pub(crate) fn live(&mut self) -> SmallVec<[Slot<Item, Err>; 2]> {
    self.slots.retain(|(_, slot)| !slot.is_closed());
    self.slots.iter().map(|(_, slot)| slot.clone()).collect()
  }

  /// Empties the table, handing back the slots it held.
  pub(crate) fn drain(&mut self) -> SmallVec<[Slot<Item, Err>; 2]> {
    std::mem::take(&mut self.slots)
      .into_iter()
      .map(|(_, slot)| slot)
      .collect()
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::observer::ObserverNext;

  fn collector(
    into: &Arc<Mutex<Vec<i32>>>,
  ) -> Box<dyn Observer<i32, ()> + Send> {
    let into = into.clone();
    Box::new(ObserverNext(move |v| into.lock().unwrap().push(v)))
  }

  #[test]
  fn ids_are_never_reused() {
    let mut subscribers = Subscribers::<i32, ()>::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (first, _) = subscribers.add(collector(&seen));
    subscribers.remove(first);
    let (second, _) = subscribers.add(collector(&seen));
    assert_ne!(first, second);
  }

  #[test]
  fn closed_slot_is_skipped_and_pruned() {
    let mut subscribers = Subscribers::<i32, ()>::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (_, slot) = subscribers.add(collector(&seen));

    slot.deliver(Event::Next(1));
    slot.close();
    slot.deliver(Event::Next(2));
    assert_eq!(*seen.lock().unwrap(), [1]);
    assert!(subscribers.live().is_empty());
  }

  #[test]
  fn terminal_delivery_closes_the_slot() {
    let mut subscribers = Subscribers::<i32, ()>::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (_, slot) = subscribers.add(collector(&seen));

    slot.deliver(Event::Complete);
    assert!(slot.is_closed());
    slot.deliver(Event::Next(3));
    assert!(seen.lock().unwrap().is_empty());
  }
}
