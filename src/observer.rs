//! The observer sink contract and closure adapters around it.

/// A notification pushed through a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event<Item, Err> {
  Next(Item),
  Error(Err),
  Complete,
}

/// Receives stream notifications.
///
/// A well-behaved source emits any number of `next` calls followed by at
/// most one `error` or `complete` and nothing afterwards; the subjects in
/// this crate enforce that ordering on delivery.
pub trait Observer<Item, Err> {
  fn next(&mut self, value: Item);
  fn error(&mut self, err: Err);
  fn complete(&mut self);

  /// Dispatches a tagged event to the matching handler.
  fn on(&mut self, event: Event<Item, Err>) {
    match event {
      Event::Next(value) => self.next(value),
      Event::Error(err) => self.error(err),
      Event::Complete => self.complete(),
    }
  }
}

/// Observer built from one closure per event kind.
pub struct ObserverAll<N, E, C> {
  next: N,
  error: E,
  complete: C,
}

impl<N, E, C> ObserverAll<N, E, C> {
  #[inline]
  pub fn new(next: N, error: E, complete: C) -> Self {
    ObserverAll { next, error, complete }
  }
}

impl<Item, Err, N, E, C> Observer<Item, Err> for ObserverAll<N, E, C>
where
  N: FnMut(Item),
  E: FnMut(Err),
  C: FnMut(),
{
  #[inline]
  fn next(&mut self, value: Item) { (self.next)(value) }
  #[inline]
  fn error(&mut self, err: Err) { (self.error)(err) }
  #[inline]
  fn complete(&mut self) { (self.complete)() }
}

/// Observer that only handles values; terminal events are ignored.
pub struct ObserverNext<N>(pub N);

impl<Item, Err, N> Observer<Item, Err> for ObserverNext<N>
where
  N: FnMut(Item),
{
  #[inline]
  fn next(&mut self, value: Item) { (self.0)(value) }
  fn error(&mut self, _err: Err) {}
  fn complete(&mut self) {}
}

#[cfg(test)]
mod test {
  use super::*;
  use std::cell::RefCell;
  use std::rc::Rc;

  #[test]
  fn on_dispatches_by_tag() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let next_seen = seen.clone();
    let error_seen = seen.clone();
    let complete_seen = seen.clone();
    let mut observer = ObserverAll::new(
      move |v: i32| next_seen.borrow_mut().push(format!("next {}", v)),
      move |e: &str| error_seen.borrow_mut().push(format!("error {}", e)),
      move || complete_seen.borrow_mut().push("complete".to_owned()),
    );
    observer.on(Event::Next(1));
    observer.on(Event::Complete);
    observer.on(Event::Error("boom"));
    assert_eq!(*seen.borrow(), ["next 1", "complete", "error boom"]);
  }

  #[test]
  fn next_only_ignores_terminals() {
    let mut values = Vec::new();
    {
      let mut observer = ObserverNext(|v: i32| values.push(v));
      Observer::<i32, ()>::next(&mut observer, 7);
      Observer::<i32, ()>::error(&mut observer, ());
      Observer::<i32, ()>::complete(&mut observer);
      Observer::<i32, ()>::next(&mut observer, 8);
    }
    assert_eq!(values, [7, 8]);
  }
}
