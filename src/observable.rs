//! The stream source contract and the subscribe sugar on top of it.

use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc, Condvar, Mutex,
};

use crate::{
  error::StreamError,
  observer::{Observer, ObserverAll, ObserverNext},
  subject::PublishSubject,
  subscription::Subscription,
};

/// Anything that can be subscribed to: it emits zero or more values
/// followed by at most one terminal event.
pub trait Observable<Item, Err> {
  /// The handle detaching an observer registered through
  /// [`actual_subscribe`](Observable::actual_subscribe).
  type Unsub: Subscription;

  /// Registers `observer` for delivery.
  fn actual_subscribe<O>(&self, observer: O) -> Self::Unsub
  where
    O: Observer<Item, Err> + Send + 'static;
}

/// Closure-flavored subscribe helpers, available on every [`Observable`].
pub trait Subscribe<Item, Err>: Observable<Item, Err> {
  /// Subscribes with a value handler; terminal events are ignored.
  fn subscribe<N>(&self, next: N) -> Self::Unsub
  where
    N: FnMut(Item) + Send + 'static,
  {
    self.actual_subscribe(ObserverNext(next))
  }

  /// Subscribes with one handler per event kind.
  fn subscribe_all<N, E, C>(
    &self,
    next: N,
    error: E,
    complete: C,
  ) -> Self::Unsub
  where
    N: FnMut(Item) + Send + 'static,
    E: FnMut(Err) + Send + 'static,
    C: FnMut() + Send + 'static,
  {
    self.actual_subscribe(ObserverAll::new(next, error, complete))
  }

  /// Routes every event of this stream into `sink`.
  fn bind_to<O>(&self, sink: O) -> Self::Unsub
  where
    O: Observer<Item, Err> + Send + 'static,
  {
    self.actual_subscribe(sink)
  }

  /// Multicasts this stream and `other` through one fresh subject. The
  /// result fails on the first error of either input and completes once
  /// both inputs completed; the subject's registry owns both upstream
  /// links.
  fn merge<O>(&self, other: &O) -> PublishSubject<Item, Err>
  where
    O: Observable<Item, Err>,
    Item: Clone + Send + 'static,
    Err: Clone + Send + 'static,
    Self::Unsub: Send + Sync + 'static,
    O::Unsub: Send + Sync + 'static,
  {
    let out = PublishSubject::new();
    let remaining = Arc::new(AtomicUsize::new(2));

    let left = merge_arm(&out, &remaining);
    out.track(self.actual_subscribe(left));
    let right = merge_arm(&out, &remaining);
    out.track(other.actual_subscribe(right));
    out
  }
}

impl<Item, Err, T> Subscribe<Item, Err> for T where T: Observable<Item, Err> {}

fn merge_arm<Item, Err>(
  out: &PublishSubject<Item, Err>,
  remaining: &Arc<AtomicUsize>,
) -> impl Observer<Item, Err> + Send + 'static
where
  Item: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  let mut next_out = out.as_observer();
  let mut error_out = out.as_observer();
  let mut complete_out = out.as_observer();
  let remaining = remaining.clone();
  ObserverAll::new(
    move |value| next_out.next(value),
    move |err| error_out.error(err),
    move || {
      if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
        complete_out.complete();
      }
    },
  )
}

/// Collapses a stream to its first value, blocking the calling thread.
pub trait BlockingFirst<Item, Err>: Observable<Item, Err> {
  /// Waits for the first value. A completion without any value yields
  /// [`StreamError::Empty`]; a stream error is passed through as
  /// [`StreamError::Source`]. A source that already stopped and hands back
  /// a closed subscription with no events (a terminated broadcast subject,
  /// a disposed one) also yields [`StreamError::Empty`].
  ///
  /// Blocks forever if the source never settles; prefer it for sources
  /// known to deliver synchronously, like a populated subject.
  fn block_first(&self) -> Result<Item, StreamError<Err>>
  where
    Item: Send + 'static,
    Err: Send + 'static,
  {
    let cell = Arc::new(FirstCell::default());
    let mut subscription =
      self.actual_subscribe(FirstObserver { cell: cell.clone() });

    let mut outcome = cell.slot.lock().unwrap();
    let settled = loop {
      match outcome.take() {
        Some(settled) => break settled,
        // A closed handle with nothing delivered means the source stopped
        // without a value and will never wake us.
        None if subscription.is_closed() => break Err(StreamError::Empty),
        None => outcome = cell.ready.wait(outcome).unwrap(),
      }
    };
    drop(outcome);
    subscription.unsubscribe();
    settled
  }
}

impl<Item, Err, T> BlockingFirst<Item, Err> for T where T: Observable<Item, Err>
{}

struct FirstCell<Item, Err> {
  slot: Mutex<Option<Result<Item, StreamError<Err>>>>,
  ready: Condvar,
}

impl<Item, Err> Default for FirstCell<Item, Err> {
  fn default() -> Self {
    FirstCell { slot: Mutex::new(None), ready: Condvar::new() }
  }
}

struct FirstObserver<Item, Err> {
  cell: Arc<FirstCell<Item, Err>>,
}

impl<Item, Err> FirstObserver<Item, Err> {
  fn settle(&self, outcome: Result<Item, StreamError<Err>>) {
    let mut slot = self.cell.slot.lock().unwrap();
    if slot.is_none() {
      *slot = Some(outcome);
      self.cell.ready.notify_all();
    }
  }
}

impl<Item, Err> Observer<Item, Err> for FirstObserver<Item, Err> {
  fn next(&mut self, value: Item) { self.settle(Ok(value)) }

  fn error(&mut self, err: Err) { self.settle(Err(StreamError::Source(err))) }

  fn complete(&mut self) { self.settle(Err(StreamError::Empty)) }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::subject::{ReplaySubject, ValueSubject};

  #[test]
  fn block_first_returns_current_value() {
    let subject: ValueSubject<i32> = ValueSubject::new(41);
    assert_eq!(subject.block_first(), Ok(41));
  }

  #[test]
  fn block_first_reports_empty_completion() {
    let subject: ReplaySubject<i32, ()> = ReplaySubject::with_capacity(1);
    let mut sink = subject.as_observer();
    sink.complete();
    assert_eq!(subject.block_first(), Err(StreamError::Empty));
  }

  #[test]
  fn block_first_passes_stream_errors_through() {
    let subject: ReplaySubject<i32, String> = ReplaySubject::with_capacity(1);
    let mut sink = subject.as_observer();
    sink.error("offline".to_owned());
    assert_eq!(
      subject.block_first(),
      Err(StreamError::Source("offline".to_owned()))
    );
  }

  #[test]
  fn block_first_on_a_stopped_publish_subject_reports_empty() {
    let subject: PublishSubject<i32> = PublishSubject::new();
    subject.as_observer().complete();
    assert_eq!(subject.block_first(), Err(StreamError::Empty));

    // A broadcast subject does not replay its terminal, so even a stored
    // error surfaces as an empty outcome; only the replay flavor keeps it.
    let errored: PublishSubject<i32, &'static str> = PublishSubject::new();
    errored.as_observer().error("gone");
    assert_eq!(errored.block_first(), Err(StreamError::Empty));
  }

  #[test]
  fn block_first_wakes_up_for_cross_thread_values() {
    let subject: PublishSubject<i32> = PublishSubject::new();
    let mut sink = subject.as_observer();
    let feeder = std::thread::spawn(move || {
      std::thread::sleep(std::time::Duration::from_millis(10));
      sink.next(3);
    });
    assert_eq!(subject.block_first(), Ok(3));
    feeder.join().unwrap();
  }

  #[test]
  fn bind_to_feeds_a_value_subject() {
    let source: PublishSubject<i32> = PublishSubject::new();
    let target = ValueSubject::new(0);
    let _link = source.bind_to(target.as_observer());

    let mut sink = source.as_observer();
    sink.next(9);
    assert_eq!(target.value(), 9);
  }

  #[test]
  fn merge_forwards_both_and_completes_when_both_did() {
    let left: PublishSubject<i32> = PublishSubject::new();
    let right: PublishSubject<i32> = PublishSubject::new();
    let merged = left.merge(&right);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in = seen.clone();
    let completed = Arc::new(Mutex::new(false));
    let completed_in = completed.clone();
    let _sub = merged.subscribe_all(
      move |v| seen_in.lock().unwrap().push(v),
      |_: ()| {},
      move || *completed_in.lock().unwrap() = true,
    );

    let mut left_in = left.as_observer();
    let mut right_in = right.as_observer();
    left_in.next(1);
    right_in.next(2);
    left_in.complete();
    assert!(!*completed.lock().unwrap());
    right_in.next(3);
    right_in.complete();

    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    assert!(*completed.lock().unwrap());
  }

  #[test]
  fn merge_fails_on_first_error() {
    let left: PublishSubject<i32, String> = PublishSubject::new();
    let right: PublishSubject<i32, String> = PublishSubject::new();
    let merged = left.merge(&right);

    let failures = Arc::new(Mutex::new(Vec::new()));
    let failures_in = failures.clone();
    let _sub = merged.subscribe_all(
      |_| {},
      move |e: String| failures_in.lock().unwrap().push(e),
      || {},
    );

    let mut left_in = left.as_observer();
    left_in.error("left died".to_owned());
    let mut right_in = right.as_observer();
    right_in.next(5);

    assert_eq!(*failures.lock().unwrap(), vec!["left died".to_owned()]);
  }
}
