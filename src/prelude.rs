//! Re-exports of the commonly used surface.

pub use crate::error::StreamError;
pub use crate::observable::{BlockingFirst, Observable, Subscribe};
pub use crate::observer::{Event, Observer, ObserverAll, ObserverNext};
pub use crate::ring_buffer::RingBuffer;
pub use crate::subject::{
  Completer, PublishSubject, ReplaySubject, SubjectSubscription, ValueSubject,
  WeakValueObserver,
};
pub use crate::subscription::{
  SharedSubscription, Subscription, SubscriptionGuard,
};
