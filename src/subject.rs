//! Subjects: entities that are both an observable stream and an observer
//! sink, with every subscription they create aggregated in an owned
//! registry for joint lifetime management.

mod core;
mod publish;
mod replay;
mod subject_subscription;
mod subscribers;
mod value;

pub use publish::PublishSubject;
pub use replay::{Completer, ReplaySubject};
pub use subject_subscription::SubjectSubscription;
pub use value::{ValueSubject, WeakValueObserver};
