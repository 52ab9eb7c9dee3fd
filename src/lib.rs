//! # rxstate: stateful subjects with bounded replay
//!
//! A small layer of subject types for binding mutable state to streams of
//! change notifications: a current-value subject delivering a snapshot on
//! subscribe, a bounded-history replay subject, a plain broadcast subject,
//! and the disposal registries that tie every subscription's lifetime to
//! its owner.
//!
//! ## Quick Start
//!
//! ```rust
//! use rxstate::prelude::*;
//!
//! let counter = ValueSubject::<i32>::new(0);
//!
//! // A new subscriber always receives the current value first.
//! let sub = counter.subscribe(|v| println!("counter: {}", v)); // prints 0
//! counter.set_value(1); // prints 1
//!
//! // Disposal is explicit per subscription...
//! let mut sub = sub;
//! sub.unsubscribe();
//!
//! // ...or joint, through the subject's owned registry.
//! counter.clone().unsubscribe();
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ValueSubject`] | Current value under a lock, snapshot-then-feed on subscribe |
//! | [`ReplaySubject`] | Replays the N most recent values plus the terminal event |
//! | [`PublishSubject`] | Broadcast only, nothing buffered |
//! | [`SharedSubscription`] | Registry releasing collected subscriptions together |
//!
//! [`ValueSubject`]: subject::ValueSubject
//! [`ReplaySubject`]: subject::ReplaySubject
//! [`PublishSubject`]: subject::PublishSubject
//! [`SharedSubscription`]: subscription::SharedSubscription

pub mod error;
pub mod observable;
pub mod observer;
pub mod prelude;
pub mod ring_buffer;
pub mod subject;
pub mod subscription;
