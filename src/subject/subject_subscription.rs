//! The per-subscriber disposal handle.

use std::fmt::{Debug, Formatter};
use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc, Weak,
};

use crate::subject::core::SlotHost;
use crate::subscription::Subscription;

/// Detaches one observer from the subject that registered it.
///
/// The closed flag is the same cell the subject's delivery path checks, so
/// unsubscribing takes effect even for emissions already queued. The subject
/// core is referenced weakly: once the subject itself is gone, unsubscribing
/// is a no-op rather than an error, and the handle never keeps a dead
/// subject alive.
#[derive(Clone)]
pub struct SubjectSubscription {
  closed: Arc<AtomicBool>,
  link: Option<(Weak<dyn SlotHost>, usize)>,
}

impl SubjectSubscription {
  pub(crate) fn new(
    closed: Arc<AtomicBool>,
    host: Weak<dyn SlotHost>,
    id: usize,
  ) -> Self {
    SubjectSubscription { closed, link: Some((host, id)) }
  }

  /// A handle that was never live, handed to subscribers joining after a
  /// terminal event.
  pub(crate) fn closed() -> Self {
    SubjectSubscription {
      closed: Arc::new(AtomicBool::new(true)),
      link: None,
    }
  }
}

impl Subscription for SubjectSubscription {
  fn unsubscribe(&mut self) {
    if !self.closed.swap(true, Ordering::AcqRel) {
      if let Some((host, id)) = &self.link {
        if let Some(host) = host.upgrade() {
          host.release(*id);
        }
      }
    }
  }

  fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }
}

impl Debug for SubjectSubscription {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SubjectSubscription")
      .field("closed", &self.is_closed())
      .finish()
  }
}
