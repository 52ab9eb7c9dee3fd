use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

/// Failures surfaced when a stream is collapsed to a single outcome.
///
/// `Source` carries an error the upstream stream emitted itself. `Empty` and
/// `Unknown` are produced by this crate: the first by
/// [`block_first`](crate::observable::BlockingFirst::block_first) when the
/// stream completed without a value, the second by
/// [`from_callback`](crate::subject::ReplaySubject::from_callback) when a
/// completer was discarded without reporting either a value or an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamError<Err = ()> {
  /// The upstream stream failed.
  Source(Err),
  /// The stream completed without ever producing a value.
  Empty,
  /// A completion callback finished without supplying a value or an error.
  Unknown,
}

impl<Err: Display> Display for StreamError<Err> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      StreamError::Source(err) => write!(f, "stream failed: {}", err),
      StreamError::Empty => write!(f, "stream completed without a value"),
      StreamError::Unknown => {
        write!(f, "completion callback supplied neither a value nor an error")
      }
    }
  }
}

impl<Err: Display + Debug> Error for StreamError<Err> {}
