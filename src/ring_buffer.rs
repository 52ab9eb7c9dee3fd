//! Fixed-capacity history storage with overwrite-oldest semantics.

/// A circular buffer keeping the most recently pushed elements.
///
/// Once `capacity` elements are stored every further push overwrites the
/// logically oldest slot. Iteration always runs oldest to newest.
///
/// ```rust
/// use rxstate::ring_buffer::RingBuffer;
///
/// let mut history = RingBuffer::new(3);
/// for v in 1..=5 {
///   history.push(v);
/// }
/// assert_eq!(history.to_vec(), vec![3, 4, 5]);
/// ```
#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
  items: Vec<T>,
  capacity: usize,
  // Index of the oldest element once the buffer is full; 0 before that.
  offset: usize,
}

impl<T> RingBuffer<T> {
  /// Creates an empty buffer. A requested capacity of zero is clamped to
  /// one.
  pub fn new(capacity: usize) -> Self {
    let capacity = capacity.max(1);
    RingBuffer { items: Vec::with_capacity(capacity), capacity, offset: 0 }
  }

  #[inline]
  pub fn capacity(&self) -> usize { self.capacity }

  #[inline]
  pub fn len(&self) -> usize { self.items.len() }

  #[inline]
  pub fn is_empty(&self) -> bool { self.items.is_empty() }

  /// Appends a value in O(1), overwriting the oldest element when full.
  pub fn push(&mut self, value: T) {
    if self.items.len() < self.capacity {
      self.items.push(value);
    } else {
      self.items[self.offset] = value;
      self.offset = (self.offset + 1) % self.capacity;
    }
  }

  /// Iterates the stored elements from oldest to newest without mutating
  /// the buffer.
  pub fn iter(&self) -> impl Iterator<Item = &T> {
    let (newest, oldest) = self.items.split_at(self.offset);
    oldest.iter().chain(newest.iter())
  }

  /// Rebuilds the buffer with a new capacity (clamped to one), keeping the
  /// most recent `min(len, new_capacity)` elements in order.
  pub fn set_capacity(&mut self, new_capacity: usize) {
    let new_capacity = new_capacity.max(1);
    self.items.rotate_left(self.offset);
    self.offset = 0;
    if self.items.len() > new_capacity {
      let excess = self.items.len() - new_capacity;
      self.items.drain(..excess);
    }
    self.capacity = new_capacity;
  }

  /// Projects every stored element into a fresh buffer with the same
  /// capacity and logical order.
  pub fn map<U, F>(&self, mut f: F) -> RingBuffer<U>
  where
    F: FnMut(&T) -> U,
  {
    let mut mapped = RingBuffer::new(self.capacity);
    for item in self.iter() {
      mapped.push(f(item));
    }
    mapped
  }
}

impl<T: Clone> RingBuffer<T> {
  /// Ordered snapshot of the contents, oldest first.
  pub fn to_vec(&self) -> Vec<T> { self.iter().cloned().collect() }
}
