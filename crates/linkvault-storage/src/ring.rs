/// Fixed-capacity FIFO buffer with independent read and write cursors.
///
/// One slot always stays empty so that `read_pos == write_pos` means empty
/// and `write_pos + 1 == read_pos` means full. A buffer of capacity `C`
/// therefore holds at most `C - 1` items.
#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Box<[Option<T>]>,
    read_pos: usize,
    write_pos: usize,
}

impl<T> RingBuffer<T> {
    /// Creates a buffer with `capacity` slots. Capacities below 2 are raised to 2.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// Number of slots, including the reserved one.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        (self.write_pos + self.capacity() - self.read_pos) % self.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.read_pos == self.write_pos
    }

    pub fn is_full(&self) -> bool {
        (self.write_pos + 1) % self.capacity() == self.read_pos
    }

    /// Appends `item`, handing it back if the buffer is full.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        self.slots[self.write_pos] = Some(item);
        self.write_pos = (self.write_pos + 1) % self.capacity();
        Ok(())
    }

    /// Removes up to `max` items in insertion order.
    pub fn pop_batch(&mut self, max: usize) -> Vec<T> {
        let take = self.len().min(max);
        let mut batch = Vec::with_capacity(take);
        for _ in 0..take {
            if let Some(item) = self.slots[self.read_pos].take() {
                batch.push(item);
            }
            self.read_pos = (self.read_pos + 1) % self.capacity();
        }
        batch
    }
}
