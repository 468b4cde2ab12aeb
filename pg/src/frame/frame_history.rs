/// Ring buffer holding the `capacity` most recent frames. The oldest frame gets evicted first.
#[derive(Clone, Debug)]
pub struct FrameHistory<T> {
    capacity: usize,
    buffer: Vec<T>,
    next_slot: usize,
}

impl<T: Clone> FrameHistory<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            capacity,
            buffer: Vec::with_capacity(capacity),
            next_slot: 0,
        }
    }

    pub fn capacity(&self) -> usize { self.capacity }

    pub fn len(&self) -> usize { self.buffer.len() }

    pub fn is_empty(&self) -> bool { self.buffer.is_empty() }

    /// The policy may only be queried once the history is full
    pub fn is_full(&self) -> bool { self.buffer.len() == self.capacity }

    pub fn push(
        &mut self,
        element: T,
    ) {
        if self.buffer.len() < self.capacity {
            self.buffer.push(element);
        } else {
            self.buffer[self.next_slot] = element;
        }
        self.next_slot = (self.next_slot + 1) % self.capacity;
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.next_slot = 0;
    }

    /// `steps_into_history` = 0 returns the most recent frame
    pub fn get(
        &self,
        steps_into_history: usize,
    ) -> Option<&T> {
        if steps_into_history >= self.buffer.len() {
            return None;
        }
        let slot = (self.next_slot + self.capacity - 1 - steps_into_history) % self.capacity;
        self.buffer.get(slot)
    }

    pub fn newest(&self) -> Option<&T> { self.get(0) }

    /// Copy of the buffered frames, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        if self.is_full() {
            let (newer, older) = self.buffer.split_at(self.next_slot);
            older.iter().chain(newer.iter()).cloned().collect()
        } else {
            self.buffer.clone()
        }
    }
}
