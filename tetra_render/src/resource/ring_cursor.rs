//! RingCursor - offset bookkeeping for per-frame linear allocators
//!
//! Backends that stage constant data into one GPU buffer per frame slot
//! hand out offsets with this. The first aligned block is a permanent zero
//! page that unbound slots point at; `reset` rewinds to just after it.

pub fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

#[derive(Debug, Clone)]
pub struct RingCursor {
    capacity: u64,
    alignment: u64,
    reserved: u64,
    head: u64,
}

impl RingCursor {
    pub fn new(capacity: u64, alignment: u64, zero_page: u64) -> Self {
        let alignment = alignment.max(1);
        let reserved = align_up(zero_page, alignment);
        Self { capacity, alignment, reserved, head: reserved }
    }

    /// Reserve `size` bytes; `None` when the ring is full
    pub fn push(&mut self, size: u64) -> Option<u64> {
        let offset = self.head;
        let end = offset.checked_add(size)?;
        if end > self.capacity {
            return None;
        }
        self.head = align_up(end, self.alignment);
        Some(offset)
    }

    pub fn reset(&mut self) {
        self.head = self.reserved;
    }

    /// Bytes handed out since the last reset (zero page excluded)
    pub fn used(&self) -> u64 {
        self.head - self.reserved
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Size of the zero page at offset 0
    pub fn zero_page(&self) -> u64 {
        self.reserved
    }
}

#[cfg(test)]
#[path = "ring_cursor_tests.rs"]
mod tests;
