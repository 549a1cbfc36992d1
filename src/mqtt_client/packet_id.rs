// MIT License
//
// Copyright (c) 2025 Takatoshi Kondo
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Packet identifier allocation for QoS 1/2 publishes, subscribes, and
//! unsubscribes.

use std::collections::HashSet;

/// Issues 16-bit packet identifiers in [1, 65535].
///
/// Allocation scans upward from the last issued identifier, wrapping past
/// 65535 back to 1 and skipping identifiers still outstanding. Release is
/// idempotent so duplicate terminal acknowledgments cannot corrupt the
/// in-use set.
#[derive(Debug, Default)]
pub struct PacketIdAllocator {
    in_use: HashSet<u16>,
    last: u16,
}

impl PacketIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next free identifier, or `None` when all 65535 are
    /// outstanding.
    pub fn allocate(&mut self) -> Option<u16> {
        if self.in_use.len() == u16::MAX as usize {
            return None;
        }
        let mut candidate = self.last;
        loop {
            candidate = if candidate == u16::MAX { 1 } else { candidate + 1 };
            if !self.in_use.contains(&candidate) {
                self.in_use.insert(candidate);
                self.last = candidate;
                return Some(candidate);
            }
        }
    }

    /// Release `id` back to the free set. A no-op when `id` is not
    /// currently allocated.
    pub fn release(&mut self, id: u16) {
        self.in_use.remove(&id);
    }

    pub fn is_allocated(&self, id: u16) -> bool {
        self.in_use.contains(&id)
    }

    pub fn outstanding(&self) -> usize {
        self.in_use.len()
    }

    /// Drop every allocation, for connection teardown.
    pub fn clear(&mut self) {
        self.in_use.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_monotonic_from_one() {
        let mut alloc = PacketIdAllocator::new();
        assert_eq!(alloc.allocate(), Some(1));
        assert_eq!(alloc.allocate(), Some(2));
        assert_eq!(alloc.allocate(), Some(3));
    }

    #[test]
    fn released_ids_are_skipped_until_wrap() {
        let mut alloc = PacketIdAllocator::new();
        let a = alloc.allocate().unwrap();
        let b = alloc.allocate().unwrap();
        alloc.release(a);
        // The allocator keeps moving forward rather than reusing `a`
        // immediately.
        assert_eq!(alloc.allocate(), Some(b + 1));
        assert!(!alloc.is_allocated(a));
    }

    #[test]
    fn wraps_past_maximum() {
        let mut alloc = PacketIdAllocator::new();
        alloc.last = u16::MAX - 1;
        assert_eq!(alloc.allocate(), Some(u16::MAX));
        assert_eq!(alloc.allocate(), Some(1));
    }

    #[test]
    fn never_yields_an_outstanding_id() {
        let mut alloc = PacketIdAllocator::new();
        alloc.last = u16::MAX;
        let held = alloc.allocate().unwrap();
        assert_eq!(held, 1);
        alloc.last = u16::MAX;
        // 1 is still held, so the wrap must land on 2.
        assert_eq!(alloc.allocate(), Some(2));
    }

    #[test]
    fn double_release_is_idempotent() {
        let mut alloc = PacketIdAllocator::new();
        let id = alloc.allocate().unwrap();
        alloc.release(id);
        alloc.release(id);
        assert_eq!(alloc.outstanding(), 0);
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut alloc = PacketIdAllocator::new();
        for _ in 0..u16::MAX {
            assert!(alloc.allocate().is_some());
        }
        assert_eq!(alloc.allocate(), None);
        alloc.release(40_000);
        assert_eq!(alloc.allocate(), Some(40_000));
    }
}
