// FEEDGATE — ENGINE: SPSC LOCK-FREE RING
// The only inter-thread channel inside the gateway core: the gateway thread
// (producer) hands decrypted market updates to the book-builder thread
// (consumer). Entries are copied by value into and out of slots — no pointer
// ever escapes the ring.
//
// Index discipline: both indices wrap modulo capacity and one slot is always
// sacrificed, so full is exactly (write+1) mod cap == read and empty is
// exactly write == read. A capacity-C ring holds C-1 entries.
//
// push/pop never block and never spin internally; a full/empty ring returns
// false and the caller decides the retry policy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Hardware cache-line padding.
/// 128 bytes covers both L1d false sharing and adjacent-line hardware
/// prefetcher intersections (128-byte pair on Intel, 128-byte stride on
/// Cortex-A53).
#[repr(C, align(128))]
struct CachePadded<T> {
    value: T,
}

pub struct SpscRing<T> {
    head: CachePadded<AtomicUsize>, // Producer-written, consumer-read (write index)
    tail: CachePadded<AtomicUsize>, // Consumer-written, producer-read (read index)
    capacity: usize,
    buffer: *mut T,
}

// SAFETY: The ring is designed for single-producer single-consumer use.
// Send moves the halves across thread boundaries; Sync is required because
// both threads hold Arc<SpscRing<T>> references.
unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T> Drop for SpscRing<T> {
    fn drop(&mut self) {
        // Recover the Vec allocation. Length 0 because elements are managed
        // manually; slot types are Copy with no Drop impl.
        unsafe { let _ = Vec::from_raw_parts(self.buffer, 0, self.capacity); }
    }
}

pub struct Producer<T> {
    ring: Arc<SpscRing<T>>,
    local_head: usize,
    cached_tail: usize, // DPDK-style shadow: avoids a cross-core Acquire on every push
    capacity: usize,
}

pub struct Consumer<T> {
    ring: Arc<SpscRing<T>>,
    cached_head: usize, // DPDK-style shadow: avoids a cross-core Acquire on every pop
    local_tail: usize,
    capacity: usize,
}

// SAFETY: Producer and Consumer are each used by exactly one thread.
unsafe impl<T: Send> Send for Producer<T> {}
unsafe impl<T: Send> Send for Consumer<T> {}

/// Create a new SPSC ring pair. One slot is sacrificed to distinguish full
/// from empty, so `capacity` slots yield `capacity - 1` usable entries.
pub fn make_spsc<T: Copy>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    assert!(capacity >= 2, "[FATAL] SPSC capacity must be at least 2");
    let mut vec = Vec::with_capacity(capacity);
    let buffer = vec.as_mut_ptr();
    std::mem::forget(vec);

    let ring = Arc::new(SpscRing {
        head: CachePadded { value: AtomicUsize::new(0) },
        tail: CachePadded { value: AtomicUsize::new(0) },
        capacity,
        buffer,
    });

    (
        Producer { ring: ring.clone(), local_head: 0, cached_tail: 0, capacity },
        Consumer { ring, cached_head: 0, local_tail: 0, capacity },
    )
}

impl<T: Copy> Producer<T> {
    /// Copy one entry into the ring. A slot is written only when
    /// (write+1) mod cap differs from the read index; returns false, touching
    /// nothing, when they still collide after refreshing the consumer's tail.
    #[inline(always)]
    pub fn push(&mut self, item: &T) -> bool {
        let mut next = self.local_head + 1;
        if next == self.capacity {
            next = 0;
        }
        // Only cross the interconnect (Acquire) if the local shadow says full.
        if next == self.cached_tail {
            self.cached_tail = self.ring.tail.value.load(Ordering::Acquire);
            if next == self.cached_tail {
                return false;
            }
        }
        // SAFETY: local_head < capacity by construction; the slot is ours
        // alone until head is published.
        unsafe { self.ring.buffer.add(self.local_head).write(*item); }
        self.local_head = next;
        // Release publishes the slot write before the new head.
        self.ring.head.value.store(next, Ordering::Release);
        true
    }
}

impl<T: Copy> Consumer<T> {
    /// Copy one entry out of the ring. Empty is exactly write == read;
    /// returns false, touching nothing, when the indices still match after
    /// refreshing the producer's head.
    #[inline(always)]
    pub fn pop(&mut self, out: &mut T) -> bool {
        if self.local_tail == self.cached_head {
            self.cached_head = self.ring.head.value.load(Ordering::Acquire);
            if self.local_tail == self.cached_head {
                return false;
            }
        }
        // SAFETY: local_tail < capacity by construction; the slot was
        // published by the producer's Release store on head, observed by our
        // Acquire load.
        *out = unsafe { self.ring.buffer.add(self.local_tail).read() };
        let mut next = self.local_tail + 1;
        if next == self.capacity {
            next = 0;
        }
        self.local_tail = next;
        // Release publishes the slot read before freeing it for reuse.
        self.ring.tail.value.store(next, Ordering::Release);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_ring_rejects_push() {
        // Four slots, one sacrificed: exactly three entries fit.
        let (mut px, mut cx) = make_spsc::<u32>(4);
        for i in 0..3u32 { assert!(px.push(&i)); }
        assert!(!px.push(&99), "push when (write+1) mod cap == read must fail");
        let mut v = 0u32;
        assert!(cx.pop(&mut v));
        assert_eq!(v, 0);
        assert!(px.push(&99), "one pop frees exactly one slot");
    }

    #[test]
    fn empty_ring_rejects_pop() {
        let (mut px, mut cx) = make_spsc::<u32>(4);
        let mut v = 0u32;
        assert!(!cx.pop(&mut v), "pop when write == read must fail");
        assert!(px.push(&7));
        assert!(cx.pop(&mut v));
        assert_eq!(v, 7);
        assert!(!cx.pop(&mut v), "ring must be empty again");
    }

    #[test]
    fn indices_wrap_cleanly() {
        let (mut px, mut cx) = make_spsc::<u64>(4);
        let mut v = 0u64;
        // Many more operations than the capacity forces every slot to recycle.
        for i in 0..1000u64 {
            assert!(px.push(&i));
            assert!(cx.pop(&mut v));
            assert_eq!(v, i);
        }
    }
}
