/*!
 * Fragmentation Tests
 * Hard gaps recovered on free, soft fragments tracked as free blocks
 */

use super::support::HEADER;
use pretty_assertions::assert_eq;
use vmslab::{Heap, HeapInfo};

#[test]
fn test_hard_fragment_gap_folded_back_on_free() {
    let mut heap = Heap::new();
    heap.register_family("emp", 8).unwrap();
    let max = heap.max_allocatable();

    let keeper = heap.allocate("emp", 1).unwrap();
    // After the keeper, max - 40 payload bytes remain; leave 24 behind.
    let units = ((max - 8 - HEADER - 24) / 8) as u32;
    let requested = units * 8;
    let ptr = heap.allocate("emp", units).unwrap();
    heap.verify().unwrap();

    let snapshot = heap.family_snapshot("emp").unwrap();
    let blocks = &snapshot.pages[0].blocks;
    assert_eq!(blocks.len(), 2, "no fragment block may be created");
    assert_eq!(blocks[1].payload_size, requested);
    assert_eq!(blocks[1].gap, 24);
    assert!(snapshot.free_list.is_empty());
    assert_eq!(heap.usage_report().family("emp").unwrap().gap_bytes, 24);

    heap.free(ptr).unwrap();
    heap.verify().unwrap();

    let snapshot = heap.family_snapshot("emp").unwrap();
    let blocks = &snapshot.pages[0].blocks;
    assert_eq!(blocks.len(), 2);
    assert!(blocks[1].is_free);
    assert_eq!(blocks[1].payload_size, requested + 24);
    assert_eq!(blocks[1].gap, 0);
    assert_eq!(snapshot.free_list, vec![requested + 24]);

    heap.free(keeper).unwrap();
    assert_eq!(heap.page_count(), 0);
}

#[test]
fn test_hard_fragment_gap_before_next_header() {
    let mut heap = Heap::new();
    heap.register_family("emp", 8).unwrap();
    let max = heap.max_allocatable();

    let front = heap.allocate("emp", 1).unwrap();
    let hole = heap.allocate("emp", 8).unwrap();
    let back = heap.allocate("emp", 1).unwrap();
    // Consume the tail so the 64-byte hole is the only free block.
    let tail_units = ((max - 3 * HEADER - 8 - 64 - 8) / 8) as u32;
    let tail = heap.allocate("emp", tail_units).unwrap();
    heap.free(hole).unwrap();
    assert_eq!(heap.family_snapshot("emp").unwrap().free_list, vec![64]);

    // 64 - 48 = 16 bytes: too small for a header.
    let reused = heap.allocate("emp", 6).unwrap();
    assert_eq!(reused, hole);
    let snapshot = heap.family_snapshot("emp").unwrap();
    assert_eq!(snapshot.pages[0].blocks[1].payload_size, 48);
    assert_eq!(snapshot.pages[0].blocks[1].gap, 16);
    heap.verify().unwrap();

    heap.free(reused).unwrap();
    let snapshot = heap.family_snapshot("emp").unwrap();
    assert_eq!(snapshot.pages[0].blocks[1].payload_size, 64);
    assert_eq!(snapshot.free_list, vec![64]);
    heap.verify().unwrap();

    for ptr in [front, back, tail] {
        heap.free(ptr).unwrap();
    }
    assert_eq!(heap.page_count(), 0);
}

#[test]
fn test_soft_fragment_tracked_but_unusable() {
    let mut heap = Heap::new();
    heap.register_family("wide", 64).unwrap();
    let max = heap.max_allocatable();

    // Leave HEADER + 16 bytes: room for a header, not for one 64-byte element.
    let units = ((max - HEADER - 16) / 64) as u32;
    let leftover = max - units as usize * 64;
    let ptr = heap.allocate("wide", units).unwrap();

    let snapshot = heap.family_snapshot("wide").unwrap();
    let blocks = &snapshot.pages[0].blocks;
    if leftover >= HEADER && leftover < HEADER + 64 {
        assert_eq!(blocks.len(), 2);
        assert!(blocks[1].is_free);
        assert_eq!(blocks[1].payload_size as usize, leftover - HEADER);
        assert_eq!(snapshot.free_list, vec![(leftover - HEADER) as u32]);

        // The fragment cannot serve an element, so a fresh page is mapped.
        let next = heap.allocate("wide", 1).unwrap();
        assert_eq!(heap.page_count(), 2);
        heap.free(next).unwrap();
    }
    heap.verify().unwrap();

    heap.free(ptr).unwrap();
    assert_eq!(heap.page_count(), 0);
}

#[test]
fn test_zero_payload_soft_fragment() {
    let mut heap = Heap::new();
    heap.register_family("emp", 8).unwrap();
    let max = heap.max_allocatable();

    // Exactly one header's worth of bytes remains.
    let units = ((max - HEADER) / 8) as u32;
    let ptr = heap.allocate("emp", units).unwrap();

    let snapshot = heap.family_snapshot("emp").unwrap();
    assert_eq!(snapshot.free_list, vec![0]);
    assert_eq!(snapshot.pages[0].blocks.len(), 2);
    heap.verify().unwrap();

    let other = heap.allocate("emp", 1).unwrap();
    assert_eq!(heap.page_count(), 2);

    heap.free(ptr).unwrap();
    heap.free(other).unwrap();
    assert_eq!(heap.page_count(), 0);
}

#[test]
fn test_exact_fit_consumes_whole_block() {
    let mut heap = Heap::new();
    heap.register_family("emp", 8).unwrap();
    let max = heap.max_allocatable();

    let ptr = heap.allocate("emp", (max / 8) as u32).unwrap();
    let snapshot = heap.family_snapshot("emp").unwrap();
    assert_eq!(snapshot.pages[0].blocks.len(), 1);
    assert_eq!(snapshot.pages[0].blocks[0].gap, 0);
    assert!(snapshot.free_list.is_empty());

    heap.free(ptr).unwrap();
    assert_eq!(heap.page_count(), 0);
}
