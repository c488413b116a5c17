/*!
 * Block Reclaimer Tests
 * Coalescing, page release, and misuse detection on free
 */

use super::support::{payload, HEADER};
use pretty_assertions::assert_eq;
use std::ptr::NonNull;
use vmslab::{Heap, HeapInfo, MemoryError};

fn emp_heap() -> Heap {
    let mut heap = Heap::new();
    heap.register_family("emp", 8).unwrap();
    heap.register_family("student", 24).unwrap();
    heap
}

#[test]
fn test_emp_student_scenario() {
    let mut heap = emp_heap();
    let max = heap.max_allocatable() as u32;
    let usable = heap.page_len() - 32;

    let emp1 = heap.allocate("emp", 1).unwrap();
    let emp2 = heap.allocate("emp", 1).unwrap();
    let emp3 = heap.allocate("emp", 1).unwrap();
    let stud1 = heap.allocate("student", 1).unwrap();
    let stud2 = heap.allocate("student", 1).unwrap();
    assert_eq!(heap.page_count(), 2);

    heap.free(emp1).unwrap();
    heap.free(emp3).unwrap();
    heap.free(stud2).unwrap();
    heap.verify().unwrap();

    // emp3 absorbed the trailing free block; emp1 stays alone behind emp2.
    let emp = heap.family_snapshot("emp").unwrap();
    assert_eq!(emp.free_list, vec![max - 80, 8]);
    let blocks: Vec<_> = emp.pages[0].blocks.iter().map(|b| (b.payload_size, b.is_free)).collect();
    assert_eq!(blocks, vec![(8, true), (8, false), (max - 80, true)]);

    let student = heap.family_snapshot("student").unwrap();
    assert_eq!(student.free_list, vec![max - 56]);

    let report = heap.usage_report();
    for (name, still_allocated) in [("emp", 8usize), ("student", 24usize)] {
        let usage = report.family(name).unwrap();
        assert_eq!(usage.allocated_blocks, 1);
        assert_eq!(usage.allocated_bytes, still_allocated);
        assert_eq!(
            usage.free_bytes + usage.free_blocks * HEADER,
            usable - still_allocated - HEADER
        );
    }

    heap.free(emp2).unwrap();
    heap.free(stud1).unwrap();
    assert_eq!(heap.page_count(), 0);
    assert!(heap.family_snapshot("emp").unwrap().pages.is_empty());

    heap.allocate("student", 1).unwrap();
    assert_eq!(heap.page_count(), 1);
    heap.verify().unwrap();
}

#[test]
fn test_page_released_when_last_block_freed() {
    let mut heap = emp_heap();

    let ptr = heap.allocate("emp", 1).unwrap();
    assert_eq!(heap.page_count(), 1);
    heap.free(ptr).unwrap();
    assert_eq!(heap.page_count(), 0);
    assert!(heap.family_snapshot("emp").unwrap().free_list.is_empty());

    heap.allocate("emp", 1).unwrap();
    assert_eq!(heap.page_count(), 1);
    heap.verify().unwrap();
}

#[test]
fn test_coalesce_backward_and_forward() {
    let mut heap = emp_heap();

    let keeper = heap.allocate("emp", 1).unwrap();
    let a = heap.allocate("emp", 2).unwrap();
    let b = heap.allocate("emp", 3).unwrap();
    let c = heap.allocate("emp", 4).unwrap();
    let tail_keeper = heap.allocate("emp", 1).unwrap();

    heap.free(a).unwrap();
    heap.free(c).unwrap();
    heap.verify().unwrap();
    assert_eq!(heap.family_snapshot("emp").unwrap().free_list.len(), 3);

    // b merges with c ahead of it and then into a behind it.
    heap.free(b).unwrap();
    heap.verify().unwrap();
    let snapshot = heap.family_snapshot("emp").unwrap();
    let merged = 16 + HEADER as u32 + 24 + HEADER as u32 + 32;
    let blocks: Vec<_> = snapshot.pages[0]
        .blocks
        .iter()
        .map(|b| (b.payload_size, b.is_free))
        .collect();
    assert_eq!(blocks[..3].to_vec(), vec![(8, false), (merged, true), (8, false)]);
    assert!(snapshot.free_list.contains(&merged));
    assert_eq!(snapshot.free_list.len(), 2);

    heap.free(keeper).unwrap();
    heap.free(tail_keeper).unwrap();
    assert_eq!(heap.page_count(), 0);
}

#[test]
fn test_double_free_is_fatal() {
    let mut heap = emp_heap();
    let keeper = heap.allocate("emp", 1).unwrap();
    let ptr = heap.allocate("emp", 1).unwrap();
    let _guard = heap.allocate("emp", 1).unwrap();

    heap.free(ptr).unwrap();
    let err = heap.free(ptr).unwrap_err();
    assert_eq!(err, MemoryError::DoubleFree(ptr.as_ptr() as usize));
    assert!(err.is_fatal());
    heap.verify().unwrap();

    // A block that absorbed its free successor is still recognized.
    heap.free(keeper).unwrap();
    assert!(matches!(heap.free(keeper), Err(MemoryError::DoubleFree(_))));
}

#[test]
fn test_double_free_of_coalesced_block_detected() {
    let mut heap = emp_heap();
    let _front = heap.allocate("emp", 1).unwrap();
    let a = heap.allocate("emp", 1).unwrap();
    let b = heap.allocate("emp", 1).unwrap();
    let _back = heap.allocate("emp", 1).unwrap();

    heap.free(a).unwrap();
    heap.free(b).unwrap();
    assert!(matches!(heap.free(b), Err(MemoryError::DoubleFree(_))));
    assert!(matches!(heap.free(a), Err(MemoryError::DoubleFree(_))));
    heap.verify().unwrap();
}

#[test]
fn test_free_after_page_release_is_invalid_pointer() {
    let mut heap = emp_heap();
    let ptr = heap.allocate("emp", 1).unwrap();
    heap.free(ptr).unwrap();

    let err = heap.free(ptr).unwrap_err();
    assert_eq!(err, MemoryError::InvalidPointer(ptr.as_ptr() as usize));
    assert!(err.is_fatal());
}

#[test]
fn test_foreign_and_misaligned_pointers_rejected() {
    let mut heap = emp_heap();
    let ptr = heap.allocate("emp", 2).unwrap();

    let mut local = [0u8; 16];
    let foreign = NonNull::new(local.as_mut_ptr()).unwrap();
    assert!(matches!(heap.free(foreign), Err(MemoryError::InvalidPointer(_))));

    let inside = NonNull::new(unsafe { ptr.as_ptr().add(1) }).unwrap();
    assert!(matches!(heap.free(inside), Err(MemoryError::InvalidPointer(_))));

    let page_base = heap.family_snapshot("emp").unwrap().pages[0].base;
    let header_area = NonNull::new(page_base as *mut u8).unwrap();
    assert!(matches!(heap.free(header_area), Err(MemoryError::InvalidPointer(_))));

    heap.verify().unwrap();
    heap.free(ptr).unwrap();
}

#[test]
fn test_corrupted_header_detected() {
    let mut heap = emp_heap();
    let _keeper = heap.allocate("emp", 1).unwrap();
    let ptr = heap.allocate("emp", 1).unwrap();

    // Give the allocated block a free-list link it should not have.
    let header = NonNull::new(unsafe { ptr.as_ptr().sub(HEADER) }).unwrap();
    payload(header, HEADER)[24] = 1;

    assert!(heap.verify().is_err());
    let err = heap.free(ptr).unwrap_err();
    assert!(matches!(err, MemoryError::Corrupted { .. }));
    assert!(err.is_fatal());
}
