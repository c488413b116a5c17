/*!
 * Page Source Tests
 * Map and unmap failures, teardown accounting
 */

use super::support::CountingSource;
use pretty_assertions::assert_eq;
use vmslab::{Heap, HeapConfig, HeapInfo, MemoryError};

#[test]
fn test_map_failure_is_recoverable() {
    let source = CountingSource::new();
    let mut heap = Heap::with_source(source.clone(), HeapConfig::default());
    heap.register_family("emp", 8).unwrap();

    source.stats.borrow_mut().fail_map = true;
    let err = heap.allocate("emp", 1).unwrap_err();
    assert!(matches!(err, MemoryError::MapFailed { .. }));
    assert!(!err.is_fatal());
    assert_eq!(heap.page_count(), 0);
    heap.verify().unwrap();

    source.stats.borrow_mut().fail_map = false;
    let ptr = heap.allocate("emp", 1).unwrap();
    assert_eq!(source.stats.borrow().maps, 1);
    heap.free(ptr).unwrap();
    assert_eq!(source.stats.borrow().unmaps, 1);
}

#[test]
fn test_unmap_failure_forgets_page() {
    let source = CountingSource::new();
    let mut heap = Heap::with_source(source.clone(), HeapConfig::default());
    heap.register_family("emp", 8).unwrap();

    let ptr = heap.allocate("emp", 1).unwrap();
    source.stats.borrow_mut().fail_unmap = true;
    heap.free(ptr).unwrap();

    assert_eq!(heap.page_count(), 0);
    assert!(heap.family_snapshot("emp").unwrap().pages.is_empty());
    heap.verify().unwrap();

    // The pointer no longer resolves to any page.
    assert_eq!(
        heap.free(ptr),
        Err(MemoryError::InvalidPointer(ptr.as_ptr() as usize))
    );
}

#[test]
fn test_drop_unmaps_every_page() {
    let source = CountingSource::new();
    {
        let mut heap = Heap::with_source(source.clone(), HeapConfig::default());
        heap.register_family("emp", 8).unwrap();
        heap.register_family("student", 24).unwrap();
        let max = heap.max_allocatable() as u32;

        heap.allocate("emp", max / 8).unwrap();
        heap.allocate("emp", 1).unwrap();
        heap.allocate("student", 1).unwrap();
        assert_eq!(heap.page_count(), 3);
        assert_eq!(source.stats.borrow().maps, 3);
    }
    let stats = source.stats.borrow();
    assert_eq!(stats.maps, 3);
    assert_eq!(stats.unmaps, 3);
}

#[test]
fn test_wide_pages_map_multiple_system_pages() {
    let source = CountingSource::new();
    let system_page = {
        use vmslab::PageSource;
        source.system_page_size()
    };
    let mut heap = Heap::with_source(source.clone(), HeapConfig::wide(4));
    assert_eq!(heap.page_len(), system_page * 4);

    heap.register_family("big", 1024).unwrap();
    let units = (heap.max_allocatable() / 1024) as u32;
    assert!(units >= 3);
    let ptr = heap.allocate("big", units).unwrap();
    assert_eq!(heap.page_count(), 1);
    assert_eq!(source.stats.borrow().maps, 1);
    heap.free(ptr).unwrap();
    assert_eq!(heap.page_count(), 0);
}

#[test]
fn test_unwritable_page_is_returned_to_source() {
    let source = CountingSource::new();
    let mut heap = Heap::with_source(source.clone(), HeapConfig::default());
    heap.register_family("emp", 8).unwrap();

    // Room for the page header but not the first block header.
    source.stats.borrow_mut().truncate_to = Some(48);
    let err = heap.allocate("emp", 1).unwrap_err();
    assert!(matches!(err, MemoryError::Corrupted { .. }));
    {
        let stats = source.stats.borrow();
        assert_eq!(stats.maps, 1);
        assert_eq!(stats.unmaps, 1);
    }
    assert_eq!(heap.page_count(), 0);
    let snapshot = heap.family_snapshot("emp").unwrap();
    assert!(snapshot.pages.is_empty());
    assert!(snapshot.free_list.is_empty());
    heap.verify().unwrap();

    source.stats.borrow_mut().truncate_to = None;
    let ptr = heap.allocate("emp", 1).unwrap();
    heap.free(ptr).unwrap();
    assert_eq!(source.stats.borrow().unmaps, 2);
}
