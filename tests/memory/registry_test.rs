/*!
 * Family Registry Tests
 * Registration limits, duplicate detection, and lookup
 */

use pretty_assertions::assert_eq;
use vmslab::{FamilyId, Heap, HeapConfig, HeapInfo, MemoryError};

#[test]
fn test_register_and_enumerate_families() {
    let mut heap = Heap::new();
    let emp = heap.register_family("emp_t", 36).unwrap();
    let student = heap.register_family("student_t", 60).unwrap();

    assert_eq!(heap.lookup("emp_t"), Some(emp));
    assert_eq!(heap.lookup("student_t"), Some(student));
    assert_eq!(heap.lookup("teacher_t"), None);

    let names: Vec<_> = heap.families().into_iter().map(|f| (f.name, f.element_size)).collect();
    assert_eq!(
        names,
        vec![("emp_t".to_string(), 36), ("student_t".to_string(), 60)]
    );
}

#[test]
fn test_duplicate_registration_is_fatal_and_keeps_original() {
    let mut heap = Heap::new();
    heap.register_family("emp_t", 36).unwrap();

    let err = heap.register_family("emp_t", 12).unwrap_err();
    assert_eq!(err, MemoryError::DuplicateFamily("emp_t".into()));
    assert!(err.is_fatal());

    let families = heap.families();
    assert_eq!(families.len(), 1);
    assert_eq!(families[0].element_size, 36);
}

#[test]
fn test_element_size_bounded_by_page_capacity() {
    let mut heap = Heap::new();
    let max = heap.max_allocatable();
    assert_eq!(max, heap.page_len() - 64);

    let err = heap.register_family("too_big", max as u32 + 1).unwrap_err();
    assert!(matches!(err, MemoryError::ElementTooLarge { .. }));
    assert!(err.is_fatal());
    assert!(heap.families().is_empty());
    assert_eq!(heap.lookup("too_big"), None);

    heap.register_family("page_sized", max as u32).unwrap();
    let ptr = heap.allocate("page_sized", 1).unwrap();
    heap.verify().unwrap();
    heap.free(ptr).unwrap();
    assert_eq!(heap.page_count(), 0);
}

#[test]
fn test_wider_pages_raise_the_element_limit() {
    let narrow = Heap::new();
    let mut wide = Heap::with_config(HeapConfig::wide(4));

    assert_eq!(wide.page_len(), narrow.page_len() * 4);
    let big = narrow.max_allocatable() as u32 + 1;
    wide.register_family("big", big).unwrap();
    let ptr = wide.allocate("big", 2).unwrap();
    wide.verify().unwrap();
    wide.free(ptr).unwrap();
}

#[test]
fn test_invalid_names_rejected() {
    let mut heap = Heap::new();
    assert!(matches!(
        heap.register_family("", 8),
        Err(MemoryError::InvalidFamilyName { .. })
    ));
    assert!(matches!(
        heap.register_family(&"n".repeat(33), 8),
        Err(MemoryError::InvalidFamilyName { .. })
    ));
    assert!(matches!(
        heap.register_family("zero", 0),
        Err(MemoryError::ZeroElementSize(_))
    ));
    assert!(heap.families().is_empty());
}

#[test]
fn test_many_families_span_registry_slabs() {
    let mut heap = Heap::new();
    let count = heap.page_len() / 40 * 2 + 5;

    for i in 0..count {
        let id = heap.register_family(&format!("family_{}", i), 8 + i as u32 % 64).unwrap();
        assert_eq!(id, FamilyId(i as u32));
    }

    assert_eq!(heap.families().len(), count);
    let last = format!("family_{}", count - 1);
    let ptr = heap.allocate(&last, 1).unwrap();
    heap.free(ptr).unwrap();
}

#[test]
fn test_register_type_names_family_after_type() {
    #[allow(dead_code)]
    struct Employee {
        id: u64,
        salary: u32,
    }

    let mut heap = Heap::new();
    heap.register_type::<Employee>().unwrap();
    let info = heap.families().pop().unwrap();
    assert_eq!(info.name, "Employee");
    assert_eq!(info.element_size as usize, std::mem::size_of::<Employee>());
}
