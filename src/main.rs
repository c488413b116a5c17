/*!
 * vmslab - Demo Driver
 *
 * Registers two structure families, walks three allocate/free scenarios,
 * and prints usage and block reports after each one.
 *
 * Set VMSLAB_REPORT_JSON=1 to print reports as JSON.
 */

use miette::{IntoDiagnostic, Result};
use std::ptr::NonNull;
use tracing::info;
use vmslab::monitoring::span_operation;
use vmslab::{init_tracing, Heap, HeapConfig, HeapInfo};

#[allow(non_camel_case_types, dead_code)]
struct emp_t {
    name: [u8; 32],
    emp_id: u32,
}

#[allow(non_camel_case_types, dead_code)]
struct student_t {
    name: [u8; 32],
    rollno: u32,
    marks_phys: u32,
    marks_chem: u32,
    marks_maths: u32,
    next: Option<NonNull<student_t>>,
}

fn report(heap: &Heap, title: &str, json: bool) -> Result<()> {
    println!("\n{} ***********", title);
    let usage = heap.usage_report();
    if json {
        println!("{}", serde_json::to_string_pretty(&usage).into_diagnostic()?);
        return Ok(());
    }
    println!("{}", usage);
    for family in heap.families() {
        if let Some(snapshot) = heap.family_snapshot(&family.name) {
            println!("{}", snapshot);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();

    let json = std::env::var("VMSLAB_REPORT_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let mut heap = Heap::with_config(HeapConfig::from_env());
    info!(
        page_len = heap.page_len(),
        max_allocatable = heap.max_allocatable(),
        "vmslab demo starting"
    );

    heap.register_type::<emp_t>()?;
    heap.register_type::<student_t>()?;
    for family in heap.families() {
        println!("{:<32} {:>6} bytes", family.name, family.element_size);
    }

    let (emp1, emp2, emp3, stud1, stud2) = {
        let span = span_operation("scenario 1");
        let _entered = span.enter();
        let emp1 = heap.allocate("emp_t", 1)?;
        let emp2 = heap.allocate("emp_t", 1)?;
        let emp3 = heap.allocate("emp_t", 1)?;
        let stud1 = heap.allocate("student_t", 1)?;
        let stud2 = heap.allocate("student_t", 1)?;
        (emp1, emp2, emp3, stud1, stud2)
    };
    report(&heap, "SCENARIO 1", json)?;

    {
        let span = span_operation("scenario 2");
        let _entered = span.enter();
        heap.free(emp1)?;
        heap.free(emp3)?;
        heap.free(stud2)?;
    }
    report(&heap, "SCENARIO 2", json)?;

    {
        let span = span_operation("scenario 3");
        let _entered = span.enter();
        heap.free(emp2)?;
        heap.free(stud1)?;
        heap.allocate("student_t", 1)?;
    }
    report(&heap, "SCENARIO 3", json)?;

    heap.verify()?;
    info!("vmslab demo complete");
    Ok(())
}
