//! End-to-end collection scenarios
//!
//! These drive the heap only through its public surface: construct, root,
//! collect, inspect. Allocation accounting is checked through a shared
//! `AllocCounter` so leaks and double frees show up as counter drift.

use snek_runtime::{AllocCounter, Collector, Heap, HeapConfig, HeapError, Kind, ObjRef};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn counted_heap() -> (Heap, Arc<AllocCounter>) {
    init_tracing();
    let counter = Arc::new(AllocCounter::new());
    let heap = Heap::with_counter(HeapConfig::default(), Arc::clone(&counter));
    (heap, counter)
}

#[test]
fn test_vector3_survives_while_any_frame_roots_it() {
    let (mut heap, counter) = counted_heap();

    let f1 = heap.new_frame().unwrap();
    let x = heap.new_integer(59).unwrap();
    let y = heap.new_integer(520).unwrap();
    let z = heap.new_integer(1228).unwrap();
    let vec = heap.new_vector3(x, y, z).unwrap();
    heap.frame_reference_object(f1, vec).unwrap();

    let f2 = heap.new_frame().unwrap();
    heap.frame_reference_object(f2, vec).unwrap();
    assert_eq!(heap.pop_frame(), Some(f2));

    let stats = heap.collect_garbage().unwrap();
    assert_eq!(stats.freed, 0);
    assert_eq!(stats.survivors, 4);
    assert_eq!(stats.roots, 1);
    assert_eq!(stats.traced, 3);
    for obj in [vec, x, y, z] {
        assert!(heap.contains(obj));
        assert_eq!(heap.is_marked(obj), Some(false));
    }
    assert_eq!(heap.display(vec).to_string(), "<59, 520, 1228>");

    assert_eq!(heap.pop_frame(), Some(f1));
    let stats = heap.collect_garbage().unwrap();
    assert_eq!(stats.freed, 4);
    assert_eq!(heap.object_count(), 0);
    assert!(counter.all_freed());
}

#[test]
fn test_unrooted_object_is_freed() {
    let (mut heap, counter) = counted_heap();
    let frame = heap.new_frame().unwrap();
    let kept = heap.new_string("kept").unwrap();
    let dropped = heap.new_string("dropped").unwrap();
    heap.frame_reference_object(frame, kept).unwrap();

    let stats = heap.collect_garbage().unwrap();
    assert_eq!(stats.freed, 1);
    assert!(heap.contains(kept));
    assert!(!heap.contains(dropped));
    assert_eq!(
        heap.length(dropped),
        Err(HeapError::StaleReference(dropped))
    );

    heap.pop_frame();
    heap.collect_garbage().unwrap();
    assert!(counter.all_freed());
}

#[test]
fn test_nested_arrays_traced_from_outermost_root() {
    let (mut heap, counter) = counted_heap();
    let frame = heap.new_frame().unwrap();

    let outer = heap.new_array(2).unwrap();
    let mut leaves = Vec::new();
    for i in 0..2 {
        let inner = heap.new_array(3).unwrap();
        for j in 0..3 {
            let s = heap.new_string(format!("s{}{}", i, j)).unwrap();
            heap.array_set(inner, j, s).unwrap();
            leaves.push(s);
        }
        heap.array_set(outer, i, inner).unwrap();
    }
    heap.frame_reference_object(frame, outer).unwrap();
    assert_eq!(heap.object_count(), 9);

    Collector::mark(&mut heap);
    Collector::trace(&mut heap).unwrap();
    for obj in heap.objects().collect::<Vec<_>>() {
        assert_eq!(heap.is_marked(obj), Some(true));
    }

    let sweep = Collector::sweep(&mut heap);
    assert_eq!(sweep.freed, 0);
    assert_eq!(sweep.survivors, 9);
    assert!(leaves.iter().all(|&s| heap.is_marked(s) == Some(false)));

    heap.pop_frame();
    let stats = heap.collect_garbage().unwrap();
    assert_eq!(stats.freed, 9);
    assert!(counter.all_freed());
}

#[test]
fn test_vector3_of_one_object_is_freed_once() {
    let (mut heap, counter) = counted_heap();

    // Unrooted: all four freed, the shared axis exactly once
    let v = heap.new_float(2.0).unwrap();
    heap.new_vector3(v, v, v).unwrap();
    let stats = heap.collect_garbage().unwrap();
    assert_eq!(stats.freed, 2);
    assert!(counter.all_freed());

    // Rooted: the axis is pushed onto the worklist once
    let frame = heap.new_frame().unwrap();
    let v = heap.new_float(2.0).unwrap();
    let vec = heap.new_vector3(v, v, v).unwrap();
    heap.frame_reference_object(frame, vec).unwrap();
    let stats = heap.collect_garbage().unwrap();
    assert_eq!(stats.traced, 1);
    assert_eq!(stats.survivors, 2);

    heap.pop_frame();
    heap.collect_garbage().unwrap();
    assert!(counter.all_freed());
}

#[test]
fn test_cycle_through_arrays_is_collected() {
    let (mut heap, counter) = counted_heap();
    let a = heap.new_array(1).unwrap();
    let b = heap.new_array(1).unwrap();
    heap.array_set(a, 0, b).unwrap();
    heap.array_set(b, 0, a).unwrap();

    let frame = heap.new_frame().unwrap();
    heap.frame_reference_object(frame, a).unwrap();
    assert_eq!(heap.collect_garbage().unwrap().freed, 0);
    assert_eq!(heap.display(a).to_string(), "[[[...]]]");

    heap.pop_frame();
    assert_eq!(heap.collect_garbage().unwrap().freed, 2);
    assert!(counter.all_freed());
}

#[test]
fn test_add_results_are_collectible() {
    let (mut heap, counter) = counted_heap();
    let frame = heap.new_frame().unwrap();

    let one = heap.new_integer(1).unwrap();
    let ones = heap.new_array(2).unwrap();
    heap.array_set(ones, 0, one).unwrap();
    heap.array_set(ones, 1, one).unwrap();
    let hi = heap.new_string("hi").unwrap();
    let his = heap.new_array(3).unwrap();
    for i in 0..3 {
        heap.array_set(his, i, hi).unwrap();
    }
    let joined = heap.add(ones, his).unwrap();
    heap.frame_reference_object(frame, joined).unwrap();

    // Operand arrays go; the elements they shared with the result stay
    let stats = heap.collect_garbage().unwrap();
    assert_eq!(stats.freed, 2);
    assert!(!heap.contains(ones));
    assert!(!heap.contains(his));
    assert_eq!(heap.kind(one), Some(Kind::Integer));
    assert_eq!(heap.display(joined).to_string(), r#"[1, 1, "hi", "hi", "hi"]"#);

    heap.pop_frame();
    heap.collect_garbage().unwrap();
    assert!(counter.all_freed());
}

#[test]
fn test_free_frame_out_of_order() {
    let (mut heap, counter) = counted_heap();
    let f1 = heap.new_frame().unwrap();
    let f2 = heap.new_frame().unwrap();
    let a = heap.new_integer(1).unwrap();
    let b = heap.new_integer(2).unwrap();
    heap.frame_reference_object(f1, a).unwrap();
    heap.frame_reference_object(f2, b).unwrap();

    assert!(heap.free_frame(f1));
    heap.collect_garbage().unwrap();
    assert!(!heap.contains(a));
    assert!(heap.contains(b));
    assert_eq!(heap.current_frame(), Some(f2));

    heap.teardown();
    assert!(counter.all_freed());
}

#[test]
fn test_every_kind_torn_down_without_collection() {
    let (mut heap, counter) = counted_heap();
    let frame = heap.new_frame().unwrap();

    let i = heap.new_integer(5).unwrap();
    let f = heap.new_float(0.25).unwrap();
    let s = heap.new_string("").unwrap();
    let arr = heap.new_array(0).unwrap();
    let full = heap.new_array(4).unwrap();
    heap.array_set(full, 3, s).unwrap();
    let vec = heap.new_vector3(i, f, arr).unwrap();
    for obj in [vec, full] {
        heap.frame_reference_object(frame, obj).unwrap();
    }

    let stats = counter.snapshot();
    // Six headers, one array block, one frame; empty buffers are not charged
    assert_eq!(stats.live_allocations, 8);

    heap.teardown();
    assert!(counter.all_freed());
    assert_eq!(heap.frame_count(), 0);
    assert_eq!(heap.object_count(), 0);
}

#[test]
fn test_collection_on_empty_heap() {
    let (mut heap, counter) = counted_heap();
    let stats = heap.collect_garbage().unwrap();
    assert_eq!(stats, Default::default());
    assert!(counter.all_freed());
}

#[test]
fn test_limit_allows_reuse_after_collection() {
    init_tracing();
    let counter = Arc::new(AllocCounter::new());
    let config = HeapConfig::default().with_memory_limit(snek_runtime::OBJECT_HEADER_BYTES * 2);
    let mut heap = Heap::with_counter(config, Arc::clone(&counter));

    heap.new_integer(1).unwrap();
    heap.new_integer(2).unwrap();
    assert!(matches!(
        heap.new_integer(3),
        Err(HeapError::AllocationFailed { .. })
    ));

    heap.collect_garbage().unwrap();
    let fresh: ObjRef = heap.new_integer(3).unwrap();
    assert_eq!(heap.as_integer(fresh), Some(3));
}
