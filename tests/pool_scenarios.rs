//! Integration coverage exercising the pool, array, and list through the
//! crate's public API: alignment, the large-allocation boundary,
//! cooperative array growth and relocation, list pointer stability,
//! cleanup ordering, and large-allocation slot reuse.

use std::ptr::NonNull;

use pool_arena::pool::FreeOutcome;
use pool_arena::{Array, List, Log, Pool};

#[test]
fn scenario_a_alignment() {
    let pool = Pool::create(4096, Log::default()).unwrap();
    let p1 = pool.palloc(1).unwrap();
    let p2 = pool.palloc(1).unwrap();
    assert_eq!(p2.as_ptr() as usize - p1.as_ptr() as usize, 16);
}

#[test]
fn scenario_b_large_path_boundary() {
    let pool = Pool::create(4096, Log::default()).unwrap();
    let max = pool.max();
    let small = pool.palloc(max).unwrap();
    let large = pool.palloc(max + 1).unwrap();

    // The large allocation is a separate system-allocator buffer, so it
    // cannot land inside the same 4096-byte block as `small`.
    assert!((large.as_ptr() as usize).abs_diff(small.as_ptr() as usize) > max);
    assert_eq!(pool.pfree(large), FreeOutcome::Freed);
}

#[test]
fn scenario_c_array_cooperative_growth() {
    let pool = Pool::create(4096, Log::default()).unwrap();
    let mut array: Array<'_, u32> = Array::create(&pool, 2).unwrap();
    array.push(10).unwrap();
    array.push(20).unwrap();
    let elts = array.as_slice().as_ptr();

    array.push(30).unwrap();
    assert_eq!(array.as_slice().as_ptr(), elts);

    array.push(40).unwrap();
    assert_eq!(array.as_slice().as_ptr(), elts);
    assert_eq!(array.as_slice(), &[10, 20, 30, 40]);
}

#[test]
fn scenario_d_array_relocation() {
    let pool = Pool::create(4096, Log::default()).unwrap();
    let mut array: Array<'_, u32> = Array::create(&pool, 2).unwrap();
    array.push(1).unwrap();
    array.push(2).unwrap();

    let _ = pool.palloc(4).unwrap();

    let elts = array.as_slice().as_ptr();
    array.push(3).unwrap();
    assert_ne!(array.as_slice().as_ptr(), elts);
    assert_eq!(array.as_slice(), &[1, 2, 3]);
}

#[test]
fn scenario_e_list_pointer_stability() {
    let pool = Pool::create(4096, Log::default()).unwrap();
    let list: List<'_, u32> = List::create(&pool, 2).unwrap();
    let mut pointers: Vec<NonNull<u32>> = Vec::new();
    for i in 0..5 {
        pointers.push(list.push(i).unwrap());
    }
    for (i, p) in pointers.iter().enumerate() {
        assert_eq!(unsafe { *p.as_ptr() }, i as u32);
    }
    assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn scenario_f_cleanup_lifo_order() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

    struct Recorder {
        label: &'static str,
        order: Rc<RefCell<Vec<&'static str>>>,
    }
    impl Drop for Recorder {
        fn drop(&mut self) {
            self.order.borrow_mut().push(self.label);
        }
    }

    let pool = Pool::create(4096, Log::default()).unwrap();
    pool.alloc_with_cleanup(Recorder {
        label: "A",
        order: order.clone(),
    });
    pool.alloc_with_cleanup(Recorder {
        label: "B",
        order: order.clone(),
    });
    pool.alloc_with_cleanup(Recorder {
        label: "C",
        order: order.clone(),
    });
    drop(pool);

    assert_eq!(*order.borrow(), vec!["C", "B", "A"]);
}

#[test]
fn scenario_g_pfree_reuses_slot() {
    // The node-count assertion (W reuses Y's freed slot rather than
    // appending a fourth node) lives in
    // `pool::tests::pfree_reuses_freed_large_slot`, which has access to
    // the private large list. This test covers the publicly observable
    // half: freeing and re-freeing behave as the Freed/Declined outcome
    // demands around a reused slot.
    let pool = Pool::create(4096, Log::default()).unwrap();
    let max = pool.max();
    let x = pool.palloc(max + 1).unwrap();
    let y = pool.palloc(max + 1).unwrap();
    let z = pool.palloc(max + 1).unwrap();

    assert_eq!(pool.pfree(y), FreeOutcome::Freed);
    assert_eq!(pool.pfree(y), FreeOutcome::Declined, "double free declines");

    let w = pool.palloc(max + 1).unwrap();
    assert_eq!(pool.pfree(x), FreeOutcome::Freed);
    assert_eq!(pool.pfree(z), FreeOutcome::Freed);
    assert_eq!(pool.pfree(w), FreeOutcome::Freed);
}

#[cfg(unix)]
#[test]
fn file_cleanup_helpers_close_and_delete_on_destroy() {
    use std::io::Write;
    use std::os::fd::IntoRawFd;

    use pool_arena::pool::{close_and_delete_file, FileCleanup};

    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    writeln!(tmp, "scratch").unwrap();
    let path = tmp.path().to_path_buf();
    let (file, path_holder) = tmp.keep().unwrap();
    assert_eq!(path_holder, path);

    let pool = Pool::create(4096, Log::default()).unwrap();
    let node = pool.cleanup_add(std::mem::size_of::<FileCleanup>()).unwrap();
    unsafe {
        let data = pool.cleanup_data(node) as *mut FileCleanup;
        data.write(FileCleanup {
            fd: file.into_raw_fd(),
            name: Some(path.clone()),
            log: Log::default(),
        });
        pool.cleanup_set_handler(node, close_and_delete_file);
    }

    assert!(path.exists());
    drop(pool);
    assert!(!path.exists());
}
