use cb_core::alloc::SystemAllocator;
use cb_core::runtime::ObjectRef;
use cb_core::{AllocHint, Allocator, AllocatorContext};
use cb_text::intern::interned_count;
use cb_text::{Encoding, StringRef, cb_str, constant_string};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn concurrent_interning_yields_one_instance() {
    let _ = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Debug)
        .init();

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                constant_string("raced literal").unwrap()
            })
        })
        .collect();
    let results: Vec<StringRef> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for result in &results {
        assert!(ObjectRef::ptr_eq(result.as_object(), results[0].as_object()));
    }
    assert!(results[0].as_object().is_immortal());
    assert_eq!(results[0], "raced literal");
}

#[test]
fn macro_and_function_agree() {
    let a = cb_str!("http").unwrap();
    let b = constant_string("http").unwrap();
    assert!(ObjectRef::ptr_eq(a.as_object(), b.as_object()));
    let wide = cb_str!("naïve").unwrap();
    assert!(wide.is_wide());
    assert_eq!(wide, "naïve");
    assert!(interned_count() >= 2);

    let before = a.as_object().retain_count();
    let extra = a.clone();
    drop(extra);
    assert_eq!(a.as_object().retain_count(), before);
}

#[test]
fn interning_propagates_with_question_mark() -> cb_core::Result<()> {
    let first = constant_string("fallible literal")?;
    let again = cb_str!("fallible literal")?;
    assert!(ObjectRef::ptr_eq(first.as_object(), again.as_object()));
    assert!(first.as_object().is_immortal());
    Ok(())
}

#[derive(Default)]
struct Counters {
    deallocations: AtomicUsize,
}

struct CountingContext {
    counters: Arc<Counters>,
}

impl AllocatorContext for CountingContext {
    fn allocate(&self, size: usize, hint: AllocHint) -> Option<NonNull<u8>> {
        SystemAllocator.allocate(size, hint)
    }

    fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
        hint: AllocHint,
    ) -> Option<NonNull<u8>> {
        SystemAllocator.reallocate(ptr, old_size, new_size, hint)
    }

    fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        self.counters.deallocations.fetch_add(1, Ordering::SeqCst);
        SystemAllocator.deallocate(ptr, size)
    }
}

fn counting_allocator() -> (Allocator, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let allocator = Allocator::create(
        "counting",
        CountingContext {
            counters: counters.clone(),
        },
    );
    (allocator, counters)
}

fn block_with(allocator: &Allocator, bytes: &[u8]) -> NonNull<u8> {
    let block = allocator.allocate(bytes.len(), AllocHint::CONTENTS).unwrap();
    // SAFETY: the block was just allocated with room for `bytes`.
    unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), block.as_ptr(), bytes.len()) };
    block
}

#[test]
fn no_copy_ascii_is_adopted_and_freed_once() {
    let (allocator, counting) = counting_allocator();
    let block = block_with(&allocator, b"adopted");
    // SAFETY: `block` holds 7 bytes from `allocator`.
    let string = unsafe {
        StringRef::with_bytes_no_copy(None, block, 7, Encoding::Ascii, false, Some(&allocator))
    }
    .unwrap();
    assert_eq!(string, "adopted");
    assert_eq!(string.narrow_contents().map(<[u8]>::as_ptr), Some(block.as_ptr().cast_const()));
    assert_eq!(counting.deallocations.load(Ordering::SeqCst), 0);
    drop(string);
    assert_eq!(counting.deallocations.load(Ordering::SeqCst), 1);
}

#[test]
fn no_copy_conversion_frees_the_source_immediately() {
    let (allocator, counting) = counting_allocator();
    let bytes = "déjà".as_bytes();
    let block = block_with(&allocator, bytes);
    // SAFETY: `block` holds `bytes.len()` bytes from `allocator`.
    let string = unsafe {
        StringRef::with_bytes_no_copy(None, block, bytes.len(), Encoding::Utf8, false, Some(&allocator))
    }
    .unwrap();
    assert_eq!(counting.deallocations.load(Ordering::SeqCst), 1);
    assert_eq!(string, "déjà");
    drop(string);
    assert_eq!(counting.deallocations.load(Ordering::SeqCst), 1);
}

#[test]
fn no_copy_with_null_deallocator_leaves_ownership_with_caller() {
    let bytes = b"borrowed".to_vec();
    let ptr = NonNull::new(bytes.as_ptr().cast_mut()).unwrap();
    // SAFETY: `bytes` outlives the string; the null allocator never frees.
    let string = unsafe {
        StringRef::with_bytes_no_copy(None, ptr, bytes.len(), Encoding::Ascii, false, Some(&Allocator::null()))
    }
    .unwrap();
    assert_eq!(string, "borrowed");
    drop(string);
    assert_eq!(&bytes, b"borrowed");
}
