//! Allocator contexts and the process-wide default allocator.
//!
//! Every block the runtime hands out (instances, string contents, mutable
//! buffers) comes from an [`Allocator`]. An allocator is a shared handle over an
//! [`AllocatorContext`]; cloning it is a retain, dropping it a release.

use std::alloc::{self as std_alloc, Layout};
use std::borrow::Cow;
use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Alignment of every block handed out through an [`Allocator`].
pub const ALLOC_ALIGN: usize = 16;

/// Advisory allocation hint passed through to the context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AllocHint(pub u32);

impl AllocHint {
    pub const NONE: AllocHint = AllocHint(0);
    /// Block backs a runtime instance.
    pub const OBJECT: AllocHint = AllocHint(1);
    /// Block backs character contents.
    pub const CONTENTS: AllocHint = AllocHint(2);
}

/// The callbacks behind an allocator.
///
/// Blocks are always [`ALLOC_ALIGN`]-aligned. Sizes are passed back on
/// `reallocate` and `deallocate` so contexts need no per-block bookkeeping.
pub trait AllocatorContext: Send + Sync {
    fn allocate(&self, size: usize, hint: AllocHint) -> Option<NonNull<u8>>;

    /// Resize a block. `None` leaves the original block untouched and valid.
    fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
        hint: AllocHint,
    ) -> Option<NonNull<u8>>;

    fn deallocate(&self, ptr: NonNull<u8>, size: usize);

    fn preferred_size(&self, size: usize, _hint: AllocHint) -> usize {
        size
    }
}

fn block_layout(size: usize) -> Option<Layout> {
    Layout::from_size_align(size.max(1), ALLOC_ALIGN).ok()
}

/// Context backed by the global Rust allocator.
pub struct SystemAllocator;

impl AllocatorContext for SystemAllocator {
    fn allocate(&self, size: usize, _hint: AllocHint) -> Option<NonNull<u8>> {
        let layout = block_layout(size)?;
        // SAFETY: layout has a non-zero size.
        NonNull::new(unsafe { std_alloc::alloc(layout) })
    }

    fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
        _hint: AllocHint,
    ) -> Option<NonNull<u8>> {
        let layout = block_layout(old_size)?;
        block_layout(new_size)?;
        // SAFETY: ptr was produced by `allocate` with the same alignment and old size.
        NonNull::new(unsafe { std_alloc::realloc(ptr.as_ptr(), layout, new_size.max(1)) })
    }

    fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        if let Some(layout) = block_layout(size) {
            // SAFETY: ptr was produced by `allocate`/`reallocate` with this size.
            unsafe { std_alloc::dealloc(ptr.as_ptr(), layout) }
        }
    }
}

/// Context that never hands out memory and never frees any.
///
/// Used as a contents deallocator meaning "the caller keeps ownership".
pub struct NullAllocator;

impl AllocatorContext for NullAllocator {
    fn allocate(&self, _size: usize, _hint: AllocHint) -> Option<NonNull<u8>> {
        None
    }

    fn reallocate(
        &self,
        _ptr: NonNull<u8>,
        _old_size: usize,
        _new_size: usize,
        _hint: AllocHint,
    ) -> Option<NonNull<u8>> {
        None
    }

    fn deallocate(&self, _ptr: NonNull<u8>, _size: usize) {}
}

struct AllocatorInner {
    name: Cow<'static, str>,
    context: Box<dyn AllocatorContext>,
}

/// Shared handle to an allocator context.
#[derive(Clone)]
pub struct Allocator {
    inner: Arc<AllocatorInner>,
}

static SYSTEM: OnceLock<Allocator> = OnceLock::new();
static NULL: OnceLock<Allocator> = OnceLock::new();
static DEFAULT: OnceLock<RwLock<Allocator>> = OnceLock::new();

fn default_slot() -> &'static RwLock<Allocator> {
    DEFAULT.get_or_init(|| RwLock::new(Allocator::system()))
}

impl Allocator {
    pub fn create(
        name: impl Into<Cow<'static, str>>,
        context: impl AllocatorContext + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(AllocatorInner {
                name: name.into(),
                context: Box::new(context),
            }),
        }
    }

    pub fn system() -> Allocator {
        SYSTEM
            .get_or_init(|| Allocator::create("system", SystemAllocator))
            .clone()
    }

    pub fn null() -> Allocator {
        NULL.get_or_init(|| Allocator::create("null", NullAllocator))
            .clone()
    }

    /// The current process-wide default.
    pub fn default_allocator() -> Allocator {
        default_slot()
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap the process-wide default. The new allocator is retained and the
    /// previous one released once the slot no longer refers to it.
    ///
    /// Blocks already handed out keep their recorded allocator, so swapping
    /// never strands memory. Callers still serialize swaps against code that
    /// expects a stable default for the duration of a multi-step operation.
    pub fn set_default(allocator: &Allocator) {
        let previous = {
            let mut slot = default_slot()
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.ptr_eq(allocator) {
                return;
            }
            std::mem::replace(&mut *slot, allocator.clone())
        };
        log::debug!(
            "default allocator changed from `{}` to `{}`",
            previous.name(),
            allocator.name()
        );
        drop(previous);
    }

    /// `None` stands for "the default allocator".
    pub fn resolve(allocator: Option<&Allocator>) -> Allocator {
        match allocator {
            Some(a) => a.clone(),
            None => Allocator::default_allocator(),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn ptr_eq(&self, other: &Allocator) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_null(&self) -> bool {
        NULL.get().is_some_and(|null| null.ptr_eq(self))
    }

    /// Number of live handles to this allocator.
    pub fn retain_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn allocate(&self, size: usize, hint: AllocHint) -> Option<NonNull<u8>> {
        self.inner.context.allocate(size, hint)
    }

    pub fn allocate_zeroed(&self, size: usize, hint: AllocHint) -> Option<NonNull<u8>> {
        let ptr = self.allocate(size, hint)?;
        // SAFETY: the context returned a block of at least `size` bytes.
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) };
        Some(ptr)
    }

    pub fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
        hint: AllocHint,
    ) -> Option<NonNull<u8>> {
        self.inner.context.reallocate(ptr, old_size, new_size, hint)
    }

    pub fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        self.inner.context.deallocate(ptr, size)
    }

    pub fn preferred_size(&self, size: usize, hint: AllocHint) -> usize {
        self.inner.context.preferred_size(size, hint)
    }
}

impl PartialEq for Allocator {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Allocator {}

impl fmt::Debug for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Allocator `{}` {:p}>", self.name(), Arc::as_ptr(&self.inner))
    }
}
