//! Growable unit buffer whose memory comes from an [`Allocator`].

use cb_core::{AllocHint, Allocator};
use std::mem;
use std::ops::Range;
use std::ptr::{self, NonNull};
use std::slice;

/// A `Vec`-like run of `Copy` units owned through an allocator.
///
/// Capacity only changes when a caller asks for more room; it never shrinks.
pub struct UnitBuf<T: Copy> {
    ptr: NonNull<T>,
    len: usize,
    cap: usize,
    allocator: Allocator,
}

// SAFETY: the buffer exclusively owns its block.
unsafe impl<T: Copy + Send> Send for UnitBuf<T> {}
unsafe impl<T: Copy + Sync> Sync for UnitBuf<T> {}

impl<T: Copy> UnitBuf<T> {
    pub fn new(allocator: &Allocator) -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
            cap: 0,
            allocator: allocator.clone(),
        }
    }

    pub fn with_capacity(allocator: &Allocator, capacity: usize) -> Option<Self> {
        let mut buf = Self::new(allocator);
        buf.grow_exact(capacity).then_some(buf)
    }

    pub fn from_slice(allocator: &Allocator, units: &[T]) -> Option<Self> {
        let mut buf = Self::with_capacity(allocator, units.len())?;
        buf.extend_from_slice(units).then_some(buf)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    pub fn as_slice(&self) -> &[T] {
        // SAFETY: the first `len` units are initialized.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: the first `len` units are initialized and uniquely borrowed.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    fn bytes_for(units: usize) -> Option<usize> {
        units.checked_mul(mem::size_of::<T>())
    }

    /// Grow to exactly `capacity` units if currently smaller.
    ///
    /// Tries an in-place reallocation first, then allocate-copy-free. On
    /// failure the buffer is untouched.
    pub fn grow_exact(&mut self, capacity: usize) -> bool {
        if capacity <= self.cap {
            return true;
        }
        let Some(new_bytes) = Self::bytes_for(capacity) else {
            return false;
        };
        let old_bytes = self.cap * mem::size_of::<T>();
        let grown = if self.cap == 0 {
            self.allocator.allocate(new_bytes, AllocHint::CONTENTS)
        } else {
            let old = self.ptr.cast::<u8>();
            self.allocator
                .reallocate(old, old_bytes, new_bytes, AllocHint::CONTENTS)
                .or_else(|| {
                    let fresh = self.allocator.allocate(new_bytes, AllocHint::CONTENTS)?;
                    // SAFETY: both blocks hold at least `len` units and do not overlap.
                    unsafe {
                        ptr::copy_nonoverlapping(
                            self.ptr.as_ptr(),
                            fresh.as_ptr().cast::<T>(),
                            self.len,
                        )
                    };
                    self.allocator.deallocate(old, old_bytes);
                    Some(fresh)
                })
        };
        match grown {
            Some(block) => {
                self.ptr = block.cast();
                self.cap = capacity;
                true
            }
            None => {
                log::warn!(
                    "allocator `{}` could not grow a buffer to {capacity} units",
                    self.allocator.name()
                );
                false
            }
        }
    }

    /// Grow geometrically so repeated pushes stay amortized.
    fn reserve(&mut self, additional: usize) -> bool {
        let Some(needed) = self.len.checked_add(additional) else {
            return false;
        };
        if needed <= self.cap {
            return true;
        }
        self.grow_exact(needed.max(self.cap * 2).max(8))
    }

    pub fn push(&mut self, unit: T) -> bool {
        if !self.reserve(1) {
            return false;
        }
        // SAFETY: capacity exceeds len after reserve.
        unsafe { self.ptr.as_ptr().add(self.len).write(unit) };
        self.len += 1;
        true
    }

    pub fn extend_from_slice(&mut self, units: &[T]) -> bool {
        if !self.reserve(units.len()) {
            return false;
        }
        // SAFETY: room for `units.len()` more units was reserved.
        unsafe {
            ptr::copy_nonoverlapping(units.as_ptr(), self.ptr.as_ptr().add(self.len), units.len())
        };
        self.len += units.len();
        true
    }

    /// Replace `range` with `replacement`, growing to exactly the new length
    /// when needed. The tail moves in one block.
    pub fn splice(&mut self, range: Range<usize>, replacement: &[T]) -> bool {
        debug_assert!(range.start <= range.end && range.end <= self.len);
        let new_len = self.len - range.len() + replacement.len();
        if !self.grow_exact(new_len) {
            return false;
        }
        let base = self.ptr.as_ptr();
        // SAFETY: capacity covers `new_len`; `ptr::copy` handles the overlap of
        // the moved tail and `replacement` cannot alias our block.
        unsafe {
            ptr::copy(
                base.add(range.end),
                base.add(range.start + replacement.len()),
                self.len - range.end,
            );
            ptr::copy_nonoverlapping(replacement.as_ptr(), base.add(range.start), replacement.len());
        }
        self.len = new_len;
        true
    }

    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Give up ownership of the block: `(ptr, len, capacity, allocator)`.
    pub fn into_raw_parts(self) -> (NonNull<T>, usize, usize, Allocator) {
        let this = mem::ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the allocator is moved out once.
        let allocator = unsafe { ptr::read(&this.allocator) };
        (this.ptr, this.len, this.cap, allocator)
    }
}

impl<T: Copy> Drop for UnitBuf<T> {
    fn drop(&mut self) {
        if self.cap > 0 {
            self.allocator
                .deallocate(self.ptr.cast(), self.cap * mem::size_of::<T>());
        }
    }
}
