//! Runtime object model.
//!
//! An instance is one allocator block laid out as an [`ObjectHeader`], a typed
//! payload, and an optional run of inline bytes. Behavior comes from the
//! [`RuntimeClass`] registered under the instance's [`TypeId`]; types registered
//! with a [`ForeignBridge`] route every operation through the bridge instead.
//!
//! [`ObjectRef`] is the owning handle: cloning retains, dropping releases. The
//! release that takes the count to zero runs the class finalizer, drops the
//! payload and returns the block to the allocator that produced it.

use crate::alloc::{ALLOC_ALIGN, AllocHint, Allocator};
use crate::collections::{FastHashMap, fast_map_new};
use crate::error::{Error, Result, messages};
use std::alloc::Layout;
use std::any::TypeId as PayloadTypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::ptr::{self, NonNull};
use std::slice;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering, fence};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

pub type HashCode = u64;

/// Retain count of instances that are never released.
pub const IMMORTAL: usize = usize::MAX;

const INLINE_ALIGN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    pub const NOT_A_TYPE: TypeId = TypeId(0);
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub type CopyFn = fn(&Allocator, &Object) -> Result<ObjectRef>;
pub type FinalizeFn = fn(&Object);
pub type EqualFn = fn(&Object, &Object) -> bool;
pub type HashFn = fn(&Object) -> HashCode;
pub type DescribeFn = fn(&Object) -> String;

/// Class descriptor. Every callback is optional.
#[derive(Clone, Copy)]
pub struct RuntimeClass {
    pub name: &'static str,
    pub copy: Option<CopyFn>,
    /// Runs once, before the payload is dropped and the block freed.
    pub finalize: Option<FinalizeFn>,
    /// Only called for two instances of the same type.
    pub equal: Option<EqualFn>,
    pub hash: Option<HashFn>,
    pub describe: Option<DescribeFn>,
}

impl RuntimeClass {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            copy: None,
            finalize: None,
            equal: None,
            hash: None,
            describe: None,
        }
    }
}

/// Hooks supplied by a foreign binding layer that owns the semantics of its
/// instances. When present they replace the built-in behavior entirely.
pub trait ForeignBridge: Send + Sync {
    fn retain(&self, object: &Object);

    /// Returns `true` when the runtime should destroy the instance now.
    fn release(&self, object: &Object) -> bool;

    fn equal(&self, a: &Object, b: &Object) -> bool;

    fn hash(&self, object: &Object) -> HashCode;

    fn copy(&self, allocator: &Allocator, object: &Object) -> Result<ObjectRef>;

    fn describe(&self, object: &Object) -> String;
}

pub struct ClassEntry {
    type_id: TypeId,
    class: RuntimeClass,
    bridge: Option<Arc<dyn ForeignBridge>>,
}

impl ClassEntry {
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn class(&self) -> &RuntimeClass {
        &self.class
    }

    pub fn is_foreign(&self) -> bool {
        self.bridge.is_some()
    }
}

struct TypeRegistry {
    entries: Vec<&'static ClassEntry>,
    by_name: FastHashMap<&'static str, TypeId>,
}

static REGISTRY: OnceLock<Mutex<TypeRegistry>> = OnceLock::new();

fn registry() -> MutexGuard<'static, TypeRegistry> {
    REGISTRY
        .get_or_init(|| {
            Mutex::new(TypeRegistry {
                entries: Vec::new(),
                by_name: fast_map_new(),
            })
        })
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

fn register(class: RuntimeClass, bridge: Option<Arc<dyn ForeignBridge>>) -> TypeId {
    let mut registry = registry();
    let type_id = TypeId(registry.entries.len() as u32 + 1);
    // Descriptors live for the rest of the process; headers point at them.
    let entry: &'static ClassEntry = Box::leak(Box::new(ClassEntry {
        type_id,
        class,
        bridge,
    }));
    registry.entries.push(entry);
    registry.by_name.insert(class.name, type_id);
    log::debug!(
        "registered type `{}` as {}{}",
        class.name,
        type_id,
        if entry.is_foreign() { " (foreign)" } else { "" }
    );
    type_id
}

/// Register a class and return its new, never reused id.
pub fn register_type(class: RuntimeClass) -> TypeId {
    register(class, None)
}

pub fn register_foreign_type(class: RuntimeClass, bridge: Arc<dyn ForeignBridge>) -> TypeId {
    register(class, Some(bridge))
}

pub fn class_entry(type_id: TypeId) -> Option<&'static ClassEntry> {
    let index = (type_id.0 as usize).checked_sub(1)?;
    registry().entries.get(index).copied()
}

/// Most recent type registered under `name`.
pub fn type_id_by_name(name: &str) -> Option<TypeId> {
    registry().by_name.get(name).copied()
}

pub fn registered_type_count() -> usize {
    registry().entries.len()
}

/// Common prefix of every instance block.
pub struct ObjectHeader {
    retain_count: AtomicUsize,
    info: AtomicU32,
    type_id: TypeId,
    entry: &'static ClassEntry,
    allocator: Allocator,
    block: NonNull<u8>,
    block_size: usize,
    payload_offset: usize,
    payload_type: PayloadTypeId,
    drop_payload: unsafe fn(*mut u8),
    inline_offset: usize,
    inline_len: usize,
}

/// A live instance. Only ever reached through an [`ObjectRef`] or a borrow of one.
#[repr(C)]
pub struct Object {
    header: ObjectHeader,
}

// SAFETY: payloads are required to be Send + Sync at creation and the header
// is only mutated through atomics.
unsafe impl Send for Object {}
unsafe impl Sync for Object {}

struct InstanceLayout {
    size: usize,
    payload_offset: usize,
    inline_offset: usize,
}

impl InstanceLayout {
    fn of<P>(inline_len: usize) -> Result<Self> {
        let overflow = |_| Error::construction(messages::SIZE_OVERFLOW);
        let (with_payload, payload_offset) = Layout::new::<ObjectHeader>()
            .extend(Layout::new::<P>())
            .map_err(overflow)?;
        let inline = Layout::from_size_align(inline_len, INLINE_ALIGN).map_err(overflow)?;
        let (block, inline_offset) = with_payload.extend(inline).map_err(overflow)?;
        if block.align() > ALLOC_ALIGN {
            return Err(Error::construction(messages::PAYLOAD_ALIGNMENT));
        }
        Ok(Self {
            size: block.pad_to_align().size(),
            payload_offset,
            inline_offset,
        })
    }
}

unsafe fn drop_payload<P>(payload: *mut u8) {
    // SAFETY: called once, on a payload written by `allocate_instance::<P>`.
    unsafe { ptr::drop_in_place(payload.cast::<P>()) }
}

fn allocate_instance<P: Send + Sync + 'static>(
    allocator: Allocator,
    type_id: TypeId,
    payload: P,
    inline_len: usize,
    retain_count: usize,
) -> Result<ObjectRef> {
    let entry = class_entry(type_id).ok_or_else(|| Error::construction(messages::UNKNOWN_TYPE))?;
    let layout = InstanceLayout::of::<P>(inline_len)?;
    let Some(block) = allocator.allocate_zeroed(layout.size, AllocHint::OBJECT) else {
        log::warn!(
            "allocator `{}` refused {} bytes for a `{}` instance",
            allocator.name(),
            layout.size,
            entry.class.name
        );
        return Err(Error::construction(messages::ALLOCATION_FAILED));
    };
    let header = ObjectHeader {
        retain_count: AtomicUsize::new(retain_count),
        info: AtomicU32::new(0),
        type_id,
        entry,
        allocator,
        block,
        block_size: layout.size,
        payload_offset: layout.payload_offset,
        payload_type: PayloadTypeId::of::<P>(),
        drop_payload: drop_payload::<P>,
        inline_offset: layout.inline_offset,
        inline_len,
    };
    // SAFETY: the block is large enough and suitably aligned for the header,
    // the payload at its offset, and the inline run after it.
    unsafe {
        ptr::write(block.as_ptr().cast::<ObjectHeader>(), header);
        ptr::write(block.as_ptr().add(layout.payload_offset).cast::<P>(), payload);
    }
    Ok(ObjectRef { ptr: block.cast() })
}

/// Create an instance with a typed payload and no inline bytes.
pub fn create_instance<P: Send + Sync + 'static>(
    allocator: Option<&Allocator>,
    type_id: TypeId,
    payload: P,
) -> Result<ObjectRef> {
    create_instance_with_inline(allocator, type_id, payload, 0, |_| {})
}

/// Create an instance whose block also carries `inline_len` bytes, zero-filled
/// and then handed to `init` before the instance becomes visible.
pub fn create_instance_with_inline<P, F>(
    allocator: Option<&Allocator>,
    type_id: TypeId,
    payload: P,
    inline_len: usize,
    init: F,
) -> Result<ObjectRef>
where
    P: Send + Sync + 'static,
    F: FnOnce(&mut [u8]),
{
    let object = allocate_instance(Allocator::resolve(allocator), type_id, payload, inline_len, 1)?;
    // SAFETY: nothing else can observe the instance yet.
    init(unsafe { object.inline_bytes_mut() });
    Ok(object)
}

/// Create an instance with no payload and `extra_bytes` zero-filled bytes.
pub fn create_raw_instance(
    allocator: Option<&Allocator>,
    type_id: TypeId,
    extra_bytes: usize,
) -> Result<ObjectRef> {
    create_instance_with_inline(allocator, type_id, (), extra_bytes, |_| {})
}

/// Create a process-lifetime instance: retain and release never touch it and
/// it is never finalized.
pub fn create_immortal_instance<P, F>(
    type_id: TypeId,
    payload: P,
    inline_len: usize,
    init: F,
) -> Result<ObjectRef>
where
    P: Send + Sync + 'static,
    F: FnOnce(&mut [u8]),
{
    let object = allocate_instance(Allocator::system(), type_id, payload, inline_len, IMMORTAL)?;
    // SAFETY: nothing else can observe the instance yet.
    init(unsafe { object.inline_bytes_mut() });
    Ok(object)
}

impl Object {
    fn bridge(&self) -> Option<&dyn ForeignBridge> {
        self.header.entry.bridge.as_deref()
    }

    pub fn type_id(&self) -> TypeId {
        self.header.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.header.entry.class.name
    }

    pub fn class(&self) -> &'static RuntimeClass {
        &self.header.entry.class
    }

    pub fn is_foreign(&self) -> bool {
        self.header.entry.is_foreign()
    }

    pub fn is_a(&self, type_id: TypeId) -> bool {
        self.header.type_id == type_id
    }

    /// Current count, or [`IMMORTAL`].
    pub fn retain_count(&self) -> usize {
        self.header.retain_count.load(Ordering::Relaxed)
    }

    pub fn is_immortal(&self) -> bool {
        self.retain_count() == IMMORTAL
    }

    /// The allocator that produced this instance's block.
    pub fn allocator(&self) -> &Allocator {
        &self.header.allocator
    }

    /// Type-specific flag bits.
    pub fn info(&self) -> u32 {
        self.header.info.load(Ordering::Acquire)
    }

    pub fn set_info_bits(&self, bits: u32) {
        self.header.info.fetch_or(bits, Ordering::AcqRel);
    }

    pub fn clear_info_bits(&self, bits: u32) {
        self.header.info.fetch_and(!bits, Ordering::AcqRel);
    }

    /// The payload, if it was created with type `P`.
    pub fn payload<P: 'static>(&self) -> Option<&P> {
        if self.header.payload_type != PayloadTypeId::of::<P>() {
            return None;
        }
        // SAFETY: the payload type matches and lives as long as the instance.
        Some(unsafe { &*self.header.block.as_ptr().add(self.header.payload_offset).cast::<P>() })
    }

    pub fn inline_len(&self) -> usize {
        self.header.inline_len
    }

    /// Start of the inline run, aligned to 8 bytes.
    pub fn inline_ptr(&self) -> NonNull<u8> {
        // SAFETY: the offset stays inside the block.
        unsafe { self.header.block.add(self.header.inline_offset) }
    }

    pub fn inline_bytes(&self) -> &[u8] {
        // SAFETY: the inline run is initialized (zero-filled at creation).
        unsafe { slice::from_raw_parts(self.inline_ptr().as_ptr(), self.header.inline_len) }
    }

    /// # Safety
    ///
    /// The caller must have exclusive access to the inline run for the
    /// lifetime of the returned slice.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn inline_bytes_mut(&self) -> &mut [u8] {
        // SAFETY: exclusivity is guaranteed by the caller.
        unsafe { slice::from_raw_parts_mut(self.inline_ptr().as_ptr(), self.header.inline_len) }
    }

    pub fn as_ptr(&self) -> *const Object {
        self as *const Object
    }

    /// New owning handle to this instance.
    pub fn retain(&self) -> ObjectRef {
        retain_object(self);
        ObjectRef {
            ptr: NonNull::from(self),
        }
    }

    pub fn equal(&self, other: &Object) -> bool {
        if ptr::eq(self, other) {
            return true;
        }
        if let Some(bridge) = self.bridge() {
            return bridge.equal(self, other);
        }
        if let Some(bridge) = other.bridge() {
            return bridge.equal(other, self);
        }
        if self.type_id() != other.type_id() {
            return false;
        }
        match self.class().equal {
            Some(equal) => equal(self, other),
            None => false,
        }
    }

    pub fn hash_code(&self) -> HashCode {
        if let Some(bridge) = self.bridge() {
            return bridge.hash(self);
        }
        match self.class().hash {
            Some(hash) => hash(self),
            None => (self.as_ptr() as usize >> 4) as HashCode,
        }
    }

    /// Copy into `allocator` (`None` = default allocator).
    pub fn copy(&self, allocator: Option<&Allocator>) -> Result<ObjectRef> {
        let allocator = Allocator::resolve(allocator);
        if let Some(bridge) = self.bridge() {
            return bridge.copy(&allocator, self);
        }
        match self.class().copy {
            Some(copy) => copy(&allocator, self),
            None => Err(Error::not_implemented(messages::COPY_UNSUPPORTED)),
        }
    }

    pub fn describe(&self) -> String {
        if let Some(bridge) = self.bridge() {
            return bridge.describe(self);
        }
        match self.class().describe {
            Some(describe) => describe(self),
            None => format!("<{} {:p}>", self.type_name(), self.as_ptr()),
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

fn retain_object(object: &Object) {
    if let Some(bridge) = object.bridge() {
        bridge.retain(object);
        return;
    }
    let count = &object.header.retain_count;
    if count.load(Ordering::Relaxed) == IMMORTAL {
        return;
    }
    count.fetch_add(1, Ordering::Relaxed);
}

/// # Safety
///
/// `ptr` must come from an owning handle that is being given up.
unsafe fn release_object(ptr: NonNull<Object>) {
    // SAFETY: the caller still holds one reference.
    let object = unsafe { ptr.as_ref() };
    if let Some(bridge) = object.bridge() {
        if bridge.release(object) {
            // SAFETY: the bridge reports the last reference is gone.
            unsafe { destroy(ptr) };
        }
        return;
    }
    let count = &object.header.retain_count;
    if count.load(Ordering::Relaxed) == IMMORTAL {
        return;
    }
    if count.fetch_sub(1, Ordering::Release) != 1 {
        return;
    }
    fence(Ordering::Acquire);
    // SAFETY: this was the last reference.
    unsafe { destroy(ptr) };
}

unsafe fn destroy(ptr: NonNull<Object>) {
    // SAFETY: no other reference exists; the block is valid until deallocated below.
    let object = unsafe { ptr.as_ref() };
    log::trace!("finalizing `{}` instance {:p}", object.type_name(), ptr);
    if let Some(finalize) = object.class().finalize {
        finalize(object);
    }
    // SAFETY: the header is moved out exactly once; the block is not touched
    // again after the payload drop except to hand it back to its allocator.
    let header = unsafe { ptr::read(&object.header) };
    unsafe { (header.drop_payload)(header.block.as_ptr().add(header.payload_offset)) };
    header.allocator.deallocate(header.block, header.block_size);
}

/// Owning handle to an instance.
pub struct ObjectRef {
    ptr: NonNull<Object>,
}

// SAFETY: see `Object`; the reference count is atomic.
unsafe impl Send for ObjectRef {}
unsafe impl Sync for ObjectRef {}

impl ObjectRef {
    pub fn as_object(&self) -> &Object {
        // SAFETY: the handle keeps the instance alive.
        unsafe { self.ptr.as_ref() }
    }

    pub fn ptr_eq(a: &ObjectRef, b: &ObjectRef) -> bool {
        a.ptr == b.ptr
    }

    /// Give up the handle without releasing.
    pub fn into_raw(self) -> NonNull<Object> {
        let ptr = self.ptr;
        std::mem::forget(self);
        ptr
    }

    /// # Safety
    ///
    /// `ptr` must come from [`ObjectRef::into_raw`] and not have been reclaimed.
    pub unsafe fn from_raw(ptr: NonNull<Object>) -> Self {
        Self { ptr }
    }
}

impl Deref for ObjectRef {
    type Target = Object;

    fn deref(&self) -> &Object {
        self.as_object()
    }
}

impl Clone for ObjectRef {
    fn clone(&self) -> Self {
        self.as_object().retain()
    }
}

impl Drop for ObjectRef {
    fn drop(&mut self) {
        // SAFETY: this handle owned one reference.
        unsafe { release_object(self.ptr) }
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.as_object().equal(other.as_object())
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_code());
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Null-tolerant retain.
pub fn retain(object: Option<&Object>) -> Option<ObjectRef> {
    object.map(Object::retain)
}

/// Null-tolerant release.
pub fn release(object: Option<ObjectRef>) {
    drop(object)
}

pub fn equal(a: &Object, b: &Object) -> bool {
    a.equal(b)
}

pub fn hash(object: &Object) -> HashCode {
    object.hash_code()
}

pub fn allocator_of(object: &Object) -> Allocator {
    object.allocator().clone()
}
