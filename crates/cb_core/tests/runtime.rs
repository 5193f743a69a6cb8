use cb_core::alloc::SystemAllocator;
use cb_core::runtime::{class_entry, create_immortal_instance, type_id_by_name};
use cb_core::{
    AllocHint, Allocator, AllocatorContext, ErrorKind, ForeignBridge, HashCode, IMMORTAL, Object,
    ObjectRef, RuntimeClass, create_instance, create_raw_instance, register_foreign_type,
    register_type,
};
use proptest::prelude::*;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Counters {
    allocations: AtomicUsize,
    deallocations: AtomicUsize,
}

struct CountingContext {
    counters: Arc<Counters>,
}

impl AllocatorContext for CountingContext {
    fn allocate(&self, size: usize, hint: AllocHint) -> Option<NonNull<u8>> {
        self.counters.allocations.fetch_add(1, Ordering::SeqCst);
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

static FINALIZED: AtomicUsize = AtomicUsize::new(0);

fn count_finalize(_: &Object) {
    FINALIZED.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn finalize_runs_once_on_last_release() {
    let type_id = register_type(RuntimeClass {
        finalize: Some(count_finalize),
        ..RuntimeClass::new("FinalizeFixture")
    });
    let (allocator, counters) = counting_allocator();
    let object = create_raw_instance(Some(&allocator), type_id, 24).unwrap();
    assert_eq!(object.retain_count(), 1);

    let second = object.clone();
    assert_eq!(object.retain_count(), 2);
    drop(object);
    assert_eq!(FINALIZED.load(Ordering::SeqCst), 0);
    assert_eq!(counters.deallocations.load(Ordering::SeqCst), 0);

    drop(second);
    assert_eq!(FINALIZED.load(Ordering::SeqCst), 1);
    assert_eq!(counters.allocations.load(Ordering::SeqCst), 1);
    assert_eq!(counters.deallocations.load(Ordering::SeqCst), 1);
}

#[test]
fn raw_instance_is_zero_filled() {
    let type_id = register_type(RuntimeClass::new("ZeroFixture"));
    let object = create_raw_instance(None, type_id, 37).unwrap();
    assert_eq!(object.inline_len(), 37);
    assert!(object.inline_bytes().iter().all(|b| *b == 0));
    assert_eq!(object.inline_ptr().as_ptr() as usize % 8, 0);
}

#[test]
fn unknown_type_fails_construction() {
    let err = create_raw_instance(None, cb_core::TypeId(u32::MAX), 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Construction);
}

#[test]
fn null_allocator_fails_construction() {
    let type_id = register_type(RuntimeClass::new("NullAllocFixture"));
    let err = create_raw_instance(Some(&Allocator::null()), type_id, 8).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Construction);
}

#[test]
fn payload_is_dropped_with_the_instance() {
    struct Fixture(Arc<AtomicUsize>);
    impl Drop for Fixture {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let type_id = register_type(RuntimeClass::new("DropFixture"));
    let drops = Arc::new(AtomicUsize::new(0));
    let object = create_instance(None, type_id, Fixture(drops.clone())).unwrap();
    assert!(object.payload::<Fixture>().is_some());
    assert!(object.payload::<u32>().is_none());
    drop(object);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn instance_records_its_allocator() {
    let type_id = register_type(RuntimeClass::new("AllocatorFixture"));
    let (allocator, _) = counting_allocator();
    let object = create_raw_instance(Some(&allocator), type_id, 0).unwrap();
    assert_eq!(object.allocator(), &allocator);
    assert_eq!(cb_core::runtime::allocator_of(&object).name(), "counting");
}

struct Number(i64);

fn number_equal(a: &Object, b: &Object) -> bool {
    match (a.payload::<Number>(), b.payload::<Number>()) {
        (Some(a), Some(b)) => a.0 == b.0,
        _ => false,
    }
}

fn number_hash(object: &Object) -> HashCode {
    object.payload::<Number>().map_or(0, |n| n.0 as HashCode)
}

fn number_describe(object: &Object) -> String {
    object
        .payload::<Number>()
        .map_or_else(String::new, |n| n.0.to_string())
}

fn number_copy(allocator: &Allocator, object: &Object) -> cb_core::Result<ObjectRef> {
    let value = object.payload::<Number>().map_or(0, |n| n.0);
    create_instance(Some(allocator), object.type_id(), Number(value))
}

fn number_type() -> cb_core::TypeId {
    static TYPE_ID: std::sync::OnceLock<cb_core::TypeId> = std::sync::OnceLock::new();
    *TYPE_ID.get_or_init(|| {
        register_type(RuntimeClass {
            equal: Some(number_equal),
            hash: Some(number_hash),
            describe: Some(number_describe),
            copy: Some(number_copy),
            ..RuntimeClass::new("Number")
        })
    })
}

#[test]
fn dispatch_uses_class_callbacks() {
    let a = create_instance(None, number_type(), Number(7)).unwrap();
    let b = create_instance(None, number_type(), Number(7)).unwrap();
    let c = create_instance(None, number_type(), Number(8)).unwrap();
    assert!(!ObjectRef::ptr_eq(&a, &b));
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.hash_code(), 7);
    assert_eq!(a.describe(), "7");
    assert_eq!(format!("{c}"), "8");

    let copy = a.copy(None).unwrap();
    assert_eq!(copy, a);
    assert!(!ObjectRef::ptr_eq(&copy, &a));
}

#[test]
fn different_types_are_never_equal() {
    let other = register_type(RuntimeClass {
        equal: Some(number_equal),
        ..RuntimeClass::new("OtherNumber")
    });
    let a = create_instance(None, number_type(), Number(1)).unwrap();
    let b = create_instance(None, other, Number(1)).unwrap();
    assert_ne!(a, b);
}

#[test]
fn defaults_without_callbacks() {
    let type_id = register_type(RuntimeClass::new("Plain"));
    let a = create_raw_instance(None, type_id, 0).unwrap();
    let b = create_raw_instance(None, type_id, 0).unwrap();
    assert_eq!(a, a.clone());
    assert_ne!(a, b);
    assert_eq!(a.hash_code(), a.clone().hash_code());
    assert!(a.describe().starts_with("<Plain 0x"));
    assert_eq!(a.copy(None).unwrap_err().kind(), ErrorKind::NotImplemented);
}

#[test]
fn registration_assigns_fresh_ids() {
    let a = register_type(RuntimeClass::new("FreshA"));
    let b = register_type(RuntimeClass::new("FreshB"));
    assert_ne!(a, b);
    assert_eq!(type_id_by_name("FreshA"), Some(a));
    assert_eq!(class_entry(b).map(|e| e.class().name), Some("FreshB"));
    assert!(class_entry(cb_core::TypeId::NOT_A_TYPE).is_none());
}

fn never_finalized(_: &Object) {
    panic!("immortal instance finalized");
}

fn never_hashed(_: &Object) -> HashCode {
    panic!("built-in hash used");
}

#[test]
fn immortal_instances_ignore_retain_and_release() {
    let type_id = register_type(RuntimeClass {
        finalize: Some(never_finalized),
        ..RuntimeClass::new("ImmortalFixture")
    });
    let object = create_immortal_instance(type_id, (), 4, |bytes| bytes.fill(9)).unwrap();
    for _ in 0..3 {
        drop(object.clone());
    }
    assert_eq!(object.retain_count(), IMMORTAL);
    assert!(object.is_immortal());
    assert_eq!(object.inline_bytes(), &[9, 9, 9, 9]);
}

#[test]
fn null_singleton_is_shared() {
    let a = cb_core::null::null().unwrap();
    let b = cb_core::null::null().unwrap();
    assert!(ObjectRef::ptr_eq(&a, &b));
    assert!(cb_core::null::is_null(&a));
    assert_eq!(a.describe(), "<null>");
}

#[test]
fn info_bits_round_trip() {
    let type_id = register_type(RuntimeClass::new("InfoFixture"));
    let object = create_raw_instance(None, type_id, 0).unwrap();
    object.set_info_bits(0b1010);
    object.clear_info_bits(0b0010);
    assert_eq!(object.info(), 0b1000);
}

#[derive(Default)]
struct BridgeLog {
    calls: Mutex<Vec<&'static str>>,
    count: AtomicUsize,
}

struct CountingBridge {
    log: Arc<BridgeLog>,
}

impl CountingBridge {
    fn note(&self, call: &'static str) {
        self.log.calls.lock().unwrap().push(call);
    }
}

impl ForeignBridge for CountingBridge {
    fn retain(&self, _object: &Object) {
        self.note("retain");
        self.log.count.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self, _object: &Object) -> bool {
        self.note("release");
        self.log.count.fetch_sub(1, Ordering::SeqCst) == 1
    }

    fn equal(&self, _a: &Object, _b: &Object) -> bool {
        self.note("equal");
        true
    }

    fn hash(&self, _object: &Object) -> HashCode {
        self.note("hash");
        42
    }

    fn copy(&self, _allocator: &Allocator, object: &Object) -> cb_core::Result<ObjectRef> {
        self.note("copy");
        Ok(object.retain())
    }

    fn describe(&self, _object: &Object) -> String {
        self.note("describe");
        "foreign".to_string()
    }
}

#[test]
fn foreign_types_route_through_the_bridge() {
    let log = Arc::new(BridgeLog::default());
    log.count.store(1, Ordering::SeqCst);
    let type_id = register_foreign_type(
        RuntimeClass {
            hash: Some(never_hashed),
            ..RuntimeClass::new("Foreign")
        },
        Arc::new(CountingBridge { log: log.clone() }),
    );
    let a = create_raw_instance(None, type_id, 0).unwrap();
    let plain = create_raw_instance(None, register_type(RuntimeClass::new("NotForeign")), 0)
        .unwrap();

    assert!(a.is_foreign());
    let b = a.clone();
    assert_eq!(a.hash_code(), 42);
    assert!(a.equal(&plain));
    assert_eq!(a.describe(), "foreign");
    let c = a.copy(None).unwrap();
    drop(c);
    drop(b);
    assert_eq!(log.count.load(Ordering::SeqCst), 1);
    drop(a);
    assert_eq!(log.count.load(Ordering::SeqCst), 0);

    let calls = log.calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        [
            "retain", "hash", "equal", "describe", "copy", "retain", "release", "release",
            "release"
        ]
    );
}

#[test]
fn retain_and_release_tolerate_null() {
    assert!(cb_core::runtime::retain(None).is_none());
    cb_core::runtime::release(None);
}

#[test]
fn shared_across_threads() {
    let type_id = register_type(RuntimeClass::new("ThreadFixture"));
    let (allocator, counters) = counting_allocator();
    let object = create_raw_instance(Some(&allocator), type_id, 0).unwrap();
    std::thread::scope(|scope| {
        for _ in 0..8 {
            let local = object.clone();
            scope.spawn(move || {
                for _ in 0..1000 {
                    drop(local.clone());
                }
            });
        }
    });
    assert_eq!(object.retain_count(), 1);
    drop(object);
    assert_eq!(counters.deallocations.load(Ordering::SeqCst), 1);
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]

    #[test]
    fn balanced_retains_leave_count_unchanged(n in 0usize..64) {
        let object = create_instance(None, number_type(), Number(n as i64)).unwrap();
        let handles: Vec<ObjectRef> = (0..n).map(|_| object.clone()).collect();
        prop_assert_eq!(object.retain_count(), n + 1);
        drop(handles);
        prop_assert_eq!(object.retain_count(), 1);
    }
}
