use cb_core::alloc::SystemAllocator;
use cb_core::{Allocator, RuntimeClass, create_raw_instance, register_type};

#[test]
fn set_default_retains_new_and_releases_old() {
    let system = Allocator::default_allocator();
    assert_eq!(system, Allocator::system());

    let custom = Allocator::create("custom", SystemAllocator);
    assert_eq!(custom.retain_count(), 1);
    Allocator::set_default(&custom);
    assert_eq!(custom.retain_count(), 2);
    assert_eq!(Allocator::default_allocator(), custom);

    let type_id = register_type(RuntimeClass::new("DefaultFixture"));
    let object = create_raw_instance(None, type_id, 0).unwrap();
    assert_eq!(object.allocator(), &custom);

    // Setting the same allocator again is a no-op.
    Allocator::set_default(&custom);
    assert_eq!(custom.retain_count(), 3);

    Allocator::set_default(&system);
    // The slot let go; the instance still holds its allocator.
    assert_eq!(custom.retain_count(), 2);
    drop(object);
    assert_eq!(custom.retain_count(), 1);
    assert_eq!(Allocator::default_allocator(), Allocator::system());
}

#[test]
fn configuration_is_first_caller_wins() {
    let config = cb_core::RuntimeConfig {
        max_base_url_depth: 4,
        ..Default::default()
    };
    assert!(cb_core::configure(config));
    assert!(!cb_core::configure(cb_core::RuntimeConfig::default()));
    assert_eq!(cb_core::config().max_base_url_depth, 4);
    assert_eq!(cb_core::config().default_string_capacity, 16);
}
