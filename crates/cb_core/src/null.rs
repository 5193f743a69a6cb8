//! The `Null` singleton, a placeholder object for "no value" in containers.

use crate::error::Result;
use crate::runtime::{Object, ObjectRef, RuntimeClass, TypeId, create_immortal_instance, register_type};
use std::sync::{Mutex, OnceLock, PoisonError};

#[cfg(test)]
static CREATED: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

pub struct Null;

fn describe_null(_: &Object) -> String {
    "<null>".to_string()
}

pub fn null_type_id() -> TypeId {
    static TYPE_ID: OnceLock<TypeId> = OnceLock::new();
    *TYPE_ID.get_or_init(|| {
        register_type(RuntimeClass {
            describe: Some(describe_null),
            ..RuntimeClass::new("Null")
        })
    })
}

/// The shared immortal `Null` instance.
pub fn null() -> Result<ObjectRef> {
    static NULL: OnceLock<ObjectRef> = OnceLock::new();
    static CREATING: Mutex<()> = Mutex::new(());
    if let Some(null) = NULL.get() {
        return Ok(null.clone());
    }
    let _creating = CREATING.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(null) = NULL.get() {
        return Ok(null.clone());
    }
    let null = create_immortal_instance(null_type_id(), Null, 0, |_| {})?;
    #[cfg(test)]
    CREATED.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    Ok(NULL.get_or_init(|| null).clone())
}

pub fn is_null(object: &Object) -> bool {
    object.is_a(null_type_id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn racing_first_use_creates_one_instance() {
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    null().unwrap()
                })
            })
            .collect();
        let nulls: Vec<ObjectRef> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for n in &nulls {
            assert!(ObjectRef::ptr_eq(n, &nulls[0]));
            assert!(is_null(n));
        }
        assert!(nulls[0].is_immortal());
        assert_eq!(CREATED.load(Ordering::Relaxed), 1);
    }
}
