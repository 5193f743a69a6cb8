//! Uniquing table for string literals.
//!
//! Each distinct literal maps to exactly one immortal instance for the life
//! of the process, however many threads ask for it first.

use crate::string::StringRef;
use cb_core::Result;
use cb_core::collections::{FastHashMap, fast_map_new};
use std::sync::{OnceLock, PoisonError, RwLock};

static TABLE: OnceLock<RwLock<FastHashMap<&'static str, StringRef>>> = OnceLock::new();

fn table() -> &'static RwLock<FastHashMap<&'static str, StringRef>> {
    TABLE.get_or_init(|| RwLock::new(fast_map_new()))
}

/// The unique instance for `literal`. Fails only when the instance cannot
/// be allocated; nothing is inserted then, so a later call retries.
pub fn constant_string(literal: &'static str) -> Result<StringRef> {
    if let Some(found) = table()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(literal)
    {
        return Ok(found.clone());
    }
    let mut table = table().write().unwrap_or_else(PoisonError::into_inner);
    if let Some(found) = table.get(literal) {
        return Ok(found.clone());
    }
    let string = StringRef::immortal(literal).inspect_err(|err| {
        log::warn!("interning {literal:?} failed: {err}");
    })?;
    log::debug!("interned {literal:?}");
    table.insert(literal, string.clone());
    Ok(string)
}

pub fn interned_count() -> usize {
    table().read().unwrap_or_else(PoisonError::into_inner).len()
}

/// Interned string for a literal: `cb_str!("name")`.
#[macro_export]
macro_rules! cb_str {
    ($literal:expr) => {
        $crate::intern::constant_string($literal)
    };
}
