//! Core object runtime.
//!
//! This crate contains the pieces every other crate builds on:
//! - `Allocator` - pluggable allocation contexts and the swappable default
//! - `Object` / `ObjectRef` - reference-counted instances with class dispatch
//! - `RuntimeConfig` - process-wide tunables
//! - `Error` - the shared error type

#![allow(clippy::new_without_default)]

pub mod alloc;
pub mod collections;
pub mod config;
pub mod error;
pub mod null;
pub mod range;
pub mod runtime;

pub use alloc::{AllocHint, Allocator, AllocatorContext};
pub use collections::{FastHashMap, fast_map_new, fast_map_with_capacity};
pub use config::{RuntimeConfig, config, configure};
pub use error::{Error, ErrorKind, Result};
pub use range::CharRange;
pub use runtime::{
    ForeignBridge, HashCode, IMMORTAL, Object, ObjectRef, RuntimeClass, TypeId, create_instance,
    create_instance_with_inline, create_raw_instance, register_foreign_type, register_type,
};
