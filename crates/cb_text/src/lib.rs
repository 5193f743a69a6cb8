//! String engine.
//!
//! - `StringRef` - immutable string, narrow (ASCII) or wide (UTF-16)
//! - `MutableString` - growable wide string edited in place
//! - `InlineBuffer` - windowed unit access for scanning loops
//! - `Encoding` - byte-stream conversion at the boundary
//! - `TextService` - case mapping, normalization and transforms
//! - `constant_string` / `cb_str!` - interned literals

#![allow(clippy::len_without_is_empty)]

pub mod buffer;
pub mod compare;
pub mod encoding;
pub mod inline_buffer;
pub mod intern;
pub mod mutable;
pub mod string;
pub mod unicode;

pub use compare::CompareOptions;
pub use encoding::{
    Conversion, Encoding, Units, code_point_to_surrogate_pair, is_high_surrogate,
    is_low_surrogate, surrogate_pair_to_code_point,
};
pub use inline_buffer::InlineBuffer;
pub use intern::constant_string;
pub use mutable::MutableString;
pub use string::{StringRef, show, show_str, string_type_id};
pub use unicode::{CaseOperation, NormalizationForm, TextService};
