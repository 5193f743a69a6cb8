//! URI engine.
//!
//! - `parse` - locate the twelve URL components in a string
//! - `resolve` - relative reference resolution and dot-segment removal
//! - `escape` - adding and replacing percent escapes
//! - `Url` - runtime object tying a string, its ranges and a base together

pub mod component;
pub mod escape;
pub mod parse;
pub mod resolve;
pub mod url;

pub use component::{Component, ComponentRanges};
pub use escape::{
    add_percent_escapes, replace_percent_escapes, replace_percent_escapes_using_encoding,
};
pub use parse::parse;
pub use resolve::remove_dot_segments;
pub use url::{Url, url_type_id};
