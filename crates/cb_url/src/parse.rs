//! Component-range parser.
//!
//! ```text
//! URI           = scheme ":" hier-part [ "?" query ] [ "#" fragment ]
//! hier-part     = "//" authority path-abempty / path-absolute
//!               / path-rootless / path-empty
//! relative-ref  = "//" authority path-abempty / path-absolute
//!               / path-noscheme / path-empty
//! ```
//!
//! The parser only locates components; it never copies or decodes them.

use crate::component::{Component, ComponentRanges};
use cb_core::error::messages;
use cb_core::{Error, Result};
use cb_text::{InlineBuffer, StringRef};

pub(crate) const SLASH: u32 = '/' as u32;
pub(crate) const COLON: u32 = ':' as u32;
pub(crate) const QUESTION: u32 = '?' as u32;
pub(crate) const HASH: u32 = '#' as u32;
pub(crate) const AT: u32 = '@' as u32;
pub(crate) const PERCENT: u32 = '%' as u32;
const CLOSE_BRACKET: u32 = ']' as u32;

fn ascii(c: u32) -> Option<u8> {
    u8::try_from(c).ok().filter(u8::is_ascii)
}

/// Printable ASCII other than space.
pub fn is_legal(c: u32) -> bool {
    c > 0x20 && c < 0x7F
}

pub fn is_scheme_char(c: u32) -> bool {
    ascii(c).is_some_and(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'))
}

pub fn is_unreserved(c: u32) -> bool {
    ascii(c).is_some_and(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

pub fn is_gen_delim(c: u32) -> bool {
    ascii(c).is_some_and(|b| matches!(b, b':' | b'/' | b'?' | b'#' | b'[' | b']' | b'@'))
}

pub fn is_sub_delim(c: u32) -> bool {
    ascii(c).is_some_and(|b| {
        matches!(
            b,
            b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*' | b'+' | b',' | b';' | b'='
        )
    })
}

pub fn is_reserved(c: u32) -> bool {
    is_gen_delim(c) || is_sub_delim(c)
}

pub fn is_pchar(c: u32) -> bool {
    is_unreserved(c) || is_sub_delim(c) || matches!(c, PERCENT | COLON | AT)
}

fn is_query_char(c: u32) -> bool {
    is_pchar(c) || c == SLASH || c == QUESTION
}

fn invalid() -> Error {
    Error::construction(messages::INVALID_URL)
}

struct Scanner<'a> {
    buf: InlineBuffer<'a>,
}

impl Scanner<'_> {
    fn len(&self) -> usize {
        self.buf.len()
    }

    fn at(&mut self, index: usize) -> Option<u32> {
        self.buf.get(index).map(u32::from)
    }

    /// Advance from `from` until `stop` matches or the input ends. Any
    /// character on the way that `allowed` rejects fails the parse.
    fn scan(
        &mut self,
        from: usize,
        stop: impl Fn(u32) -> bool,
        allowed: impl Fn(u32) -> bool,
    ) -> Result<usize> {
        let mut i = from;
        while let Some(c) = self.at(i) {
            if stop(c) {
                break;
            }
            if !allowed(c) {
                return Err(invalid());
            }
            i += 1;
        }
        Ok(i)
    }

    fn find(&mut self, from: usize, to: usize, wanted: u32) -> Option<usize> {
        (from..to).find(|&i| self.at(i) == Some(wanted))
    }

    fn rfind(&mut self, from: usize, to: usize, wanted: u32) -> Option<usize> {
        (from..to).rev().find(|&i| self.at(i) == Some(wanted))
    }

    /// Index of the `:` ending a scheme, if the input starts with one.
    fn scheme_end(&mut self) -> Option<usize> {
        if !self.at(0).and_then(ascii).is_some_and(|b| b.is_ascii_alphabetic()) {
            return None;
        }
        let mut i = 1;
        while let Some(c) = self.at(i) {
            if c == COLON {
                return Some(i);
            }
            if !is_scheme_char(c) {
                return None;
            }
            i += 1;
        }
        None
    }

    /// Parse the authority starting at `start` (just past `//`); returns
    /// where it ends.
    fn authority(&mut self, start: usize, ranges: &mut ComponentRanges) -> Result<usize> {
        if start >= self.len() {
            return Err(invalid());
        }
        let end = self.scan(start, |c| matches!(c, SLASH | QUESTION | HASH), is_legal)?;
        ranges.set(Component::NetLocation, start..end);

        let mut host_start = start;
        if let Some(at) = self.rfind(start, end, AT) {
            ranges.set(Component::UserInfo, start..at);
            match self.find(start, at, COLON) {
                Some(colon) => {
                    ranges.set(Component::User, start..colon);
                    ranges.set(Component::Password, colon + 1..at);
                }
                None => ranges.set(Component::User, start..at),
            }
            host_start = at + 1;
        }

        // Walk back for the port separator; a `]` closes an IPv6 literal
        // whose colons belong to the host.
        let mut host_end = end;
        let mut i = end;
        while i > host_start {
            i -= 1;
            match self.at(i) {
                Some(COLON) => {
                    ranges.set(Component::Port, i..end);
                    host_end = i;
                    break;
                }
                Some(CLOSE_BRACKET) => break,
                _ => {}
            }
        }
        ranges.set(Component::Host, host_start..host_end);
        Ok(end)
    }
}

/// Locate every component of `string`. Fails on characters that may not
/// appear unescaped, and on a `//` with nothing after it.
pub fn parse(string: &StringRef) -> Result<ComponentRanges> {
    let mut scanner = Scanner {
        buf: InlineBuffer::whole(string),
    };
    let len = scanner.len();
    let mut ranges = ComponentRanges::default();

    let mut pos = match scanner.scheme_end() {
        Some(colon) => {
            ranges.set(Component::Scheme, 0..colon);
            colon + 1
        }
        None => 0,
    };
    if pos < len {
        ranges.set(Component::ResourceSpecifier, pos..len);
    }

    if scanner.at(pos) == Some(SLASH) && scanner.at(pos + 1) == Some(SLASH) {
        pos = scanner.authority(pos + 2, &mut ranges)?;
    }

    let path_end = scanner.scan(pos, |c| matches!(c, QUESTION | HASH), is_legal)?;
    if path_end > pos {
        ranges.set(Component::Path, pos..path_end);
    }
    pos = path_end;

    if scanner.at(pos) == Some(QUESTION) {
        let end = scanner.scan(pos + 1, |c| c == HASH, is_query_char)?;
        ranges.set(Component::Query, pos + 1..end);
        pos = end;
    }
    if scanner.at(pos) == Some(HASH) {
        let end = scanner.scan(pos + 1, |_| false, is_query_char)?;
        ranges.set(Component::Fragment, pos + 1..end);
    }
    Ok(ranges)
}
