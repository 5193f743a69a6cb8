//! Percent escapes.

use crate::parse::{PERCENT, is_reserved, is_unreserved};
use cb_core::error::messages;
use cb_core::{Allocator, Error, Result};
use cb_text::encoding::{self, Units, code_point_at};
use cb_text::{Encoding, StringRef};
use smallvec::SmallVec;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

type CodePoints = SmallVec<[u32; 16]>;

fn code_points(set: Option<&StringRef>) -> CodePoints {
    set.map_or_else(CodePoints::new, |s| s.with_units(|u| u.code_points().collect()))
}

fn should_escape(c: u32, leave_unescaped: &[u32], to_escape: &[u32]) -> bool {
    if is_unreserved(c) || is_reserved(c) {
        return to_escape.contains(&c);
    }
    !leave_unescaped.contains(&c)
}

/// Bytes of one character in `encoding`; `None` if it has no representation.
fn encode_char(units: &[u16], encoding: Encoding) -> Option<SmallVec<[u8; 8]>> {
    let mut bytes = [0u8; 8];
    let done = encoding::encode(Units::Wide(units), encoding, None, false, Some(&mut bytes));
    (done.units == units.len()).then(|| SmallVec::from_slice(&bytes[..done.bytes]))
}

/// Escape every character of `string` that is neither unreserved nor
/// reserved, plus any reserved character listed in `to_escape`. Characters
/// in `leave_unescaped` are copied as they are. Each escaped character
/// becomes one `%XX` per byte of its `encoding` form.
pub fn add_percent_escapes(
    allocator: Option<&Allocator>,
    string: &StringRef,
    leave_unescaped: Option<&StringRef>,
    to_escape: Option<&StringRef>,
    encoding: Encoding,
) -> Result<StringRef> {
    let leave = code_points(leave_unescaped);
    let escape = code_points(to_escape);
    let units = string.to_utf16();
    let mut out: Vec<u16> = Vec::with_capacity(units.len() * 3);
    let mut i = 0;
    while let Some((c, width)) = code_point_at(Units::Wide(&units), i) {
        let character = &units[i..i + width];
        if should_escape(c, &leave, &escape) {
            let bytes = encode_char(character, encoding)
                .ok_or_else(|| Error::construction(messages::INVALID_ENCODING))?;
            for byte in bytes {
                out.push(PERCENT as u16);
                out.push(u16::from(HEX_DIGITS[usize::from(byte >> 4)]));
                out.push(u16::from(HEX_DIGITS[usize::from(byte & 0x0F)]));
            }
        } else {
            out.extend_from_slice(character);
        }
        i += width;
    }
    StringRef::with_characters(allocator, &out)
}

/// Decode escapes as UTF-8; see [`replace_percent_escapes_using_encoding`].
pub fn replace_percent_escapes(
    allocator: Option<&Allocator>,
    string: &StringRef,
    leave_escaped: Option<&StringRef>,
) -> Result<StringRef> {
    replace_percent_escapes_using_encoding(allocator, string, leave_escaped, Encoding::Utf8)
}

fn hex_value(unit: Option<&u16>) -> Option<u8> {
    let digit = char::from_u32(u32::from(*unit?))?.to_digit(16)?;
    u8::try_from(digit).ok()
}

/// Replace `%XX` escapes with the characters they encode. Consecutive
/// escapes are decoded together so multi-byte characters survive. Escapes
/// whose character appears in `leave_escaped` are kept verbatim; with no
/// `leave_escaped` at all nothing is replaced.
///
/// A `%` not followed by two hex digits is copied through unchanged. Fails
/// when a run of escapes decodes to bytes that are not valid in `encoding`.
pub fn replace_percent_escapes_using_encoding(
    allocator: Option<&Allocator>,
    string: &StringRef,
    leave_escaped: Option<&StringRef>,
    encoding: Encoding,
) -> Result<StringRef> {
    if leave_escaped.is_none() {
        return string.copy(allocator);
    }
    let leave = code_points(leave_escaped);
    let units = string.to_utf16();
    let mut out: Vec<u16> = Vec::with_capacity(units.len());
    let mut i = 0;
    while i < units.len() {
        if u32::from(units[i]) != PERCENT {
            out.push(units[i]);
            i += 1;
            continue;
        }
        let run_start = i;
        let mut bytes: SmallVec<[u8; 16]> = SmallVec::new();
        while units.get(i).is_some_and(|&u| u32::from(u) == PERCENT) {
            let (Some(high), Some(low)) = (hex_value(units.get(i + 1)), hex_value(units.get(i + 2)))
            else {
                break;
            };
            bytes.push((high << 4) | low);
            i += 3;
        }
        if bytes.is_empty() {
            // Not an escape; the `%` stays as written.
            out.push(units[i]);
            i += 1;
            continue;
        }
        let decoded = StringRef::with_bytes(None, &bytes, encoding, false)?.to_utf16();

        // Walk the decoded characters alongside the escapes they came from.
        let mut escaped_at = run_start;
        let mut j = 0;
        while let Some((c, width)) = code_point_at(Units::Wide(&decoded), j) {
            let character = &decoded[j..j + width];
            let escaped_len = encode_char(character, encoding).map_or(0, |b| b.len() * 3);
            let escaped_end = (escaped_at + escaped_len).min(i);
            if leave.contains(&c) {
                out.extend_from_slice(&units[escaped_at..escaped_end]);
            } else {
                out.extend_from_slice(character);
            }
            escaped_at = escaped_end;
            j += width;
        }
    }
    StringRef::with_characters(allocator, &out)
}
