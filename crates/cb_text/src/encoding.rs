//! Byte-stream encodings and conversion to and from the internal forms.
//!
//! Internally a string is either narrow (ASCII, one byte per unit) or wide
//! (UTF-16 in host order). Everything else is converted at the boundary.

use crate::buffer::UnitBuf;
use cb_core::error::messages;
use cb_core::{Allocator, Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Encoding {
    Ascii,
    IsoLatin1,
    Utf8,
    /// Host byte order; a byte order mark is honored and emitted for
    /// external representations.
    Utf16,
    Utf16Be,
    Utf16Le,
    /// Host byte order, same BOM rules as [`Encoding::Utf16`].
    Utf32,
    Utf32Be,
    Utf32Le,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    const HOST: ByteOrder = if cfg!(target_endian = "big") {
        ByteOrder::Big
    } else {
        ByteOrder::Little
    };
}

impl Encoding {
    pub const ALL: [Encoding; 9] = [
        Encoding::Ascii,
        Encoding::IsoLatin1,
        Encoding::Utf8,
        Encoding::Utf16,
        Encoding::Utf16Be,
        Encoding::Utf16Le,
        Encoding::Utf32,
        Encoding::Utf32Be,
        Encoding::Utf32Le,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Encoding::Ascii => "US-ASCII",
            Encoding::IsoLatin1 => "ISO-8859-1",
            Encoding::Utf8 => "UTF-8",
            Encoding::Utf16 => "UTF-16",
            Encoding::Utf16Be => "UTF-16BE",
            Encoding::Utf16Le => "UTF-16LE",
            Encoding::Utf32 => "UTF-32",
            Encoding::Utf32Be => "UTF-32BE",
            Encoding::Utf32Le => "UTF-32LE",
        }
    }

    /// Worst-case bytes for one UTF-16 code unit.
    pub fn max_bytes_per_unit(self) -> usize {
        match self {
            Encoding::Ascii | Encoding::IsoLatin1 => 1,
            Encoding::Utf8 => 3,
            Encoding::Utf16 | Encoding::Utf16Be | Encoding::Utf16Le => 2,
            Encoding::Utf32 | Encoding::Utf32Be | Encoding::Utf32Le => 4,
        }
    }

    /// ASCII bytes decode to themselves.
    pub fn is_ascii_superset(self) -> bool {
        matches!(self, Encoding::Ascii | Encoding::IsoLatin1 | Encoding::Utf8)
    }
}

/// Borrowed view of a string's contents in its internal form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Units<'a> {
    Narrow(&'a [u8]),
    Wide(&'a [u16]),
}

impl<'a> Units<'a> {
    pub fn len(&self) -> usize {
        match self {
            Units::Narrow(b) => b.len(),
            Units::Wide(w) => w.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_wide(&self) -> bool {
        matches!(self, Units::Wide(_))
    }

    pub fn unit_at(&self, index: usize) -> u16 {
        match self {
            Units::Narrow(b) => u16::from(b[index]),
            Units::Wide(w) => w[index],
        }
    }

    pub fn slice(&self, start: usize, end: usize) -> Units<'a> {
        match *self {
            Units::Narrow(b) => Units::Narrow(&b[start..end]),
            Units::Wide(w) => Units::Wide(&w[start..end]),
        }
    }

    pub fn copy_into(&self, out: &mut [u16]) {
        match self {
            Units::Narrow(b) => {
                for (dst, src) in out.iter_mut().zip(b.iter()) {
                    *dst = u16::from(*src);
                }
            }
            Units::Wide(w) => out[..w.len()].copy_from_slice(w),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + 'a {
        let units = *self;
        (0..units.len()).map(move |i| units.unit_at(i))
    }

    pub fn code_points(&self) -> CodePoints<'a> {
        CodePoints {
            units: *self,
            index: 0,
        }
    }
}

/// Decodes surrogate pairs; a lone surrogate comes through as its own value.
pub struct CodePoints<'a> {
    units: Units<'a>,
    index: usize,
}

impl Iterator for CodePoints<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let (code_point, width) = code_point_at(self.units, self.index)?;
        self.index += width;
        Some(code_point)
    }
}

/// Code point starting at `index` and how many units it spans.
pub fn code_point_at(units: Units<'_>, index: usize) -> Option<(u32, usize)> {
    if index >= units.len() {
        return None;
    }
    let unit = units.unit_at(index);
    if is_high_surrogate(unit) && index + 1 < units.len() {
        let low = units.unit_at(index + 1);
        if is_low_surrogate(low) {
            return Some((surrogate_pair_to_code_point(unit, low), 2));
        }
    }
    Some((u32::from(unit), 1))
}

pub fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..=0xDBFF).contains(&unit)
}

pub fn is_low_surrogate(unit: u16) -> bool {
    (0xDC00..=0xDFFF).contains(&unit)
}

pub fn surrogate_pair_to_code_point(high: u16, low: u16) -> u32 {
    ((u32::from(high) - 0xD800) << 10) + (u32::from(low) - 0xDC00) + 0x10000
}

/// Split a supplementary code point into a surrogate pair.
pub fn code_point_to_surrogate_pair(code_point: u32) -> Option<(u16, u16)> {
    if !(0x10000..=0x10FFFF).contains(&code_point) {
        return None;
    }
    let offset = code_point - 0x10000;
    Some(((0xD800 + (offset >> 10)) as u16, (0xDC00 + (offset & 0x3FF)) as u16))
}

/// Result of [`decode`].
pub enum Decoded<'a> {
    /// Input was already ASCII; nothing was allocated.
    Borrowed(&'a [u8]),
    /// Converted to ASCII units, NUL-terminated past `len`.
    Narrow(UnitBuf<u8>),
    Wide(UnitBuf<u16>),
}

fn invalid() -> Error {
    Error::construction(messages::INVALID_ENCODING)
}

fn oom() -> Error {
    Error::construction(messages::ALLOCATION_FAILED)
}

/// Decode `bytes` into the internal form, preferring narrow when every
/// unit is ASCII. External representations may carry a byte order mark.
pub fn decode<'a>(
    allocator: &Allocator,
    bytes: &'a [u8],
    encoding: Encoding,
    external: bool,
) -> Result<Decoded<'a>> {
    match encoding {
        Encoding::Ascii => {
            if bytes.is_ascii() {
                Ok(Decoded::Borrowed(bytes))
            } else {
                Err(invalid())
            }
        }
        Encoding::IsoLatin1 => {
            if bytes.is_ascii() {
                return Ok(Decoded::Borrowed(bytes));
            }
            let mut wide = UnitBuf::with_capacity(allocator, bytes.len()).ok_or_else(oom)?;
            for &b in bytes {
                wide.push(u16::from(b));
            }
            Ok(Decoded::Wide(wide))
        }
        Encoding::Utf8 => {
            let bytes = match bytes {
                [0xEF, 0xBB, 0xBF, rest @ ..] if external => rest,
                _ => bytes,
            };
            if bytes.is_ascii() {
                return Ok(Decoded::Borrowed(bytes));
            }
            let text = std::str::from_utf8(bytes).map_err(|_| invalid())?;
            let mut wide = UnitBuf::with_capacity(allocator, bytes.len()).ok_or_else(oom)?;
            for unit in text.encode_utf16() {
                if !wide.push(unit) {
                    return Err(oom());
                }
            }
            Ok(Decoded::Wide(wide))
        }
        Encoding::Utf16 | Encoding::Utf16Be | Encoding::Utf16Le => {
            if bytes.len() % 2 != 0 {
                return Err(invalid());
            }
            let (order, body) = detect_order(bytes, encoding, external, &[0xFE, 0xFF]);
            let units = body.chunks_exact(2).map(|pair| {
                let pair = [pair[0], pair[1]];
                match order {
                    ByteOrder::Big => u16::from_be_bytes(pair),
                    ByteOrder::Little => u16::from_le_bytes(pair),
                }
            });
            collect_units(allocator, units, body.len() / 2)
        }
        Encoding::Utf32 | Encoding::Utf32Be | Encoding::Utf32Le => {
            if bytes.len() % 4 != 0 {
                return Err(invalid());
            }
            let (order, body) = detect_order(bytes, encoding, external, &[0x00, 0x00, 0xFE, 0xFF]);
            let mut units = Vec::with_capacity(body.len() / 4);
            for quad in body.chunks_exact(4) {
                let quad = [quad[0], quad[1], quad[2], quad[3]];
                let value = match order {
                    ByteOrder::Big => u32::from_be_bytes(quad),
                    ByteOrder::Little => u32::from_le_bytes(quad),
                };
                let c = char::from_u32(value).ok_or_else(invalid)?;
                let mut pair = [0u16; 2];
                units.extend_from_slice(c.encode_utf16(&mut pair));
            }
            let count = units.len();
            collect_units(allocator, units.into_iter(), count)
        }
    }
}

/// Pick the byte order and strip a leading BOM. `bom_be` is the big-endian mark.
fn detect_order<'a>(
    bytes: &'a [u8],
    encoding: Encoding,
    external: bool,
    bom_be: &[u8],
) -> (ByteOrder, &'a [u8]) {
    match encoding {
        Encoding::Utf16Be | Encoding::Utf32Be => return (ByteOrder::Big, bytes),
        Encoding::Utf16Le | Encoding::Utf32Le => return (ByteOrder::Little, bytes),
        _ => {}
    }
    if !external {
        return (ByteOrder::HOST, bytes);
    }
    let bom_le: Vec<u8> = bom_be.iter().rev().copied().collect();
    if bytes.starts_with(bom_be) {
        (ByteOrder::Big, &bytes[bom_be.len()..])
    } else if bytes.starts_with(&bom_le) {
        (ByteOrder::Little, &bytes[bom_le.len()..])
    } else {
        // Unmarked external UTF-16/32 is big-endian.
        (ByteOrder::Big, bytes)
    }
}

fn collect_units(
    allocator: &Allocator,
    units: impl Iterator<Item = u16> + Clone,
    count: usize,
) -> Result<Decoded<'static>> {
    if units.clone().all(|u| u < 0x80) {
        let mut narrow = UnitBuf::with_capacity(allocator, count + 1).ok_or_else(oom)?;
        for unit in units {
            narrow.push(unit as u8);
        }
        narrow.push(0);
        narrow.truncate(count);
        return Ok(Decoded::Narrow(narrow));
    }
    let mut wide = UnitBuf::with_capacity(allocator, count).ok_or_else(oom)?;
    for unit in units {
        wide.push(unit);
    }
    Ok(Decoded::Wide(wide))
}

/// Outcome of [`encode`]: how many units were consumed and bytes produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Conversion {
    pub units: usize,
    pub bytes: usize,
}

fn encode_code_point(code_point: u32, width: usize, encoding: Encoding, out: &mut [u8; 4]) -> Option<usize> {
    let scalar = char::from_u32(code_point);
    match encoding {
        Encoding::Ascii => (code_point < 0x80).then(|| {
            out[0] = code_point as u8;
            1
        }),
        Encoding::IsoLatin1 => (code_point < 0x100).then(|| {
            out[0] = code_point as u8;
            1
        }),
        Encoding::Utf8 => scalar.map(|c| c.encode_utf8(out).len()),
        Encoding::Utf16 | Encoding::Utf16Be | Encoding::Utf16Le => {
            let order = match encoding {
                Encoding::Utf16Be => ByteOrder::Big,
                Encoding::Utf16Le => ByteOrder::Little,
                _ => ByteOrder::HOST,
            };
            let mut units = [0u16; 2];
            let units: &[u16] = match scalar {
                Some(c) => c.encode_utf16(&mut units),
                // Lone surrogate: UTF-16 carries it through unchanged.
                None if width == 1 => {
                    units[0] = code_point as u16;
                    &units[..1]
                }
                None => return None,
            };
            for (i, unit) in units.iter().enumerate() {
                let bytes = match order {
                    ByteOrder::Big => unit.to_be_bytes(),
                    ByteOrder::Little => unit.to_le_bytes(),
                };
                out[i * 2..i * 2 + 2].copy_from_slice(&bytes);
            }
            Some(units.len() * 2)
        }
        Encoding::Utf32 | Encoding::Utf32Be | Encoding::Utf32Le => {
            let value = u32::from(scalar?);
            *out = match encoding {
                Encoding::Utf32Be => value.to_be_bytes(),
                Encoding::Utf32Le => value.to_le_bytes(),
                _ => value.to_ne_bytes(),
            };
            Some(4)
        }
    }
}

fn byte_order_mark(encoding: Encoding) -> &'static [u8] {
    match (encoding, ByteOrder::HOST) {
        (Encoding::Utf16, ByteOrder::Big) => &[0xFE, 0xFF],
        (Encoding::Utf16, ByteOrder::Little) => &[0xFF, 0xFE],
        (Encoding::Utf32, ByteOrder::Big) => &[0x00, 0x00, 0xFE, 0xFF],
        (Encoding::Utf32, ByteOrder::Little) => &[0xFF, 0xFE, 0x00, 0x00],
        _ => &[],
    }
}

/// Encode `units` into `encoding`.
///
/// Unrepresentable characters become `loss_byte`, or stop the conversion when
/// it is `None`. With `out = None` only the sizes are computed; otherwise
/// conversion stops when the next character does not fit.
pub fn encode(
    units: Units<'_>,
    encoding: Encoding,
    loss_byte: Option<u8>,
    external: bool,
    mut out: Option<&mut [u8]>,
) -> Conversion {
    let mut done = Conversion::default();
    let limit = out.as_ref().map_or(usize::MAX, |o| o.len());

    if external {
        let bom = byte_order_mark(encoding);
        if bom.len() > limit {
            return done;
        }
        if let Some(out) = out.as_deref_mut() {
            out[..bom.len()].copy_from_slice(bom);
        }
        done.bytes = bom.len();
    }

    let mut scratch = [0u8; 4];
    while let Some((code_point, width)) = code_point_at(units, done.units) {
        let written = match encode_code_point(code_point, width, encoding, &mut scratch) {
            Some(n) => n,
            None => match loss_byte {
                Some(loss) => {
                    scratch[0] = loss;
                    1
                }
                None => break,
            },
        };
        if done.bytes + written > limit {
            break;
        }
        if let Some(out) = out.as_deref_mut() {
            out[done.bytes..done.bytes + written].copy_from_slice(&scratch[..written]);
        }
        done.bytes += written;
        done.units += width;
    }
    done
}
