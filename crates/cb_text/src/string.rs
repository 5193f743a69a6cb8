//! Immutable strings.
//!
//! A string instance holds either narrow ASCII units or wide UTF-16 units.
//! Immutable contents are inlined into the instance block when they are
//! copied in, or adopted from an external buffer that is handed back to its
//! deallocator when the instance dies. Mutable strings (see
//! [`crate::mutable`]) share the type id and always hold wide units.

use crate::buffer::UnitBuf;
use crate::compare::{self, CompareOptions};
use crate::encoding::{self, Conversion, Decoded, Encoding, Units};
use crate::mutable::MutableString;
use cb_core::error::{messages, report_ignored};
use cb_core::runtime::{
    HashCode, Object, ObjectRef, RuntimeClass, TypeId, create_immortal_instance, create_instance,
    create_instance_with_inline, register_type,
};
use cb_core::{Allocator, CharRange, Error, Result};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::ffi::CStr;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;
use std::slice;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{OnceLock, PoisonError, RwLock};

/// Instance info bits.
pub mod flags {
    pub const MUTABLE: u32 = 1;
    pub const WIDE: u32 = 2;
    pub const OWNED: u32 = 4;
    pub const INLINE: u32 = 8;
    pub const HAS_LENGTH_BYTE: u32 = 16;
    pub const HAS_NUL_BYTE: u32 = 32;
}

pub const EMPTY_STRING_HASH: HashCode = 0x0FFF_FFFE;

pub(crate) type UnitVec = SmallVec<[u16; 64]>;

pub(crate) enum Contents {
    Inline,
    /// Returned to `deallocator` when the instance is destroyed.
    Owned {
        ptr: NonNull<u8>,
        bytes: usize,
        deallocator: Allocator,
    },
    Static(&'static [u8]),
}

// SAFETY: owned contents are never written after construction.
unsafe impl Send for Contents {}
unsafe impl Sync for Contents {}

impl Drop for Contents {
    fn drop(&mut self) {
        if let Contents::Owned {
            ptr,
            bytes,
            deallocator,
        } = self
        {
            deallocator.deallocate(*ptr, *bytes);
        }
    }
}

pub(crate) enum Storage {
    Immutable {
        contents: Contents,
        len: usize,
        wide: bool,
    },
    Mutable(RwLock<UnitBuf<u16>>),
}

pub(crate) struct StringPayload {
    pub(crate) storage: Storage,
    /// Memoized hash; zero means not computed.
    pub(crate) hash: AtomicU64,
}

impl StringPayload {
    fn immutable(contents: Contents, len: usize, wide: bool) -> Self {
        Self {
            storage: Storage::Immutable {
                contents,
                len,
                wide,
            },
            hash: AtomicU64::new(0),
        }
    }

    pub(crate) fn mutable(buf: UnitBuf<u16>) -> Self {
        Self {
            storage: Storage::Mutable(RwLock::new(buf)),
            hash: AtomicU64::new(0),
        }
    }
}

/// Units of an immutable string, borrowed for as long as the instance.
fn immutable_units<'a>(object: &'a Object, payload: &'a StringPayload) -> Option<Units<'a>> {
    let Storage::Immutable {
        contents,
        len,
        wide,
    } = &payload.storage
    else {
        return None;
    };
    let base: *const u8 = match contents {
        Contents::Inline => object.inline_ptr().as_ptr(),
        Contents::Owned { ptr, .. } => ptr.as_ptr(),
        Contents::Static(bytes) => bytes.as_ptr(),
    };
    // SAFETY: contents hold `len` units of the recorded width, are suitably
    // aligned and never change for the life of the instance.
    Some(unsafe {
        if *wide {
            Units::Wide(slice::from_raw_parts(base.cast::<u16>(), *len))
        } else {
            Units::Narrow(slice::from_raw_parts(base, *len))
        }
    })
}

#[cfg(test)]
thread_local! {
    static HASH_PASSES: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

pub(crate) fn compute_hash(units: Units<'_>) -> HashCode {
    #[cfg(test)]
    HASH_PASSES.with(|passes| passes.set(passes.get() + 1));
    if units.is_empty() {
        return EMPTY_STRING_HASH;
    }
    let mut hash: u32 = 0;
    for code_point in units.code_points() {
        hash = hash.wrapping_mul(33).wrapping_add(code_point);
    }
    match hash & 0x0FFF_FFFF {
        0 => 0x0FFF_FFFF,
        h => HashCode::from(h),
    }
}

fn string_equal(a: &Object, b: &Object) -> bool {
    match (StringRef::borrow(a), StringRef::borrow(b)) {
        (Some(a), Some(b)) => a.equals(&b),
        _ => false,
    }
}

fn string_hash(object: &Object) -> HashCode {
    StringRef::borrow(object).map_or(0, |s| s.hash_code())
}

fn string_copy(allocator: &Allocator, object: &Object) -> Result<ObjectRef> {
    let source =
        StringRef::borrow(object).ok_or_else(|| Error::construction(messages::UNKNOWN_TYPE))?;
    source.copy(Some(allocator)).map(StringRef::into_object)
}

fn string_describe(object: &Object) -> String {
    StringRef::borrow(object).map_or_else(String::new, |s| s.to_string())
}

pub fn string_type_id() -> TypeId {
    static TYPE_ID: OnceLock<TypeId> = OnceLock::new();
    *TYPE_ID.get_or_init(|| {
        register_type(RuntimeClass {
            copy: Some(string_copy),
            equal: Some(string_equal),
            hash: Some(string_hash),
            describe: Some(string_describe),
            ..RuntimeClass::new("String")
        })
    })
}

/// Owning handle to a string instance, mutable or not.
#[derive(Clone)]
pub struct StringRef(pub(crate) ObjectRef);

impl StringRef {
    pub fn from_object(object: ObjectRef) -> Option<StringRef> {
        object
            .is_a(string_type_id())
            .then_some(StringRef(object))
    }

    /// Retain `object` as a string if it is one.
    pub fn borrow(object: &Object) -> Option<StringRef> {
        object
            .is_a(string_type_id())
            .then(|| StringRef(object.retain()))
    }

    pub fn as_object(&self) -> &ObjectRef {
        &self.0
    }

    pub fn into_object(self) -> ObjectRef {
        self.0
    }

    pub(crate) fn payload(&self) -> &StringPayload {
        match self.0.payload::<StringPayload>() {
            Some(payload) => payload,
            None => unreachable!("string handle without a string payload"),
        }
    }

    fn from_inline(allocator: Option<&Allocator>, units: Units<'_>) -> Result<StringRef> {
        let (len, wide, inline_len, info) = match units {
            Units::Narrow(b) => (b.len(), false, b.len() + 1, flags::INLINE | flags::HAS_NUL_BYTE),
            Units::Wide(w) => (w.len(), true, w.len() * 2, flags::INLINE | flags::WIDE),
        };
        let object = create_instance_with_inline(
            allocator,
            string_type_id(),
            StringPayload::immutable(Contents::Inline, len, wide),
            inline_len,
            |bytes| match units {
                Units::Narrow(b) => bytes[..b.len()].copy_from_slice(b),
                Units::Wide(w) => {
                    for (chunk, unit) in bytes.chunks_exact_mut(2).zip(w) {
                        chunk.copy_from_slice(&unit.to_ne_bytes());
                    }
                }
            },
        )?;
        object.set_info_bits(info);
        Ok(StringRef(object))
    }

    fn from_owned(
        allocator: Option<&Allocator>,
        contents: Contents,
        len: usize,
        wide: bool,
        info: u32,
    ) -> Result<StringRef> {
        let object = create_instance(
            allocator,
            string_type_id(),
            StringPayload::immutable(contents, len, wide),
        )?;
        object.set_info_bits(info | if wide { flags::WIDE } else { 0 });
        Ok(StringRef(object))
    }

    fn adopt(allocator: Option<&Allocator>, decoded: Decoded<'_>) -> Result<StringRef> {
        match decoded {
            Decoded::Borrowed(bytes) => Self::from_inline(allocator, Units::Narrow(bytes)),
            Decoded::Narrow(buf) => {
                let (ptr, len, cap, deallocator) = buf.into_raw_parts();
                let contents = Contents::Owned {
                    ptr,
                    bytes: cap,
                    deallocator,
                };
                Self::from_owned(allocator, contents, len, false, flags::OWNED | flags::HAS_NUL_BYTE)
            }
            Decoded::Wide(buf) => {
                let (ptr, len, cap, deallocator) = buf.into_raw_parts();
                let contents = Contents::Owned {
                    ptr: ptr.cast(),
                    bytes: cap * 2,
                    deallocator,
                };
                Self::from_owned(allocator, contents, len, true, flags::OWNED)
            }
        }
    }

    /// Narrow when every unit is ASCII, wide otherwise; contents are inlined.
    pub fn with_characters(allocator: Option<&Allocator>, chars: &[u16]) -> Result<StringRef> {
        if chars.iter().all(|&c| c < 0x80) {
            let narrow: SmallVec<[u8; 64]> = chars.iter().map(|&c| c as u8).collect();
            return Self::from_inline(allocator, Units::Narrow(&narrow));
        }
        Self::from_inline(allocator, Units::Wide(chars))
    }

    pub fn with_str(allocator: Option<&Allocator>, s: &str) -> Result<StringRef> {
        if s.is_ascii() {
            return Self::from_inline(allocator, Units::Narrow(s.as_bytes()));
        }
        let wide: UnitVec = s.encode_utf16().collect();
        Self::from_inline(allocator, Units::Wide(&wide))
    }

    /// Decode `bytes`. Content is inlined when the input needed no
    /// conversion; otherwise the decoder's buffer is adopted.
    pub fn with_bytes(
        allocator: Option<&Allocator>,
        bytes: &[u8],
        encoding: Encoding,
        external: bool,
    ) -> Result<StringRef> {
        let alloc = Allocator::resolve(allocator);
        let decoded = encoding::decode(&alloc, bytes, encoding, external)?;
        Self::adopt(Some(&alloc), decoded)
    }

    pub fn from_external_representation(
        allocator: Option<&Allocator>,
        data: &[u8],
        encoding: Encoding,
    ) -> Result<StringRef> {
        Self::with_bytes(allocator, data, encoding, true)
    }

    /// Build a string over a caller buffer without copying it when the
    /// encoding is an internal one (ASCII, or host-order UTF-16 without a
    /// BOM). Other encodings are decoded and the source is returned to
    /// `deallocator` straight away. `None` means the default allocator;
    /// pass [`Allocator::null`] to keep ownership with the caller.
    ///
    /// On error the caller keeps ownership of the buffer.
    ///
    /// # Safety
    ///
    /// `bytes` must be valid for reads of `len` bytes, aligned for `u16` when
    /// adopted as UTF-16, and must stay valid and unmodified until it is
    /// handed to `deallocator`. When `deallocator` frees memory, the block
    /// must have been obtained from it with exactly `len` bytes.
    pub unsafe fn with_bytes_no_copy(
        allocator: Option<&Allocator>,
        bytes: NonNull<u8>,
        len: usize,
        encoding: Encoding,
        external: bool,
        deallocator: Option<&Allocator>,
    ) -> Result<StringRef> {
        let deallocator = Allocator::resolve(deallocator);
        // SAFETY: validity for `len` bytes is guaranteed by the caller.
        let source = unsafe { slice::from_raw_parts(bytes.as_ptr(), len) };
        let adopt_wide = encoding == Encoding::Utf16
            && !external
            && len % 2 == 0
            && (bytes.as_ptr() as usize) % 2 == 0;
        if encoding == Encoding::Ascii && source.is_ascii() {
            let contents = Contents::Owned {
                ptr: bytes,
                bytes: len,
                deallocator,
            };
            return Self::from_owned(allocator, contents, len, false, flags::OWNED);
        }
        if adopt_wide {
            let contents = Contents::Owned {
                ptr: bytes,
                bytes: len,
                deallocator,
            };
            return Self::from_owned(allocator, contents, len / 2, true, flags::OWNED);
        }
        let string = Self::with_bytes(allocator, source, encoding, external)?;
        deallocator.deallocate(bytes, len);
        Ok(string)
    }

    /// Wrap a literal without copying. Non-ASCII literals are copied.
    pub fn with_static_ascii(allocator: Option<&Allocator>, s: &'static str) -> Result<StringRef> {
        if !s.is_ascii() {
            return Self::with_str(allocator, s);
        }
        Self::from_owned(allocator, Contents::Static(s.as_bytes()), s.len(), false, 0)
    }

    /// Immortal string over a literal, used by the interning table.
    pub(crate) fn immortal(s: &'static str) -> Result<StringRef> {
        let object = if s.is_ascii() {
            create_immortal_instance(
                string_type_id(),
                StringPayload::immutable(Contents::Static(s.as_bytes()), s.len(), false),
                0,
                |_| {},
            )?
        } else {
            let wide: UnitVec = s.encode_utf16().collect();
            let object = create_immortal_instance(
                string_type_id(),
                StringPayload::immutable(Contents::Inline, wide.len(), true),
                wide.len() * 2,
                |bytes| {
                    for (chunk, unit) in bytes.chunks_exact_mut(2).zip(&wide) {
                        chunk.copy_from_slice(&unit.to_ne_bytes());
                    }
                },
            )?;
            object.set_info_bits(flags::WIDE | flags::INLINE);
            object
        };
        Ok(StringRef(object))
    }

    pub fn with_substring(
        allocator: Option<&Allocator>,
        source: &StringRef,
        range: CharRange,
    ) -> Result<StringRef> {
        source.with_units(|units| {
            if !range.fits_within(units.len()) {
                return Err(Error::out_of_range(messages::RANGE_OUT_OF_BOUNDS));
            }
            match units.slice(range.location, range.end()) {
                Units::Wide(w) => Self::with_characters(allocator, w),
                narrow => Self::from_inline(allocator, narrow),
            }
        })
    }

    /// Join `strings` with `separator` between them. An empty list has
    /// nothing to combine and fails.
    pub fn by_combining_strings(
        allocator: Option<&Allocator>,
        strings: &[StringRef],
        separator: &StringRef,
    ) -> Result<StringRef> {
        if strings.is_empty() {
            return Err(Error::construction("no strings to combine"));
        }
        let separator = separator.to_utf16();
        let mut joined: Vec<u16> = Vec::new();
        for (i, s) in strings.iter().enumerate() {
            if i > 0 {
                joined.extend_from_slice(&separator);
            }
            s.with_units(|units| joined.extend(units.iter()));
        }
        Self::with_characters(allocator, &joined)
    }

    pub fn with_format(allocator: Option<&Allocator>, args: fmt::Arguments<'_>) -> Result<StringRef> {
        match args.as_str() {
            Some(s) => Self::with_str(allocator, s),
            None => Self::with_str(allocator, &fmt::format(args)),
        }
    }

    /// Immutable copy. An immutable source already owned by the target
    /// allocator is returned retained.
    pub fn copy(&self, allocator: Option<&Allocator>) -> Result<StringRef> {
        let allocator = Allocator::resolve(allocator);
        if !self.is_mutable() && self.0.allocator() == &allocator {
            return Ok(self.clone());
        }
        self.with_units(|units| match units {
            Units::Wide(w) => Self::with_characters(Some(&allocator), w),
            narrow => Self::from_inline(Some(&allocator), narrow),
        })
    }

    /// Mutable copy holding at most `max_length` units; zero means all of them.
    pub fn mutable_copy(&self, allocator: Option<&Allocator>, max_length: usize) -> Result<MutableString> {
        MutableString::with_string(allocator, max_length, self)
    }

    /// Run `f` over the contents in their internal form.
    ///
    /// A mutable string is read-locked for the duration, so `f` must not
    /// mutate the same string.
    pub fn with_units<R>(&self, f: impl FnOnce(Units<'_>) -> R) -> R {
        let payload = self.payload();
        match &payload.storage {
            Storage::Mutable(buf) => {
                let buf = buf.read().unwrap_or_else(PoisonError::into_inner);
                f(Units::Wide(buf.as_slice()))
            }
            Storage::Immutable { .. } => match immutable_units(&self.0, payload) {
                Some(units) => f(units),
                None => unreachable!("immutable storage without units"),
            },
        }
    }

    pub fn len(&self) -> usize {
        match &self.payload().storage {
            Storage::Immutable { len, .. } => *len,
            Storage::Mutable(_) => self.with_units(|u| u.len()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_mutable(&self) -> bool {
        matches!(self.payload().storage, Storage::Mutable(_))
    }

    pub fn is_wide(&self) -> bool {
        match &self.payload().storage {
            Storage::Immutable { wide, .. } => *wide,
            Storage::Mutable(_) => true,
        }
    }

    pub fn allocator(&self) -> &Allocator {
        self.0.allocator()
    }

    pub fn character_at(&self, index: usize) -> Option<u16> {
        self.with_units(|u| (index < u.len()).then(|| u.unit_at(index)))
    }

    /// Copy the units in `range` into `buffer`. Returns the number copied,
    /// which is zero when the range does not fit the string.
    pub fn get_characters(&self, range: CharRange, buffer: &mut [u16]) -> usize {
        self.with_units(|units| {
            debug_assert!(range.fits_within(units.len()), "range {range} out of bounds");
            if !range.fits_within(units.len()) {
                return 0;
            }
            let count = range.length.min(buffer.len());
            units
                .slice(range.location, range.location + count)
                .copy_into(&mut buffer[..count]);
            count
        })
    }

    pub fn to_utf16(&self) -> Vec<u16> {
        self.with_units(|u| u.iter().collect())
    }

    /// Encode `range` into `encoding`; see [`encoding::encode`].
    pub fn get_bytes(
        &self,
        range: CharRange,
        encoding: Encoding,
        loss_byte: Option<u8>,
        external: bool,
        out: Option<&mut [u8]>,
    ) -> Conversion {
        self.with_units(|units| {
            if !range.fits_within(units.len()) {
                report_ignored(
                    "get_bytes",
                    format_args!("range {range} exceeds length {}", units.len()),
                );
                return Conversion::default();
            }
            encoding::encode(
                units.slice(range.location, range.end()),
                encoding,
                loss_byte,
                external,
                out,
            )
        })
    }

    /// Whole-string external representation, with a BOM where the encoding
    /// calls for one. `None` if a character could not be represented.
    pub fn external_representation(&self, encoding: Encoding, loss_byte: Option<u8>) -> Option<Vec<u8>> {
        self.with_units(|units| {
            let sized = encoding::encode(units, encoding, loss_byte, true, None);
            if sized.units != units.len() {
                return None;
            }
            let mut out = vec![0u8; sized.bytes];
            encoding::encode(units, encoding, loss_byte, true, Some(&mut out));
            Some(out)
        })
    }

    /// Write a NUL-terminated copy into `buffer`. Fails if the buffer is
    /// too small or a character is unrepresentable.
    pub fn get_cstring(&self, buffer: &mut [u8], encoding: Encoding) -> bool {
        let Some(room) = buffer.len().checked_sub(1) else {
            return false;
        };
        self.with_units(|units| {
            let done = encoding::encode(units, encoding, None, false, Some(&mut buffer[..room]));
            if done.units != units.len() {
                return false;
            }
            buffer[done.bytes] = 0;
            true
        })
    }

    /// Direct access to wide immutable contents.
    pub fn as_characters(&self) -> Option<&[u16]> {
        match immutable_units(&self.0, self.payload())? {
            Units::Wide(w) => Some(w),
            Units::Narrow(_) => None,
        }
    }

    /// Direct access to narrow immutable contents.
    pub fn narrow_contents(&self) -> Option<&[u8]> {
        match immutable_units(&self.0, self.payload())? {
            Units::Narrow(b) => Some(b),
            Units::Wide(_) => None,
        }
    }

    /// Direct access to NUL-terminated narrow contents, for encodings
    /// that are a superset of ASCII.
    pub fn as_cstr(&self, encoding: Encoding) -> Option<&CStr> {
        if !encoding.is_ascii_superset() || self.0.info() & flags::HAS_NUL_BYTE == 0 {
            return None;
        }
        match immutable_units(&self.0, self.payload())? {
            Units::Narrow(b) => {
                // SAFETY: HAS_NUL_BYTE means the byte after the contents is NUL.
                let with_nul = unsafe { slice::from_raw_parts(b.as_ptr(), b.len() + 1) };
                CStr::from_bytes_with_nul(with_nul).ok()
            }
            Units::Wide(_) => None,
        }
    }

    /// Memoized hash over code points.
    pub fn hash_code(&self) -> HashCode {
        let payload = self.payload();
        let cached = payload.hash.load(AtomicOrdering::Acquire);
        if cached != 0 {
            return cached;
        }
        self.with_units(|units| {
            let hash = compute_hash(units);
            payload.hash.store(hash, AtomicOrdering::Release);
            hash
        })
    }

    /// The memoized hash, if one has been computed since the last mutation.
    pub fn cached_hash(&self) -> Option<HashCode> {
        match self.payload().hash.load(AtomicOrdering::Acquire) {
            0 => None,
            h => Some(h),
        }
    }

    /// Same code unit sequence, regardless of representation.
    pub fn equals(&self, other: &StringRef) -> bool {
        compare::with_pair(self, other, |a, b| a.len() == b.len() && a.iter().eq(b.iter()))
    }

    pub fn compare(&self, other: &StringRef, options: CompareOptions) -> Ordering {
        compare::with_pair(self, other, |a, b| compare::compare_units(a, b, options))
    }

    pub fn compare_in_range(&self, other: &StringRef, range: CharRange, options: CompareOptions) -> Ordering {
        compare::with_pair(self, other, |a, b| {
            let start = range.location.min(a.len());
            let end = range.end().min(a.len()).max(start);
            compare::compare_units(a.slice(start, end), b, options)
        })
    }

    pub fn has_prefix(&self, prefix: &StringRef) -> bool {
        compare::with_pair(self, prefix, |a, p| {
            p.len() <= a.len() && a.slice(0, p.len()).iter().eq(p.iter())
        })
    }

    pub fn has_suffix(&self, suffix: &StringRef) -> bool {
        compare::with_pair(self, suffix, |a, s| {
            s.len() <= a.len() && a.slice(a.len() - s.len(), a.len()).iter().eq(s.iter())
        })
    }

    pub fn find(&self, needle: &StringRef, options: CompareOptions) -> Option<CharRange> {
        let whole = CharRange::new(0, self.len());
        self.find_in_range(needle, whole, options)
    }

    pub fn find_in_range(
        &self,
        needle: &StringRef,
        range: CharRange,
        options: CompareOptions,
    ) -> Option<CharRange> {
        compare::with_pair(self, needle, |h, n| compare::find_units(h, n, range, options))
    }

    /// Every match of `needle`, non-overlapping, in string order.
    pub fn find_all(&self, needle: &StringRef, options: CompareOptions) -> Vec<CharRange> {
        compare::with_pair(self, needle, |h, n| {
            compare::find_all_units(h, n, CharRange::new(0, h.len()), options)
        })
    }

    /// Split on every occurrence of `separator`. Without a match the result
    /// holds the whole string.
    pub fn array_by_separating_strings(&self, separator: &StringRef) -> Result<Vec<StringRef>> {
        let matches = self.find_all(separator, CompareOptions::NONE);
        let mut parts = Vec::with_capacity(matches.len() + 1);
        let mut start = 0;
        for found in matches {
            parts.push(Self::with_substring(
                Some(self.allocator()),
                self,
                CharRange::new(start, found.location - start),
            )?);
            start = found.end();
        }
        let rest = CharRange::new(start, self.len() - start);
        parts.push(Self::with_substring(Some(self.allocator()), self, rest)?);
        Ok(parts)
    }

    /// Field dump of the instance, one `Name value` pair per line.
    pub fn debug_summary(&self) -> String {
        let info = self.0.info();
        format!(
            "Length {}\nIsEightBit {}\nHasLengthByte {}\nHasNullByte {}\nInlineContents {}\nAllocator {:?}\nMutable {}\nContents {:?}\n",
            self.len(),
            !self.is_wide(),
            info & flags::HAS_LENGTH_BYTE != 0,
            info & flags::HAS_NUL_BYTE != 0,
            info & flags::INLINE != 0,
            self.allocator(),
            self.is_mutable(),
            self.to_string(),
        )
    }
}

/// Print an object's description to standard error.
pub fn show(object: &Object) {
    eprintln!("{}", object.describe());
}

/// Print a string's field dump to standard error.
pub fn show_str(string: &StringRef) {
    eprint!("{}", string.debug_summary());
}

impl fmt::Display for StringRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_units(|units| match units {
            Units::Narrow(b) => b.iter().try_for_each(|&c| fmt::Write::write_char(f, char::from(c))),
            Units::Wide(w) => char::decode_utf16(w.iter().copied())
                .try_for_each(|c| {
                    fmt::Write::write_char(f, c.unwrap_or(char::REPLACEMENT_CHARACTER))
                }),
        })
    }
}

impl fmt::Debug for StringRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.to_string(), f)
    }
}

impl PartialEq for StringRef {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for StringRef {}

impl PartialEq<str> for StringRef {
    fn eq(&self, other: &str) -> bool {
        self.with_units(|units| units.iter().eq(other.encode_utf16()))
    }
}

impl PartialEq<&str> for StringRef {
    fn eq(&self, other: &&str) -> bool {
        *self == **other
    }
}

impl Hash for StringRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_passes() -> usize {
        HASH_PASSES.with(std::cell::Cell::get)
    }

    #[test]
    fn hash_is_computed_once_per_string() {
        let string = StringRef::with_str(None, "computed once").unwrap();
        let before = hash_passes();
        let first = string.hash_code();
        assert_eq!(hash_passes(), before + 1);
        for _ in 0..3 {
            assert_eq!(string.hash_code(), first);
        }
        assert_eq!(hash_passes(), before + 1);
    }

    #[test]
    fn mutation_forces_one_recomputation() {
        let string = MutableString::with_str(None, "abc").unwrap();
        let before = hash_passes();
        let original = string.as_string().hash_code();
        string.as_string().hash_code();
        assert_eq!(hash_passes(), before + 1);

        string.append_str("d");
        let edited = string.as_string().hash_code();
        string.as_string().hash_code();
        assert_eq!(hash_passes(), before + 2);
        assert_ne!(edited, original);
        assert_eq!(edited, StringRef::with_str(None, "abcd").unwrap().hash_code());
    }

    #[test]
    fn ignored_edit_keeps_the_memoized_hash() {
        let string = MutableString::with_str(None, "abc").unwrap();
        string.as_string().hash_code();
        let before = hash_passes();
        string.delete(CharRange::new(2, 5));
        string.as_string().hash_code();
        assert_eq!(hash_passes(), before);
    }
}
