//! Mutable strings.
//!
//! Contents are always wide and live in a [`UnitBuf`] behind a lock.
//! Capacity grows to exactly what an edit needs and never shrinks. Every
//! edit goes through [`MutableString::replace_characters`] or one of the
//! service-backed rewrites, and every edit clears the memoized hash.
//!
//! Edits with an out-of-range argument are ignored (and logged), never
//! reported as errors.

use crate::buffer::UnitBuf;
use crate::compare::{self, CompareOptions};
use crate::encoding::{self, Decoded, Encoding, Units, code_point_at};
use crate::string::{StringPayload, StringRef, UnitVec, flags, string_type_id};
use crate::unicode::{
    CaseOperation, NormalizationForm, QuickCheck, ServiceError, TextService, text_service,
};
use cb_core::error::{messages, report_ignored};
use cb_core::runtime::create_instance;
use cb_core::{Allocator, CharRange, Error, Result};
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::Ordering;
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

#[derive(Clone)]
pub struct MutableString(StringRef);

impl Deref for MutableString {
    type Target = StringRef;

    fn deref(&self) -> &StringRef {
        &self.0
    }
}

/// Where an edit applies.
#[derive(Clone, Copy)]
enum Target {
    Range(CharRange),
    End,
    All,
}

fn service_error(err: ServiceError) -> Error {
    Error::service(err.to_string())
}

impl MutableString {
    /// Empty string with room for `max_length` units (at least the
    /// configured default capacity).
    pub fn new(allocator: Option<&Allocator>, max_length: usize) -> Result<MutableString> {
        let allocator = Allocator::resolve(allocator);
        let capacity = max_length.max(cb_core::config().default_string_capacity);
        let buf = UnitBuf::with_capacity(&allocator, capacity)
            .ok_or_else(|| Error::construction(messages::ALLOCATION_FAILED))?;
        let object = create_instance(Some(&allocator), string_type_id(), StringPayload::mutable(buf))?;
        object.set_info_bits(flags::MUTABLE | flags::WIDE | flags::OWNED);
        Ok(MutableString(StringRef(object)))
    }

    /// Copy of `source` truncated to `max_length` units; zero means no limit.
    pub fn with_string(
        allocator: Option<&Allocator>,
        max_length: usize,
        source: &StringRef,
    ) -> Result<MutableString> {
        let units: UnitVec = source.with_units(|u| {
            let take = if max_length == 0 { u.len() } else { u.len().min(max_length) };
            u.slice(0, take).iter().collect()
        });
        let string = Self::new(allocator, units.len())?;
        if !string.write().extend_from_slice(&units) {
            return Err(Error::construction(messages::ALLOCATION_FAILED));
        }
        Ok(string)
    }

    pub fn with_str(allocator: Option<&Allocator>, s: &str) -> Result<MutableString> {
        let string = Self::new(allocator, 0)?;
        if !string.append_str(s) {
            return Err(Error::construction(messages::ALLOCATION_FAILED));
        }
        Ok(string)
    }

    /// View `string` as mutable, if it is.
    pub fn from_string(string: StringRef) -> Option<MutableString> {
        string.is_mutable().then_some(MutableString(string))
    }

    pub fn as_string(&self) -> &StringRef {
        &self.0
    }

    pub fn into_string(self) -> StringRef {
        self.0
    }

    fn lock(&self) -> &RwLock<UnitBuf<u16>> {
        match &self.0.payload().storage {
            crate::string::Storage::Mutable(buf) => buf,
            crate::string::Storage::Immutable { .. } => {
                unreachable!("mutable handle over immutable storage")
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, UnitBuf<u16>> {
        self.lock().write().unwrap_or_else(PoisonError::into_inner)
    }

    fn invalidate_hash(&self) {
        self.0.payload().hash.store(0, Ordering::Release);
    }

    pub fn capacity(&self) -> usize {
        self.lock()
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .capacity()
    }

    fn splice(&self, operation: &'static str, target: Target, units: &[u16]) -> bool {
        let mut buf = self.write();
        let len = buf.len();
        let range = match target {
            Target::Range(range) => range,
            Target::End => CharRange::new(len, 0),
            Target::All => CharRange::new(0, len),
        };
        if !range.fits_within(len) {
            report_ignored(operation, format_args!("range {range} exceeds length {len}"));
            return false;
        }
        let done = buf.splice(range.as_range(), units);
        self.invalidate_hash();
        done
    }

    /// Replace `range` with `chars`. The primitive every other edit reduces to.
    ///
    /// `chars` must not be borrowed from this string.
    pub fn replace_characters(&self, range: CharRange, chars: &[u16]) -> bool {
        self.splice("replace", Target::Range(range), chars)
    }

    pub fn replace(&self, range: CharRange, replacement: &StringRef) {
        // Copy first: `replacement` may be this very string.
        let units: UnitVec = replacement.with_units(|u| u.iter().collect());
        self.splice("replace", Target::Range(range), &units);
    }

    pub fn replace_all(&self, replacement: &StringRef) {
        let units: UnitVec = replacement.with_units(|u| u.iter().collect());
        self.splice("replace_all", Target::All, &units);
    }

    pub fn append(&self, appended: &StringRef) {
        let units: UnitVec = appended.with_units(|u| u.iter().collect());
        self.splice("append", Target::End, &units);
    }

    pub fn append_characters(&self, chars: &[u16]) -> bool {
        self.splice("append", Target::End, chars)
    }

    pub fn append_str(&self, s: &str) -> bool {
        let units: UnitVec = s.encode_utf16().collect();
        self.splice("append", Target::End, &units)
    }

    /// Decode `bytes` and append them. Malformed input appends nothing.
    pub fn append_bytes(&self, bytes: &[u8], encoding: Encoding) -> bool {
        let allocator = Allocator::system();
        match encoding::decode(&allocator, bytes, encoding, false) {
            Ok(Decoded::Borrowed(ascii)) => {
                let units: UnitVec = ascii.iter().map(|&b| u16::from(b)).collect();
                self.append_characters(&units)
            }
            Ok(Decoded::Narrow(buf)) => {
                let units: UnitVec = buf.as_slice().iter().map(|&b| u16::from(b)).collect();
                self.append_characters(&units)
            }
            Ok(Decoded::Wide(buf)) => self.append_characters(buf.as_slice()),
            Err(err) => {
                log::debug!("append_bytes: {err}");
                false
            }
        }
    }

    pub fn append_format(&self, args: fmt::Arguments<'_>) -> bool {
        match args.as_str() {
            Some(s) => self.append_str(s),
            None => self.append_str(&fmt::format(args)),
        }
    }

    pub fn insert(&self, index: usize, inserted: &StringRef) {
        let units: UnitVec = inserted.with_units(|u| u.iter().collect());
        self.splice("insert", Target::Range(CharRange::new(index, 0)), &units);
    }

    pub fn delete(&self, range: CharRange) {
        self.splice("delete", Target::Range(range), &[]);
    }

    /// Strip leading and trailing whitespace.
    pub fn trim_whitespace(&self) {
        self.trim_whitespace_with(text_service())
    }

    pub fn trim_whitespace_with(&self, service: &dyn TextService) {
        let mut buf = self.write();
        let (first, last) = {
            let units = Units::Wide(buf.as_slice());
            let mut first = None;
            let mut last = 0;
            let mut index = 0;
            while let Some((code_point, width)) = code_point_at(units, index) {
                if !service.is_whitespace(code_point) {
                    first.get_or_insert(index);
                    last = index + width;
                }
                index += width;
            }
            (first, last)
        };
        match first {
            Some(first) => {
                buf.as_mut_slice().copy_within(first..last, 0);
                buf.truncate(last - first);
            }
            None => buf.clear(),
        }
        self.invalidate_hash();
    }

    /// Remove repeated occurrences of `trim` from both ends.
    pub fn trim(&self, trim: &StringRef) {
        let pattern: UnitVec = trim.with_units(|u| u.iter().collect());
        if pattern.is_empty() {
            return;
        }
        let mut buf = self.write();
        let units = buf.as_slice();
        let n = pattern.len();
        let mut start = 0;
        while units.len() - start >= n && units[start..start + n] == pattern[..] {
            start += n;
        }
        let mut end = units.len();
        while end - start >= n && units[end - n..end] == pattern[..] {
            end -= n;
        }
        if start == 0 && end == units.len() {
            return;
        }
        buf.as_mut_slice().copy_within(start..end, 0);
        buf.truncate(end - start);
        self.invalidate_hash();
    }

    /// Truncate to `length`, or extend to it by repeating `pad` starting at
    /// `pad_index`.
    pub fn pad(&self, pad: Option<&StringRef>, length: usize, pad_index: usize) {
        let pattern: UnitVec = pad.map_or_else(UnitVec::new, |p| p.with_units(|u| u.iter().collect()));
        let mut buf = self.write();
        let len = buf.len();
        if length <= len {
            buf.truncate(length);
            self.invalidate_hash();
            return;
        }
        if pad_index >= pattern.len() {
            report_ignored(
                "pad",
                format_args!("pad index {pad_index} outside a pad of {}", pattern.len()),
            );
            return;
        }
        let fill: Vec<u16> = pattern
            .iter()
            .copied()
            .cycle()
            .skip(pad_index)
            .take(length - len)
            .collect();
        buf.splice(len..len, &fill);
        self.invalidate_hash();
    }

    /// Replace every match of `find` inside `range`; returns how many were replaced.
    pub fn find_and_replace(
        &self,
        find: &StringRef,
        replacement: &StringRef,
        range: CharRange,
        options: CompareOptions,
    ) -> usize {
        let needle: UnitVec = find.with_units(|u| u.iter().collect());
        let with: UnitVec = replacement.with_units(|u| u.iter().collect());
        let mut buf = self.write();
        if !range.fits_within(buf.len()) {
            report_ignored(
                "find_and_replace",
                format_args!("range {range} exceeds length {}", buf.len()),
            );
            return 0;
        }
        let hits = compare::find_all_units(
            Units::Wide(buf.as_slice()),
            Units::Wide(&needle),
            range,
            options,
        );
        for hit in hits.iter().rev() {
            if !buf.splice(hit.as_range(), &with) {
                break;
            }
        }
        if !hits.is_empty() {
            self.invalidate_hash();
        }
        hits.len()
    }

    /// Run a fill-the-buffer service over the whole contents, growing once
    /// and retrying if it reports the buffer too small.
    fn rewrite(
        &self,
        run: impl Fn(&[u16], &mut [u16]) -> std::result::Result<usize, ServiceError>,
    ) -> Result<()> {
        let mut buf = self.write();
        let source: UnitVec = buf.as_slice().iter().copied().collect();
        let mut out = vec![0u16; buf.capacity()];
        let written = match run(&source, &mut out) {
            Ok(written) => written,
            Err(ServiceError::BufferTooSmall { needed }) => {
                if !buf.grow_exact(needed) {
                    return Err(Error::service(messages::ALLOCATION_FAILED));
                }
                out.resize(buf.capacity(), 0);
                run(&source, &mut out).map_err(service_error)?
            }
            Err(err) => return Err(service_error(err)),
        };
        let len = buf.len();
        let done = buf.splice(0..len, &out[..written]);
        self.invalidate_hash();
        if done {
            Ok(())
        } else {
            Err(Error::service(messages::ALLOCATION_FAILED))
        }
    }

    pub fn case_map(&self, op: CaseOperation) -> Result<()> {
        self.case_map_with(text_service(), op)
    }

    pub fn case_map_with(&self, service: &dyn TextService, op: CaseOperation) -> Result<()> {
        self.rewrite(|src, dst| service.case_map(op, src, dst))
    }

    pub fn uppercase(&self) -> Result<()> {
        self.case_map(CaseOperation::Uppercase)
    }

    pub fn lowercase(&self) -> Result<()> {
        self.case_map(CaseOperation::Lowercase)
    }

    pub fn capitalize(&self) -> Result<()> {
        self.case_map(CaseOperation::Capitalize)
    }

    pub fn fold(&self) -> Result<()> {
        self.case_map(CaseOperation::Fold)
    }

    pub fn normalize(&self, form: NormalizationForm) -> Result<()> {
        self.normalize_with(text_service(), form)
    }

    /// Skips the full pass when the quick check answers "yes".
    pub fn normalize_with(&self, service: &dyn TextService, form: NormalizationForm) -> Result<()> {
        let quick = self.with_units(|units| match units {
            Units::Wide(w) => service.quick_check(form, w),
            Units::Narrow(_) => QuickCheck::Maybe,
        });
        if quick == QuickCheck::Yes {
            return Ok(());
        }
        self.rewrite(|src, dst| service.normalize(form, src, dst))
    }

    /// Apply the transform `id` to `range` (the whole string when `None`).
    /// On success the range's length is updated to the transformed length.
    /// Any service failure leaves the string untouched and returns `false`.
    pub fn transform(&self, id: &str, range: Option<&mut CharRange>, reverse: bool) -> bool {
        self.transform_with(text_service(), id, range, reverse)
    }

    pub fn transform_with(
        &self,
        service: &dyn TextService,
        id: &str,
        range: Option<&mut CharRange>,
        reverse: bool,
    ) -> bool {
        let mut buf = self.write();
        let target = range
            .as_deref()
            .copied()
            .unwrap_or(CharRange::new(0, buf.len()));
        if !target.fits_within(buf.len()) {
            report_ignored(
                "transform",
                format_args!("range {target} exceeds length {}", buf.len()),
            );
            return false;
        }
        let source: UnitVec = buf.as_slice()[target.as_range()].iter().copied().collect();
        let transformed = match service.transliterate(id, reverse, &source) {
            Ok(transformed) => transformed,
            Err(err) => {
                log::debug!("transform `{id}` failed: {err}");
                return false;
            }
        };
        if !buf.splice(target.as_range(), &transformed) {
            return false;
        }
        self.invalidate_hash();
        if let Some(range) = range {
            range.length = transformed.len();
        }
        true
    }

    /// Immutable snapshot.
    pub fn copy(&self, allocator: Option<&Allocator>) -> Result<StringRef> {
        self.0.copy(allocator)
    }
}

impl fmt::Write for MutableString {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.append_str(s) {
            Ok(())
        } else {
            Err(fmt::Error)
        }
    }
}

impl fmt::Display for MutableString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for MutableString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl PartialEq for MutableString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialEq<&str> for MutableString {
    fn eq(&self, other: &&str) -> bool {
        self.0 == **other
    }
}
