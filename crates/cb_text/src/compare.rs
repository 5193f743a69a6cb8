//! Comparison and searching over string contents.

use crate::encoding::Units;
use crate::string::StringRef;
use cb_core::CharRange;
use cb_core::runtime::ObjectRef;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::ops::BitOr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CompareOptions(pub u32);

impl CompareOptions {
    pub const NONE: CompareOptions = CompareOptions(0);
    pub const CASE_INSENSITIVE: CompareOptions = CompareOptions(1);
    /// Search from the end of the range.
    pub const BACKWARDS: CompareOptions = CompareOptions(4);
    /// Only match at the start (or end, with `BACKWARDS`) of the range.
    pub const ANCHORED: CompareOptions = CompareOptions(8);

    pub const fn contains(self, other: CompareOptions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CompareOptions {
    type Output = CompareOptions;

    fn bitor(self, rhs: CompareOptions) -> CompareOptions {
        CompareOptions(self.0 | rhs.0)
    }
}

/// Run `f` over both strings' units. At most one read lock is held at a
/// time: a mutable `b` is copied out before `a` is read.
pub(crate) fn with_pair<R>(
    a: &StringRef,
    b: &StringRef,
    f: impl FnOnce(Units<'_>, Units<'_>) -> R,
) -> R {
    if ObjectRef::ptr_eq(a.as_object(), b.as_object()) {
        return a.with_units(|units| f(units, units));
    }
    if b.is_mutable() {
        let snapshot: SmallVec<[u16; 64]> = b.with_units(|ub| ub.iter().collect());
        return a.with_units(|ua| f(ua, Units::Wide(&snapshot)));
    }
    a.with_units(|ua| b.with_units(|ub| f(ua, ub)))
}

/// Simple one-to-one lowercase mapping; characters whose lowercase form
/// expands stay as they are.
fn fold(code_point: u32) -> u32 {
    let Some(c) = char::from_u32(code_point) else {
        return code_point;
    };
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l as u32,
        _ => code_point,
    }
}

fn key(code_point: u32, case_insensitive: bool) -> u32 {
    if case_insensitive {
        fold(code_point)
    } else {
        code_point
    }
}

/// Code point order.
pub fn compare_units(a: Units<'_>, b: Units<'_>, options: CompareOptions) -> Ordering {
    let ci = options.contains(CompareOptions::CASE_INSENSITIVE);
    a.code_points()
        .map(|c| key(c, ci))
        .cmp(b.code_points().map(|c| key(c, ci)))
}

fn matches_at(haystack: Units<'_>, needle: Units<'_>, at: usize, ci: bool) -> bool {
    (0..needle.len()).all(|i| {
        key(u32::from(haystack.unit_at(at + i)), ci) == key(u32::from(needle.unit_at(i)), ci)
    })
}

pub fn find_units(
    haystack: Units<'_>,
    needle: Units<'_>,
    range: CharRange,
    options: CompareOptions,
) -> Option<CharRange> {
    if needle.is_empty() || !range.fits_within(haystack.len()) || needle.len() > range.length {
        return None;
    }
    let ci = options.contains(CompareOptions::CASE_INSENSITIVE);
    let first = range.location;
    let last = range.end() - needle.len();
    let hit = |at: usize| matches_at(haystack, needle, at, ci).then(|| CharRange::new(at, needle.len()));
    match (
        options.contains(CompareOptions::BACKWARDS),
        options.contains(CompareOptions::ANCHORED),
    ) {
        (false, true) => hit(first),
        (true, true) => hit(last),
        (false, false) => (first..=last).find_map(hit),
        (true, false) => (first..=last).rev().find_map(hit),
    }
}

/// Non-overlapping matches in ascending order.
pub fn find_all_units(
    haystack: Units<'_>,
    needle: Units<'_>,
    range: CharRange,
    options: CompareOptions,
) -> Vec<CharRange> {
    let mut found = Vec::new();
    if options.contains(CompareOptions::ANCHORED) {
        found.extend(find_units(haystack, needle, range, options));
        return found;
    }
    let mut window = range;
    while let Some(hit) = find_units(haystack, needle, window, options) {
        found.push(hit);
        window = if options.contains(CompareOptions::BACKWARDS) {
            CharRange::new(window.location, hit.location - window.location)
        } else {
            CharRange::new(hit.end(), window.end() - hit.end())
        };
    }
    found.sort_by_key(|r| r.location);
    found
}
