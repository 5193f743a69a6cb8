//! Windowed character access for tight loops.
//!
//! [`InlineBuffer`] reads a range of a string one unit at a time without
//! taking a lock or bounds-checking against the whole string on every call.
//! Immutable contents are indexed in place; mutable contents are copied in
//! windows of [`INLINE_BUFFER_LENGTH`] units.

use crate::encoding::Units;
use crate::string::StringRef;
use cb_core::CharRange;

pub const INLINE_BUFFER_LENGTH: usize = 64;

enum Source<'a> {
    Direct(Units<'a>),
    Windowed(&'a StringRef),
}

pub struct InlineBuffer<'a> {
    source: Source<'a>,
    range: CharRange,
    window: [u16; INLINE_BUFFER_LENGTH],
    window_start: usize,
    window_end: usize,
}

impl<'a> InlineBuffer<'a> {
    /// Buffer over `range` of `string`; the range is clamped to the string.
    pub fn new(string: &'a StringRef, range: CharRange) -> Self {
        let len = string.len();
        let location = range.location.min(len);
        let range = CharRange::new(location, range.length.min(len - location));
        let source = match string.as_characters() {
            Some(wide) => Source::Direct(Units::Wide(wide)),
            None => match string.narrow_contents() {
                Some(narrow) => Source::Direct(Units::Narrow(narrow)),
                None => Source::Windowed(string),
            },
        };
        Self {
            source,
            range,
            window: [0; INLINE_BUFFER_LENGTH],
            window_start: 0,
            window_end: 0,
        }
    }

    pub fn whole(string: &'a StringRef) -> Self {
        Self::new(string, CharRange::new(0, string.len()))
    }

    pub fn len(&self) -> usize {
        self.range.length
    }

    pub fn is_empty(&self) -> bool {
        self.range.length == 0
    }

    /// Unit at `index`, relative to the start of the range.
    pub fn get(&mut self, index: usize) -> Option<u16> {
        if index >= self.range.length {
            return None;
        }
        let absolute = self.range.location + index;
        match &self.source {
            Source::Direct(units) => Some(units.unit_at(absolute)),
            Source::Windowed(string) => {
                if !(self.window_start..self.window_end).contains(&index) {
                    // Centre-ish window so short backward steps stay cached.
                    let start = index.saturating_sub(INLINE_BUFFER_LENGTH / 4);
                    let end = (start + INLINE_BUFFER_LENGTH).min(self.range.length);
                    let copied = string.get_characters(
                        CharRange::new(self.range.location + start, end - start),
                        &mut self.window,
                    );
                    self.window_start = start;
                    self.window_end = start + copied;
                }
                (index < self.window_end).then(|| self.window[index - self.window_start])
            }
        }
    }

    pub fn iter<'b>(&'b mut self) -> impl Iterator<Item = u16> + 'b {
        (0..self.len()).map_while(move |i| self.get(i))
    }
}
