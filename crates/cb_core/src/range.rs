use std::fmt;
use std::ops::Range;

/// A location and length in code units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CharRange {
    pub location: usize,
    pub length: usize,
}

impl CharRange {
    pub const fn new(location: usize, length: usize) -> Self {
        Self { location, length }
    }

    pub const fn end(&self) -> usize {
        self.location + self.length
    }

    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Whether the range lies entirely inside a container of `len` units.
    pub fn fits_within(&self, len: usize) -> bool {
        self.location
            .checked_add(self.length)
            .is_some_and(|end| end <= len)
    }

    pub fn as_range(&self) -> Range<usize> {
        self.location..self.end()
    }
}

impl From<Range<usize>> for CharRange {
    fn from(range: Range<usize>) -> Self {
        Self::new(range.start, range.end.saturating_sub(range.start))
    }
}

impl fmt::Display for CharRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}, {}}}", self.location, self.length)
    }
}
