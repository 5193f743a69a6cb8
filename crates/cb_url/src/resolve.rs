//! Relative reference resolution (RFC 3986 section 5).

use crate::component::{Component, ComponentRanges};
use crate::parse::SLASH;

const SLASH_UNIT: u16 = SLASH as u16;

fn starts(input: &[u16], pattern: &str) -> bool {
    input.len() >= pattern.len() && input.iter().zip(pattern.bytes()).all(|(&c, b)| c == u16::from(b))
}

fn is(input: &[u16], pattern: &str) -> bool {
    input.len() == pattern.len() && starts(input, pattern)
}

fn pop_segment(output: &mut Vec<u16>) {
    let cut = output.iter().rposition(|&c| c == SLASH_UNIT).unwrap_or(0);
    output.truncate(cut);
}

/// Collapse `.` and `..` segments in one left-to-right pass. `..` never
/// climbs above the root.
pub fn remove_dot_segments(path: &[u16]) -> Vec<u16> {
    const ROOT: &[u16] = &[SLASH_UNIT];
    let mut input = path;
    let mut output = Vec::with_capacity(path.len());
    while !input.is_empty() {
        if starts(input, "../") {
            input = &input[3..];
        } else if starts(input, "./") || starts(input, "/./") {
            input = &input[2..];
        } else if is(input, "/.") {
            input = ROOT;
        } else if starts(input, "/../") {
            input = &input[3..];
            pop_segment(&mut output);
        } else if is(input, "/..") {
            input = ROOT;
            pop_segment(&mut output);
        } else if is(input, ".") || is(input, "..") {
            input = &[];
        } else {
            let lead = usize::from(input[0] == SLASH_UNIT);
            let end = input[lead..]
                .iter()
                .position(|&c| c == SLASH_UNIT)
                .map_or(input.len(), |p| p + lead);
            output.extend_from_slice(&input[..end]);
            input = &input[end..];
        }
    }
    output
}

/// A parsed reference borrowing its string's units.
#[derive(Clone, Copy, Default)]
pub(crate) struct Reference<'a> {
    pub scheme: Option<&'a [u16]>,
    pub authority: Option<&'a [u16]>,
    pub path: &'a [u16],
    pub query: Option<&'a [u16]>,
    pub fragment: Option<&'a [u16]>,
}

impl<'a> Reference<'a> {
    pub fn new(units: &'a [u16], ranges: &ComponentRanges) -> Self {
        let part = move |c| ranges.get(c).map(|r| &units[r.as_range()]);
        Self {
            scheme: part(Component::Scheme),
            authority: part(Component::NetLocation),
            path: part(Component::Path).unwrap_or_default(),
            query: part(Component::Query),
            fragment: part(Component::Fragment),
        }
    }
}

fn merge(base: &Reference<'_>, relative: &[u16]) -> Vec<u16> {
    let mut merged = Vec::with_capacity(base.path.len() + relative.len() + 1);
    if base.authority.is_some() && base.path.is_empty() {
        merged.push(SLASH_UNIT);
    } else if let Some(last) = base.path.iter().rposition(|&c| c == SLASH_UNIT) {
        merged.extend_from_slice(&base.path[..=last]);
    }
    merged.extend_from_slice(relative);
    merged
}

/// Target string for `relative` against an absolute `base`.
pub(crate) fn resolve(base: &Reference<'_>, relative: &Reference<'_>) -> Vec<u16> {
    let (scheme, authority, path, query) = if relative.scheme.is_some() {
        (
            relative.scheme,
            relative.authority,
            remove_dot_segments(relative.path),
            relative.query,
        )
    } else if relative.authority.is_some() {
        (
            base.scheme,
            relative.authority,
            remove_dot_segments(relative.path),
            relative.query,
        )
    } else if relative.path.is_empty() {
        (
            base.scheme,
            base.authority,
            base.path.to_vec(),
            relative.query.or(base.query),
        )
    } else if relative.path[0] == SLASH_UNIT {
        (
            base.scheme,
            base.authority,
            remove_dot_segments(relative.path),
            relative.query,
        )
    } else {
        (
            base.scheme,
            base.authority,
            remove_dot_segments(&merge(base, relative.path)),
            relative.query,
        )
    };
    recompose(scheme, authority, &path, query, relative.fragment)
}

fn recompose(
    scheme: Option<&[u16]>,
    authority: Option<&[u16]>,
    path: &[u16],
    query: Option<&[u16]>,
    fragment: Option<&[u16]>,
) -> Vec<u16> {
    let mut out = Vec::new();
    if let Some(scheme) = scheme {
        out.extend_from_slice(scheme);
        out.push(u16::from(b':'));
    }
    if let Some(authority) = authority {
        out.extend("//".encode_utf16());
        out.extend_from_slice(authority);
    }
    out.extend_from_slice(path);
    if let Some(query) = query {
        out.push(u16::from(b'?'));
        out.extend_from_slice(query);
    }
    if let Some(fragment) = fragment {
        out.push(u16::from(b'#'));
        out.extend_from_slice(fragment);
    }
    out
}
