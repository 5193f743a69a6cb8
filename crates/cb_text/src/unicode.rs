//! Unicode text service: case mapping, normalization, transliteration and
//! whitespace classification.
//!
//! Services follow a fill-the-buffer protocol. A destination that is too small
//! is reported as [`ServiceError::BufferTooSmall`] with the size that would
//! have been needed, so callers can grow once and retry.

use std::borrow::Cow;
use std::char::REPLACEMENT_CHARACTER;
use std::fmt;
use std::sync::OnceLock;
use unicode_normalization::char::canonical_combining_class;
use unicode_normalization::{
    IsNormalized, UnicodeNormalization, is_nfc_quick, is_nfd_quick, is_nfkc_quick, is_nfkd_quick,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceError {
    BufferTooSmall { needed: usize },
    Failed(Cow<'static, str>),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::BufferTooSmall { needed } => {
                write!(f, "buffer too small, {needed} units needed")
            }
            ServiceError::Failed(reason) => f.write_str(reason),
        }
    }
}

impl std::error::Error for ServiceError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CaseOperation {
    /// First letter of each word upper, the rest lower.
    Capitalize,
    Lowercase,
    Uppercase,
    /// Full Unicode case folding, for caseless matching.
    Fold,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NormalizationForm {
    D,
    KD,
    C,
    KC,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QuickCheck {
    Yes,
    No,
    Maybe,
}

/// Identifiers understood by [`StdTextService::transliterate`].
pub mod transforms {
    pub const TO_UPPER: &str = "Any-Upper";
    pub const TO_LOWER: &str = "Any-Lower";
    pub const TO_TITLE: &str = "Any-Title";
    pub const TO_NFC: &str = "Any-NFC";
    pub const TO_NFD: &str = "Any-NFD";
    pub const TO_NFKC: &str = "Any-NFKC";
    pub const TO_NFKD: &str = "Any-NFKD";
    pub const LATIN_TO_ASCII: &str = "Latin-ASCII";
    pub const STRIP_COMBINING_MARKS: &str = "NFD; [:Nonspacing Mark:] Remove; NFC";
    pub const FULLWIDTH_HALFWIDTH: &str = "Fullwidth-Halfwidth";
    pub const TO_HEX: &str = "Any-Hex";
    pub const TO_XML_HEX: &str = "Any-Hex/XML";
}

pub trait TextService: Send + Sync {
    /// Map `src` into `dst`, returning the number of units written.
    fn case_map(&self, op: CaseOperation, src: &[u16], dst: &mut [u16]) -> Result<usize, ServiceError>;

    fn quick_check(&self, form: NormalizationForm, src: &[u16]) -> QuickCheck;

    fn normalize(&self, form: NormalizationForm, src: &[u16], dst: &mut [u16]) -> Result<usize, ServiceError>;

    /// Apply the transform named `id`. Unknown identifiers and transforms
    /// without an inverse fail.
    fn transliterate(&self, id: &str, reverse: bool, src: &[u16]) -> Result<Vec<u16>, ServiceError>;

    fn is_whitespace(&self, code_point: u32) -> bool {
        char::from_u32(code_point).is_some_and(char::is_whitespace)
    }
}

/// Built on the standard library's case tables, `caseless` folding and
/// `unicode-normalization`.
pub struct StdTextService;

/// The process-wide service used by mutating string operations.
pub fn text_service() -> &'static dyn TextService {
    static SERVICE: OnceLock<StdTextService> = OnceLock::new();
    SERVICE.get_or_init(|| StdTextService)
}

/// Either a run of valid characters or one unpaired surrogate.
enum Piece {
    Text(String),
    Lone(u16),
}

fn pieces(src: &[u16]) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut text = String::new();
    for decoded in char::decode_utf16(src.iter().copied()) {
        match decoded {
            Ok(c) => text.push(c),
            Err(e) => {
                if !text.is_empty() {
                    pieces.push(Piece::Text(std::mem::take(&mut text)));
                }
                pieces.push(Piece::Lone(e.unpaired_surrogate()));
            }
        }
    }
    if !text.is_empty() {
        pieces.push(Piece::Text(text));
    }
    pieces
}

fn rebuild(pieces: Vec<Piece>, mut map: impl FnMut(&str) -> String) -> Vec<u16> {
    let mut out = Vec::new();
    for piece in pieces {
        match piece {
            Piece::Text(text) => out.extend(map(&text).encode_utf16()),
            Piece::Lone(unit) => out.push(unit),
        }
    }
    out
}

fn capitalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if c.is_whitespace() {
            out.push(c);
            at_word_start = true;
        } else if at_word_start {
            out.extend(c.to_uppercase());
            at_word_start = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

fn fill(result: &[u16], dst: &mut [u16]) -> Result<usize, ServiceError> {
    if result.len() > dst.len() {
        return Err(ServiceError::BufferTooSmall {
            needed: result.len(),
        });
    }
    dst[..result.len()].copy_from_slice(result);
    Ok(result.len())
}

fn chars_lossy(src: &[u16]) -> impl Iterator<Item = char> + '_ {
    char::decode_utf16(src.iter().copied()).map(|c| c.unwrap_or(REPLACEMENT_CHARACTER))
}

fn normalized(form: NormalizationForm, text: &str) -> String {
    match form {
        NormalizationForm::D => text.nfd().collect(),
        NormalizationForm::KD => text.nfkd().collect(),
        NormalizationForm::C => text.nfc().collect(),
        NormalizationForm::KC => text.nfkc().collect(),
    }
}

fn strip_marks(text: &str) -> String {
    text.nfd()
        .filter(|c| canonical_combining_class(*c) == 0)
        .nfc()
        .collect()
}

fn latin_to_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in strip_marks(text).chars() {
        match c {
            'ß' => out.push_str("ss"),
            'æ' => out.push_str("ae"),
            'Æ' => out.push_str("AE"),
            'œ' => out.push_str("oe"),
            'Œ' => out.push_str("OE"),
            'ø' => out.push('o'),
            'Ø' => out.push('O'),
            'đ' => out.push('d'),
            'Đ' => out.push('D'),
            'ł' => out.push('l'),
            'Ł' => out.push('L'),
            'þ' => out.push_str("th"),
            'Þ' => out.push_str("TH"),
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201C}' | '\u{201D}' => out.push('"'),
            '\u{2013}' | '\u{2014}' => out.push('-'),
            _ => out.push(c),
        }
    }
    out
}

fn fullwidth_to_halfwidth(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{3000}' => ' ',
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            _ => c,
        })
        .collect()
}

fn halfwidth_to_fullwidth(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            ' ' => '\u{3000}',
            '!'..='~' => char::from_u32(c as u32 + 0xFEE0).unwrap_or(c),
            _ => c,
        })
        .collect()
}

fn to_hex(src: &[u16], xml: bool) -> Vec<u16> {
    let mut out = String::new();
    for decoded in char::decode_utf16(src.iter().copied()) {
        let value = match decoded {
            Ok(c) => c as u32,
            Err(e) => u32::from(e.unpaired_surrogate()),
        };
        if xml {
            out.push_str(&format!("&#x{value:X};"));
        } else if value > 0xFFFF {
            out.push_str(&format!("\\U{value:08X}"));
        } else {
            out.push_str(&format!("\\u{value:04X}"));
        }
    }
    out.encode_utf16().collect()
}

/// Inverse of [`to_hex`]; text that is not an escape passes through.
fn from_hex(src: &[u16], xml: bool) -> Vec<u16> {
    let text: String = chars_lossy(src).collect();
    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();
    while !rest.is_empty() {
        let parsed = if xml {
            rest.strip_prefix("&#x").and_then(|body| {
                let end = body.find(';')?;
                let value = u32::from_str_radix(&body[..end], 16).ok()?;
                Some((char::from_u32(value)?, 3 + end + 1))
            })
        } else {
            let (digits, prefix) = if rest.starts_with("\\U") {
                (8, 2)
            } else if rest.starts_with("\\u") {
                (4, 2)
            } else {
                (0, 0)
            };
            (digits > 0)
                .then(|| rest.get(prefix..prefix + digits))
                .flatten()
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .and_then(char::from_u32)
                .map(|c| (c, prefix + digits))
        };
        match parsed {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                let mut chars = rest.chars();
                if let Some(c) = chars.next() {
                    out.push(c);
                }
                rest = chars.as_str();
            }
        }
    }
    out.encode_utf16().collect()
}

fn no_inverse(id: &str) -> ServiceError {
    ServiceError::Failed(Cow::Owned(format!("transform `{id}` has no inverse")))
}

impl TextService for StdTextService {
    fn case_map(&self, op: CaseOperation, src: &[u16], dst: &mut [u16]) -> Result<usize, ServiceError> {
        let mapped = rebuild(pieces(src), |text| match op {
            CaseOperation::Capitalize => capitalize(text),
            CaseOperation::Lowercase => text.to_lowercase(),
            CaseOperation::Fold => caseless::default_case_fold_str(text),
            CaseOperation::Uppercase => text.to_uppercase(),
        });
        fill(&mapped, dst)
    }

    fn quick_check(&self, form: NormalizationForm, src: &[u16]) -> QuickCheck {
        let chars = chars_lossy(src);
        let answer = match form {
            NormalizationForm::D => is_nfd_quick(chars),
            NormalizationForm::KD => is_nfkd_quick(chars),
            NormalizationForm::C => is_nfc_quick(chars),
            NormalizationForm::KC => is_nfkc_quick(chars),
        };
        match answer {
            IsNormalized::Yes => QuickCheck::Yes,
            IsNormalized::No => QuickCheck::No,
            IsNormalized::Maybe => QuickCheck::Maybe,
        }
    }

    fn normalize(&self, form: NormalizationForm, src: &[u16], dst: &mut [u16]) -> Result<usize, ServiceError> {
        let result = rebuild(pieces(src), |text| normalized(form, text));
        fill(&result, dst)
    }

    fn transliterate(&self, id: &str, reverse: bool, src: &[u16]) -> Result<Vec<u16>, ServiceError> {
        let text_map = |f: fn(&str) -> String| Ok(rebuild(pieces(src), f));
        match (id, reverse) {
            (transforms::TO_UPPER, false) => text_map(|t| t.to_uppercase()),
            (transforms::TO_LOWER, false) => text_map(|t| t.to_lowercase()),
            (transforms::TO_TITLE, false) => text_map(capitalize),
            ("Any-NFC" | "NFC", false) => text_map(|t| normalized(NormalizationForm::C, t)),
            ("Any-NFD" | "NFD", false) => text_map(|t| normalized(NormalizationForm::D, t)),
            ("Any-NFKC" | "NFKC", false) => text_map(|t| normalized(NormalizationForm::KC, t)),
            ("Any-NFKD" | "NFKD", false) => text_map(|t| normalized(NormalizationForm::KD, t)),
            (transforms::LATIN_TO_ASCII, false) => text_map(latin_to_ascii),
            (transforms::STRIP_COMBINING_MARKS, false) => text_map(strip_marks),
            (transforms::FULLWIDTH_HALFWIDTH, false) => text_map(fullwidth_to_halfwidth),
            (transforms::FULLWIDTH_HALFWIDTH, true) => text_map(halfwidth_to_fullwidth),
            (transforms::TO_HEX, false) => Ok(to_hex(src, false)),
            (transforms::TO_HEX, true) | ("Hex-Any", false) => Ok(from_hex(src, false)),
            (transforms::TO_XML_HEX, false) => Ok(to_hex(src, true)),
            (transforms::TO_XML_HEX, true) | ("Hex-Any/XML", false) => Ok(from_hex(src, true)),
            (
                transforms::TO_UPPER
                | transforms::TO_LOWER
                | transforms::TO_TITLE
                | transforms::LATIN_TO_ASCII
                | transforms::STRIP_COMBINING_MARKS,
                true,
            ) => Err(no_inverse(id)),
            _ => Err(ServiceError::Failed(Cow::Owned(format!(
                "unknown transform `{id}`"
            )))),
        }
    }
}
