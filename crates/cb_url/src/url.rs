//! URL objects.
//!
//! A URL keeps its string, the component ranges found in it, and an
//! optional absolute base. Component accessors answer from the URL's own
//! string first and fall back along the base chain, so a relative URL can be
//! queried without resolving it.

use crate::component::{Component, ComponentRanges};
use crate::escape::{add_percent_escapes, replace_percent_escapes_using_encoding};
use crate::parse::{self, SLASH};
use crate::resolve::{self, Reference};
use cb_core::error::messages;
use cb_core::runtime::{HashCode, Object, ObjectRef, RuntimeClass, TypeId, create_instance, register_type};
use cb_core::{Allocator, CharRange, Error, Result};
use cb_text::{Encoding, StringRef};
use std::fmt;
use std::sync::OnceLock;

const SLASH_UNIT: u16 = SLASH as u16;
const DOT_UNIT: u16 = b'.' as u16;

/// Instance info bits.
pub mod flags {
    pub const CAN_BE_DECOMPOSED: u32 = 1;
}

pub struct UrlPayload {
    string: StringRef,
    base: Option<Url>,
    encoding: Encoding,
    ranges: ComponentRanges,
}

fn url_equal(a: &Object, b: &Object) -> bool {
    match (Url::borrow(a), Url::borrow(b)) {
        (Some(a), Some(b)) => a.string() == b.string() && a.base_url() == b.base_url(),
        _ => false,
    }
}

fn url_hash(object: &Object) -> HashCode {
    Url::borrow(object).map_or(0, |url| url.string().hash_code())
}

fn url_copy(allocator: &Allocator, object: &Object) -> Result<ObjectRef> {
    let url = Url::borrow(object).ok_or_else(|| Error::construction(messages::UNKNOWN_TYPE))?;
    let payload = url.payload();
    let copy = create_instance(
        Some(allocator),
        url_type_id(),
        UrlPayload {
            string: payload.string.copy(Some(allocator))?,
            base: payload.base.clone(),
            encoding: payload.encoding,
            ranges: payload.ranges,
        },
    )?;
    copy.set_info_bits(object.info());
    Ok(copy)
}

fn url_describe(object: &Object) -> String {
    match Url::borrow(object) {
        Some(url) => match url.base_url() {
            Some(base) => format!("{} -- {}", url.string(), base.as_object().describe()),
            None => url.string().to_string(),
        },
        None => String::new(),
    }
}

pub fn url_type_id() -> TypeId {
    static TYPE_ID: OnceLock<TypeId> = OnceLock::new();
    *TYPE_ID.get_or_init(|| {
        register_type(RuntimeClass {
            copy: Some(url_copy),
            equal: Some(url_equal),
            hash: Some(url_hash),
            describe: Some(url_describe),
            ..RuntimeClass::new("URL")
        })
    })
}

#[derive(Clone)]
pub struct Url(ObjectRef);

impl Url {
    pub fn from_object(object: ObjectRef) -> Option<Url> {
        object.is_a(url_type_id()).then_some(Url(object))
    }

    /// Retain `object` as a URL if it is one.
    pub fn borrow(object: &Object) -> Option<Url> {
        object.is_a(url_type_id()).then(|| Url(object.retain()))
    }

    pub fn as_object(&self) -> &ObjectRef {
        &self.0
    }

    pub fn into_object(self) -> ObjectRef {
        self.0
    }

    fn payload(&self) -> &UrlPayload {
        match self.0.payload::<UrlPayload>() {
            Some(payload) => payload,
            None => unreachable!("URL handle without a URL payload"),
        }
    }

    fn create(
        allocator: Option<&Allocator>,
        string: &StringRef,
        base: Option<&Url>,
        encoding: Encoding,
    ) -> Result<Url> {
        let ranges = parse::parse(string)?;
        let base = match base {
            Some(base) if !ranges.has(Component::Scheme) => Some(base.absolute_url()?),
            _ => None,
        };
        let decomposable = !ranges.has(Component::Scheme)
            || ranges
                .get(Component::ResourceSpecifier)
                .and_then(|r| string.character_at(r.location))
                == Some(SLASH_UNIT);
        let object = create_instance(
            allocator,
            url_type_id(),
            UrlPayload {
                string: string.copy(allocator)?,
                base,
                encoding,
                ranges,
            },
        )?;
        if decomposable {
            object.set_info_bits(flags::CAN_BE_DECOMPOSED);
        }
        Ok(Url(object))
    }

    /// Parse `string`. A base is kept (in absolute form) only when `string`
    /// has no scheme of its own.
    pub fn with_string(
        allocator: Option<&Allocator>,
        string: &StringRef,
        base: Option<&Url>,
    ) -> Result<Url> {
        Self::create(allocator, string, base, Encoding::Utf8)
    }

    pub fn with_str(allocator: Option<&Allocator>, s: &str, base: Option<&Url>) -> Result<Url> {
        Self::with_string(allocator, &StringRef::with_str(allocator, s)?, base)
    }

    /// Decode `bytes` and parse the result. `encoding` is also the encoding
    /// later used for percent escapes.
    pub fn with_bytes(
        allocator: Option<&Allocator>,
        bytes: &[u8],
        encoding: Encoding,
        base: Option<&Url>,
    ) -> Result<Url> {
        let string = StringRef::with_bytes(allocator, bytes, encoding, false)?;
        Self::create(allocator, &string, base, encoding)
    }

    pub fn absolute_with_bytes(
        allocator: Option<&Allocator>,
        bytes: &[u8],
        encoding: Encoding,
        base: Option<&Url>,
    ) -> Result<Url> {
        Self::with_bytes(allocator, bytes, encoding, base)?.absolute_url()
    }

    pub fn string(&self) -> &StringRef {
        &self.payload().string
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.payload().base.as_ref()
    }

    pub fn encoding(&self) -> Encoding {
        self.payload().encoding
    }

    pub fn allocator(&self) -> &Allocator {
        self.0.allocator()
    }

    fn ranges(&self) -> &ComponentRanges {
        &self.payload().ranges
    }

    /// Where `component` lies in this URL's own string, without consulting
    /// the base.
    pub fn component_range(&self, component: Component) -> Option<CharRange> {
        self.ranges().get(component)
    }

    /// Resolve against the base. A URL without a base is returned retained.
    pub fn absolute_url(&self) -> Result<Url> {
        let Some(base) = self.base_url() else {
            return Ok(self.clone());
        };
        let relative_units = self.string().to_utf16();
        let base_units = base.string().to_utf16();
        let target = resolve::resolve(
            &Reference::new(&base_units, base.ranges()),
            &Reference::new(&relative_units, self.ranges()),
        );
        let allocator = self.allocator();
        let string = StringRef::with_characters(Some(allocator), &target)?;
        Self::create(Some(allocator), &string, None, self.encoding())
    }

    /// First URL along the base chain whose own string has `component`.
    /// The walk stops at the configured depth.
    fn owner_of(&self, component: Component) -> Option<(&Url, CharRange)> {
        let limit = cb_core::config().max_base_url_depth;
        let mut url = self;
        for _ in 0..=limit {
            if let Some(range) = url.ranges().get(component) {
                return Some((url, range));
            }
            url = url.base_url()?;
        }
        log::warn!("{} while looking up the {component}", messages::BASE_TOO_DEEP);
        None
    }

    fn component(&self, component: Component) -> Option<StringRef> {
        let (url, range) = self.owner_of(component)?;
        StringRef::with_substring(Some(url.allocator()), url.string(), range).ok()
    }

    fn unescaped_component(
        &self,
        component: Component,
        leave_escaped: Option<&StringRef>,
    ) -> Option<StringRef> {
        let raw = self.component(component)?;
        match replace_percent_escapes_using_encoding(
            Some(self.allocator()),
            &raw,
            leave_escaped,
            self.encoding(),
        ) {
            Ok(unescaped) => Some(unescaped),
            Err(err) => {
                log::debug!("{component} of {}: {err}", self.string());
                None
            }
        }
    }

    pub fn scheme(&self) -> Option<StringRef> {
        self.component(Component::Scheme)
    }

    pub fn net_location(&self) -> Option<StringRef> {
        self.component(Component::NetLocation)
    }

    pub fn host(&self) -> Option<StringRef> {
        self.component(Component::Host)
    }

    pub fn user(&self) -> Option<StringRef> {
        self.component(Component::User)
    }

    pub fn password(&self) -> Option<StringRef> {
        self.component(Component::Password)
    }

    pub fn path(&self) -> Option<StringRef> {
        self.component(Component::Path)
    }

    /// Everything after the scheme.
    pub fn resource_specifier(&self) -> Option<StringRef> {
        self.component(Component::ResourceSpecifier)
    }

    /// Query without the `?`. Escapes are decoded unless listed in
    /// `leave_escaped`; `None` returns the query as written.
    pub fn query(&self, leave_escaped: Option<&StringRef>) -> Option<StringRef> {
        self.unescaped_component(Component::Query, leave_escaped)
    }

    pub fn fragment(&self, leave_escaped: Option<&StringRef>) -> Option<StringRef> {
        self.unescaped_component(Component::Fragment, leave_escaped)
    }

    /// The parser reserves this slot without filling it, so this is `None`
    /// for parsed URLs.
    pub fn parameter_string(&self, leave_escaped: Option<&StringRef>) -> Option<StringRef> {
        self.unescaped_component(Component::ParameterString, leave_escaped)
    }

    /// The path without a leading `/`, and whether it had one.
    pub fn strict_path(&self) -> Option<(StringRef, bool)> {
        let path = self.path()?;
        if path.character_at(0) != Some(SLASH_UNIT) {
            return Some((path, false));
        }
        let rest = CharRange::new(1, path.len() - 1);
        let stripped = StringRef::with_substring(Some(self.allocator()), &path, rest).ok()?;
        Some((stripped, true))
    }

    pub fn last_path_component(&self) -> Option<StringRef> {
        let path = self.path()?.to_utf16();
        let (body, _) = split_trailing_slash(&path);
        let start = match body.iter().rposition(|&c| c == SLASH_UNIT) {
            Some(i) if body.len() > 1 => i + 1,
            _ => 0,
        };
        let component = &body[start..];
        StringRef::with_characters(Some(self.allocator()), component).ok()
    }

    /// Text after the last `.` of the last path component. A leading dot
    /// does not start an extension.
    pub fn path_extension(&self) -> Option<StringRef> {
        let component = self.last_path_component()?.to_utf16();
        let dot = extension_dot(&component)?;
        StringRef::with_characters(Some(self.allocator()), &component[dot + 1..]).ok()
    }

    /// Port number, if the URL (or its base) names a valid one.
    pub fn port_number(&self) -> Option<u16> {
        let port = self.component(Component::Port)?.to_string();
        port.strip_prefix(':')?.parse().ok()
    }

    pub fn has_directory_path(&self) -> bool {
        self.path()
            .is_some_and(|path| !path.is_empty() && path.character_at(path.len() - 1) == Some(SLASH_UNIT))
    }

    /// Whether the URL is hierarchical: scheme-less, or with a resource
    /// specifier starting at `/`.
    pub fn can_be_decomposed(&self) -> bool {
        let limit = cb_core::config().max_base_url_depth;
        let mut url = self;
        for _ in 0..=limit {
            if url.0.info() & flags::CAN_BE_DECOMPOSED != 0 {
                return true;
            }
            match url.base_url() {
                Some(base) => url = base,
                None => return false,
            }
        }
        false
    }

    /// Rebuild this URL with its path rewritten by `rewrite`. Without a path
    /// the new one is inserted where a path would begin.
    fn with_path(
        &self,
        allocator: Option<&Allocator>,
        rewrite: impl FnOnce(&[u16]) -> Result<Vec<u16>>,
    ) -> Result<Url> {
        let units = self.string().to_utf16();
        let ranges = self.ranges();
        let at = ranges.get(Component::Path).unwrap_or_else(|| {
            let start = ranges
                .get(Component::NetLocation)
                .map(|r| r.end())
                .or_else(|| ranges.get(Component::Scheme).map(|r| r.end() + 1))
                .unwrap_or(0);
            CharRange::new(start, 0)
        });
        let path = rewrite(&units[at.as_range()])?;
        let mut rebuilt = Vec::with_capacity(units.len() + path.len());
        rebuilt.extend_from_slice(&units[..at.location]);
        rebuilt.extend_from_slice(&path);
        rebuilt.extend_from_slice(&units[at.end()..]);
        let string = StringRef::with_characters(allocator, &rebuilt)?;
        Self::create(allocator, &string, self.base_url(), self.encoding())
    }

    pub fn appending_path_component(
        &self,
        allocator: Option<&Allocator>,
        component: &StringRef,
        is_directory: bool,
    ) -> Result<Url> {
        let component = component.to_utf16();
        let rooted = self.ranges().has(Component::NetLocation);
        self.with_path(allocator, |path| {
            let mut out = path.to_vec();
            if out.last().map_or(rooted, |&c| c != SLASH_UNIT) {
                out.push(SLASH_UNIT);
            }
            out.extend_from_slice(&component);
            if is_directory && out.last() != Some(&SLASH_UNIT) {
                out.push(SLASH_UNIT);
            }
            Ok(out)
        })
    }

    pub fn appending_path_extension(
        &self,
        allocator: Option<&Allocator>,
        extension: &StringRef,
    ) -> Result<Url> {
        let extension = extension.to_utf16();
        self.with_path(allocator, |path| {
            let (body, slash) = split_trailing_slash(path);
            if body.is_empty() || body.last() == Some(&SLASH_UNIT) {
                return Err(Error::construction(messages::NO_PATH_COMPONENT));
            }
            let mut out = body.to_vec();
            out.push(DOT_UNIT);
            out.extend_from_slice(&extension);
            out.extend_from_slice(slash);
            Ok(out)
        })
    }

    /// Drop the last path component, keeping the `/` before it. A relative
    /// single-component path becomes `./`.
    pub fn deleting_last_path_component(&self, allocator: Option<&Allocator>) -> Result<Url> {
        self.with_path(allocator, |path| {
            let (body, _) = split_trailing_slash(path);
            if body.is_empty() || body == [SLASH_UNIT] {
                return Ok(path.to_vec());
            }
            Ok(match body.iter().rposition(|&c| c == SLASH_UNIT) {
                Some(i) => body[..=i].to_vec(),
                None => "./".encode_utf16().collect(),
            })
        })
    }

    pub fn deleting_path_extension(&self, allocator: Option<&Allocator>) -> Result<Url> {
        self.with_path(allocator, |path| {
            let (body, slash) = split_trailing_slash(path);
            let start = body.iter().rposition(|&c| c == SLASH_UNIT).map_or(0, |i| i + 1);
            let mut out = match extension_dot(&body[start..]) {
                Some(dot) => body[..start + dot].to_vec(),
                None => body.to_vec(),
            };
            out.extend_from_slice(slash);
            Ok(out)
        })
    }

    /// Absolute form encoded in `encoding`. With `escape_whitespace` the
    /// string first goes through [`add_percent_escapes`] with whitespace as
    /// the extra set, so characters outside the URI sets (`%` included) are
    /// escaped too.
    pub fn to_bytes(&self, encoding: Encoding, escape_whitespace: bool) -> Result<Vec<u8>> {
        let absolute = self.absolute_url()?;
        let mut string = absolute.string().clone();
        if escape_whitespace {
            let whitespace = StringRef::with_static_ascii(None, " \r\n\t")?;
            string = add_percent_escapes(None, &string, None, Some(&whitespace), encoding)?;
        }
        string
            .external_representation(encoding, None)
            .ok_or_else(|| Error::construction(messages::INVALID_ENCODING))
    }
}

/// Split one trailing `/` off a path, leaving a lone root alone.
fn split_trailing_slash(path: &[u16]) -> (&[u16], &[u16]) {
    match path.split_last() {
        Some((&SLASH_UNIT, body)) if !body.is_empty() => (body, &path[path.len() - 1..]),
        _ => (path, &[]),
    }
}

fn extension_dot(component: &[u16]) -> Option<usize> {
    let dot = component.iter().rposition(|&c| c == DOT_UNIT)?;
    (dot > 0 && dot + 1 < component.len()).then_some(dot)
}

impl PartialEq for Url {
    fn eq(&self, other: &Url) -> bool {
        self.0 == other.0
    }
}

impl Eq for Url {}

impl std::hash::Hash for Url {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.string(), f)
    }
}

impl fmt::Debug for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.describe())
    }
}
