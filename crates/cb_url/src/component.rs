use cb_core::CharRange;
use std::fmt;

/// The twelve component slots a URL records, numbered from 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Component {
    Scheme = 1,
    NetLocation,
    Path,
    ResourceSpecifier,
    User,
    Password,
    UserInfo,
    Host,
    Port,
    ParameterString,
    Query,
    Fragment,
}

impl Component {
    pub const ALL: [Component; 12] = [
        Component::Scheme,
        Component::NetLocation,
        Component::Path,
        Component::ResourceSpecifier,
        Component::User,
        Component::Password,
        Component::UserInfo,
        Component::Host,
        Component::Port,
        Component::ParameterString,
        Component::Query,
        Component::Fragment,
    ];

    fn slot(self) -> usize {
        self as usize - 1
    }

    pub fn name(self) -> &'static str {
        match self {
            Component::Scheme => "scheme",
            Component::NetLocation => "net location",
            Component::Path => "path",
            Component::ResourceSpecifier => "resource specifier",
            Component::User => "user",
            Component::Password => "password",
            Component::UserInfo => "user info",
            Component::Host => "host",
            Component::Port => "port",
            Component::ParameterString => "parameter string",
            Component::Query => "query",
            Component::Fragment => "fragment",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where each component sits in a URL string. `None` means the string does
/// not carry that component itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ComponentRanges([Option<CharRange>; 12]);

impl ComponentRanges {
    pub fn get(&self, component: Component) -> Option<CharRange> {
        self.0[component.slot()]
    }

    pub fn set(&mut self, component: Component, range: impl Into<CharRange>) {
        self.0[component.slot()] = Some(range.into());
    }

    pub fn has(&self, component: Component) -> bool {
        self.get(component).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Component, CharRange)> + '_ {
        Component::ALL
            .into_iter()
            .filter_map(|c| self.get(c).map(|r| (c, r)))
    }
}
