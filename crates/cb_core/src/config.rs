use std::sync::OnceLock;

/// Process-wide tunables. Set once with [`configure`] before first use.
#[derive(Clone, Copy, Debug)]
pub struct RuntimeConfig {
    /// How many relative-URL bases an accessor follows before giving up.
    pub max_base_url_depth: usize,
    /// Initial capacity of a mutable string created without a hint.
    pub default_string_capacity: usize,
    /// Emit a warning when a lenient mutator ignores its arguments.
    pub warn_on_lenient_noop: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_base_url_depth: 32,
            default_string_capacity: 16,
            warn_on_lenient_noop: true,
        }
    }
}

static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// Install the process configuration. Returns `false` if one was already in
/// effect, either from an earlier call or from a read through [`config`].
pub fn configure(config: RuntimeConfig) -> bool {
    let installed = CONFIG.set(config).is_ok();
    if installed {
        log::debug!("runtime configured: {config:?}");
    }
    installed
}

pub fn config() -> &'static RuntimeConfig {
    CONFIG.get_or_init(RuntimeConfig::default)
}
