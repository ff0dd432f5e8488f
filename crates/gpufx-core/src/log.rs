//! Engine log categories.
//!
//! Library code logs through `tracing` using one target per category (see
//! [`target`]). Which categories are shown is a plain configuration value,
//! [`LogCategories`], that the application turns into subscriber filter
//! directives. No global logger state lives here.
//!
//! ```rust
//! use gpufx_core::log::{LogCategories, LogCategory};
//!
//! let cats = LogCategories::parse("SHADER:MEMORY").unwrap();
//! assert!(cats.contains(LogCategory::Shader));
//! assert!(cats.contains(LogCategory::Error));
//! assert!(!cats.contains(LogCategory::Warning));
//! ```

use std::fmt;

use crate::error::{Error, Result};

/// Environment variable holding a colon-separated category list.
pub const LOG_CATEGORIES_ENV: &str = "GPUFX_LOG_CATEGORIES";

/// `tracing` targets, one per category.
pub mod target {
    pub const PROFILE: &str = "gpufx::profile";
    pub const PROFILE_VIDEO: &str = "gpufx::profile_video";
    pub const EVENTS: &str = "gpufx::events";
    pub const EVENTS2: &str = "gpufx::events2";
    pub const CONFIG: &str = "gpufx::config";
    pub const MEMORY: &str = "gpufx::memory";
    pub const APP: &str = "gpufx::app";
    pub const PLUGIN: &str = "gpufx::plugin";
    pub const PLAYER: &str = "gpufx::player";
    pub const SHADER: &str = "gpufx::shader";
    pub const DEPRECATION: &str = "gpufx::deprecation";
}

/// A single log category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    Profile,
    ProfileVideo,
    Events,
    Events2,
    Config,
    Warning,
    Error,
    Memory,
    App,
    Plugin,
    Player,
    Shader,
    Deprecation,
}

impl LogCategory {
    /// Every category, in bit order.
    pub const ALL: [LogCategory; 13] = [
        Self::Profile,
        Self::ProfileVideo,
        Self::Events,
        Self::Events2,
        Self::Config,
        Self::Warning,
        Self::Error,
        Self::Memory,
        Self::App,
        Self::Plugin,
        Self::Player,
        Self::Shader,
        Self::Deprecation,
    ];

    /// Flag bit.
    pub const fn bit(&self) -> u32 {
        match self {
            Self::Profile => 2,
            Self::ProfileVideo => 8,
            Self::Events => 16,
            Self::Events2 => 32,
            Self::Config => 64,
            Self::Warning => 128,
            Self::Error => 256,
            Self::Memory => 512,
            Self::App => 1024,
            Self::Plugin => 2048,
            Self::Player => 4096,
            Self::Shader => 8192,
            Self::Deprecation => 16384,
        }
    }

    /// Upper-case name as used in the environment variable.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Profile => "PROFILE",
            Self::ProfileVideo => "PROFILE_VIDEO",
            Self::Events => "EVENTS",
            Self::Events2 => "EVENTS2",
            Self::Config => "CONFIG",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Memory => "MEMORY",
            Self::App => "APP",
            Self::Plugin => "PLUGIN",
            Self::Player => "PLAYER",
            Self::Shader => "SHADER",
            Self::Deprecation => "DEPRECATION",
        }
    }

    /// `tracing` target, `None` for the two level-like categories.
    pub const fn target(&self) -> Option<&'static str> {
        match self {
            Self::Profile => Some(target::PROFILE),
            Self::ProfileVideo => Some(target::PROFILE_VIDEO),
            Self::Events => Some(target::EVENTS),
            Self::Events2 => Some(target::EVENTS2),
            Self::Config => Some(target::CONFIG),
            Self::Memory => Some(target::MEMORY),
            Self::App => Some(target::APP),
            Self::Plugin => Some(target::PLUGIN),
            Self::Player => Some(target::PLAYER),
            Self::Shader => Some(target::SHADER),
            Self::Deprecation => Some(target::DEPRECATION),
            Self::Warning | Self::Error => None,
        }
    }

    /// Parses an upper-case category name.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| Error::UnknownLogCategory(name.to_string()))
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of enabled categories with a push/pop stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogCategories {
    flags: u32,
    stack: Vec<u32>,
}

impl Default for LogCategories {
    fn default() -> Self {
        Self::from_flags(
            LogCategory::Error.bit()
                | LogCategory::Warning.bit()
                | LogCategory::App.bit()
                | LogCategory::Deprecation.bit(),
        )
    }
}

impl LogCategories {
    fn from_flags(flags: u32) -> Self {
        Self { flags, stack: Vec::new() }
    }

    /// Parses a colon-separated list.
    ///
    /// ERROR and APP are always on; everything listed is added to them.
    pub fn parse(list: &str) -> Result<Self> {
        let mut flags = LogCategory::Error.bit() | LogCategory::App.bit();
        for name in list.split(':').map(str::trim).filter(|s| !s.is_empty()) {
            flags |= LogCategory::from_name(name)?.bit();
        }
        Ok(Self::from_flags(flags))
    }

    /// Reads [`LOG_CATEGORIES_ENV`], falling back to the defaults when unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var(LOG_CATEGORIES_ENV) {
            Ok(list) => Self::parse(&list),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Raw flag bits.
    #[inline]
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Whether `category` is enabled.
    #[inline]
    pub fn contains(&self, category: LogCategory) -> bool {
        self.flags & category.bit() != 0
    }

    /// Enabled categories in bit order.
    pub fn iter(&self) -> impl Iterator<Item = LogCategory> + '_ {
        LogCategory::ALL.into_iter().filter(|c| self.contains(*c))
    }

    /// Replaces the set. ERROR and WARNING can't be switched off.
    pub fn set(&mut self, flags: u32) {
        self.flags = flags | LogCategory::Error.bit() | LogCategory::Warning.bit();
    }

    /// Saves the current set.
    pub fn push(&mut self) {
        self.stack.push(self.flags);
    }

    /// Restores the set saved by the matching [`push`](Self::push).
    pub fn pop(&mut self) -> Result<()> {
        self.flags = self.stack.pop().ok_or(Error::EmptyCategoryStack)?;
        Ok(())
    }

    /// `EnvFilter` directives, e.g. `warn,gpufx::shader=trace`.
    ///
    /// Shader warnings (lossy kernel clamping) stay visible even when
    /// WARNING is off.
    pub fn to_filter_directives(&self) -> String {
        let base = if self.contains(LogCategory::Warning) { "warn" } else { "error" };
        let mut out = String::from(base);
        for target in self.iter().filter_map(|c| c.target()) {
            out.push(',');
            out.push_str(target);
            out.push_str("=trace");
        }
        if base == "error" && !self.contains(LogCategory::Shader) {
            out.push(',');
            out.push_str(target::SHADER);
            out.push_str("=warn");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cats = LogCategories::default();
        assert!(cats.contains(LogCategory::Error));
        assert!(cats.contains(LogCategory::Warning));
        assert!(cats.contains(LogCategory::App));
        assert!(cats.contains(LogCategory::Deprecation));
        assert!(!cats.contains(LogCategory::Shader));
    }

    #[test]
    fn test_parse_list() {
        let cats = LogCategories::parse("CONFIG:SHADER").unwrap();
        let names: Vec<_> = cats.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["CONFIG", "ERROR", "APP", "SHADER"]);
    }

    #[test]
    fn test_parse_unknown() {
        let err = LogCategories::parse("SHADER:NOPE").unwrap_err();
        assert!(matches!(err, Error::UnknownLogCategory(ref n) if n == "NOPE"));
    }

    #[test]
    fn test_parse_empty_segments() {
        let cats = LogCategories::parse("").unwrap();
        assert_eq!(cats.flags(), LogCategory::Error.bit() | LogCategory::App.bit());
    }

    #[test]
    fn test_set_keeps_errors() {
        let mut cats = LogCategories::default();
        cats.set(LogCategory::Memory.bit());
        assert!(cats.contains(LogCategory::Memory));
        assert!(cats.contains(LogCategory::Error));
        assert!(cats.contains(LogCategory::Warning));
        assert!(!cats.contains(LogCategory::App));
    }

    #[test]
    fn test_push_pop() {
        let mut cats = LogCategories::default();
        let before = cats.flags();
        cats.push();
        cats.set(LogCategory::Profile.bit());
        assert_ne!(cats.flags(), before);
        cats.pop().unwrap();
        assert_eq!(cats.flags(), before);
        assert!(matches!(cats.pop(), Err(Error::EmptyCategoryStack)));
    }

    #[test]
    fn test_directives() {
        let cats = LogCategories::parse("SHADER").unwrap();
        assert_eq!(cats.to_filter_directives(), "error,gpufx::app=trace,gpufx::shader=trace");
        let d = LogCategories::default().to_filter_directives();
        assert!(d.starts_with("warn,"));
        assert!(d.contains("gpufx::deprecation=trace"));
        assert!(!d.contains("gpufx::shader=warn"));
    }

    #[test]
    fn test_directives_keep_shader_warnings() {
        let cats = LogCategories::parse("MEMORY").unwrap();
        assert!(!cats.contains(LogCategory::Warning));
        assert_eq!(
            cats.to_filter_directives(),
            "error,gpufx::memory=trace,gpufx::app=trace,gpufx::shader=warn"
        );
    }
}
