//! Run settings from the process environment
//!
//! The environment is read once at startup into [`RunSettings`]; nothing
//! below `main` consults environment variables directly.

use std::collections::BTreeMap;
use std::env;

/// Settings derived from the invoking environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSettings {
    /// Raw `CI` value, forwarded to test commands
    pub ci: Option<String>,
    /// Raw `RUST_BACKTRACE` value, forwarded to test commands
    pub rust_backtrace: Option<String>,
    /// Disable colored output (NO_COLOR, or CI)
    pub no_color: bool,
}

impl RunSettings {
    /// Load settings from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let ci = lookup("CI").filter(|v| !v.is_empty());
        let no_color = lookup("NO_COLOR").is_some_and(|v| !v.is_empty()) || is_truthy(ci.as_deref());

        Self {
            ci,
            rust_backtrace: lookup("RUST_BACKTRACE").filter(|v| !v.is_empty()),
            no_color,
        }
    }

    /// Running under continuous integration (`CI=1|true|yes`)
    pub fn is_ci(&self) -> bool {
        is_truthy(self.ci.as_deref())
    }

    /// Echo build logs and full diagnostics (`RUST_BACKTRACE` other than `0`)
    pub fn full_diagnostics(&self) -> bool {
        self.rust_backtrace.as_deref().is_some_and(|v| v != "0")
    }

    /// Log filter used when `RUST_LOG` is unset
    pub fn default_log_level(&self) -> &'static str {
        if self.is_ci() {
            "info"
        } else {
            "warn"
        }
    }

    /// Variables passed through to every test and build command
    pub fn forwarded_env(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        if let Some(ci) = &self.ci {
            vars.insert("CI".to_string(), ci.clone());
        }
        if let Some(backtrace) = &self.rust_backtrace {
            vars.insert("RUST_BACKTRACE".to_string(), backtrace.clone());
        }
        vars
    }
}

fn is_truthy(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_lowercase()).as_deref(),
        Some("1" | "true" | "yes")
    )
}
