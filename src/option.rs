//! The [`Option`] data type and option sequences.
//!
//! Grounded on `include/versioningCompiler/Option.hpp`: equality and ordering are
//! both defined over the *rendered* form `prefix + value`, not over the tag, so that
//! two options are interchangeable for a backend exactly when they'd produce the
//! same flag text.

use std::fmt;

/// A single compiler/optimiser flag: a dedup/removal key (`tag`), a prefix
/// (`"-O"`, `"-D"`, `"--std="`, ...) and a value (`"3"`, `"FLAG=1"`, ...).
///
/// Options are immutable once created.
#[derive(Debug, Clone, Eq)]
pub struct Opt {
    tag: String,
    prefix: String,
    value: String,
}

impl Opt {
    pub fn new(
        tag: impl Into<String>,
        prefix: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            tag: tag.into(),
            prefix: prefix.into(),
            value: value.into(),
        }
    }

    /// Convenience constructor for a flag with no value, e.g. `-DFOO`.
    pub fn flag(tag: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::new(tag, prefix, "")
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// The form a backend renders onto its invocation: `prefix + value`.
    pub fn rendered(&self) -> String {
        format!("{}{}", self.prefix, self.value)
    }
}

impl PartialEq for Opt {
    fn eq(&self, other: &Self) -> bool {
        self.rendered() == other.rendered()
    }
}

impl PartialOrd for Opt {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Opt {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rendered().cmp(&other.rendered())
    }
}

impl fmt::Display for Opt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rendered())
    }
}

/// An ordered sequence of [`Opt`]s. Order is preserved because compiler flags are
/// order-sensitive (`-O0 -O3` differs from `-O3 -O0`).
pub type OptList = Vec<Opt>;

/// Removes every [`Opt`] in `list` whose tag equals `tag`, preserving relative order
/// of the remaining entries. Used by `VersionBuilder::remove_option` and friends.
pub fn remove_by_tag(list: &mut OptList, tag: &str) {
    list.retain(|o| o.tag() != tag);
}

/// The tag and prefix conventionally used for function-visibility macro defines
/// (see `Version::function_flags` in the data model).
pub const FUNCTION_FLAG_TAG: &str = "enable_define";
pub const FUNCTION_FLAG_PREFIX: &str = "-D";

/// Builds the `-D name=value` shaped [`Opt`] for `VersionBuilder::add_define`.
pub fn define_opt(name: &str, value: impl fmt::Display) -> Opt {
    Opt::new(
        FUNCTION_FLAG_TAG,
        FUNCTION_FLAG_PREFIX,
        format!("{name}={value}"),
    )
}

/// Builds the bare `-D flag` shaped [`Opt`] for `VersionBuilder::add_function_flag`.
pub fn function_flag_opt(flag: &str) -> Opt {
    Opt::new(FUNCTION_FLAG_TAG, FUNCTION_FLAG_PREFIX, flag.to_string())
}
