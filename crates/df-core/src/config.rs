use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Counted loops and fixed element lists up to this many iterations are unrolled.
pub const MAX_UNROLL_SIZE: usize = 3;
/// Array initializer elements beyond this index are written through a temp instead of element places.
pub const MAX_ARRAY_INDEX_FOR_INITIALIZER: usize = 32;

fn parse_flag(val: &str) -> bool {
    let trimmed = val.trim();
    !trimmed.is_empty() && !matches!(trimmed, "0" | "false" | "FALSE" | "False")
}

fn bool_from_env(key: &str) -> bool {
    std::env::var(key).is_ok_and(|val| parse_flag(&val))
}

fn usize_from_env(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|val| val.trim().parse().ok())
}

pub fn max_unroll_override() -> Option<usize> {
    static UNROLL: OnceLock<Option<usize>> = OnceLock::new();
    *UNROLL.get_or_init(|| usize_from_env("DF_MAX_UNROLL"))
}

pub fn inlining_disabled() -> bool {
    static NO_INLINE: OnceLock<bool> = OnceLock::new();
    *NO_INLINE.get_or_init(|| bool_from_env("DF_NO_INLINE"))
}

pub fn trace_flows() -> bool {
    static TRACE: OnceLock<bool> = OnceLock::new();
    *TRACE.get_or_init(|| bool_from_env("DF_TRACE_FLOW"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowOptions {
    pub max_unroll: usize,
    pub max_array_index_for_initializer: usize,
    /// Try the registered call inliners before emitting an opaque call.
    pub inline_calls: bool,
    /// Inline lambdas passed to functional calls when their body allows it.
    pub inline_closures: bool,
}

impl FlowOptions {
    /// Defaults with the `DF_MAX_UNROLL` and `DF_NO_INLINE` overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_overrides(max_unroll_override(), inlining_disabled())
    }

    pub fn with_overrides(mut self, max_unroll: Option<usize>, no_inline: bool) -> Self {
        if let Some(max_unroll) = max_unroll {
            self.max_unroll = max_unroll;
        }
        if no_inline {
            self.inline_calls = false;
        }
        self
    }
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            max_unroll: MAX_UNROLL_SIZE,
            max_array_index_for_initializer: MAX_ARRAY_INDEX_FOR_INITIALIZER,
            inline_calls: true,
            inline_closures: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn overrides_replace_the_defaults() {
        let options = FlowOptions::default().with_overrides(Some(7), true);
        assert_eq!(options.max_unroll, 7);
        assert!(!options.inline_calls);
        assert!(options.inline_closures);
        assert_eq!(
            FlowOptions::default().with_overrides(None, false),
            FlowOptions::default()
        );
    }

    #[test]
    fn flag_values() {
        assert!(parse_flag("1"));
        assert!(parse_flag(" yes "));
        assert!(!parse_flag(""));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("false"));
    }
}
