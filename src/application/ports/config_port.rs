//! Configuration lookup port (spec §4.1, component A).

use rust_decimal::Decimal;

/// Typed dot-path lookup over the layered configuration tree.
///
/// Implementations resolve the environment overlay before falling back
/// to the file tree, per §4.1's precedence rule.
pub trait ConfigLookup: Send + Sync {
    /// String lookup; returns `default` if the path cannot be resolved.
    fn get_string(&self, key_path: &str, default: &str) -> String;

    /// Decimal lookup; returns `default` if absent or unparsable.
    fn get_decimal(&self, key_path: &str, default: Decimal) -> Decimal;

    /// String-list lookup; returns an empty vec if absent.
    fn get_string_list(&self, key_path: &str) -> Vec<String>;
}
