//! Built-in rules.

pub mod img;

use crate::registry::Registry;

/// Registers every built-in rule.
pub fn register_builtin(registry: &mut Registry) {
    registry.register(img::entry());
}
