//! The catalog of rules a runner may be configured with.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::warn;

use crate::rule::{Rule, RuleContext, RuleError};
use crate::rules;

/// A named rule with its description and default options.
#[derive(Clone)]
pub struct RuleEntry {
    name: String,
    description: String,
    rule: Rc<dyn Rule>,
    options: Map<String, Value>,
}

impl RuleEntry {
    /// Creates an entry for `rule`.
    pub fn new(name: impl Into<String>, rule: impl Rule + 'static) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            rule: Rc::new(rule),
            options: Map::new(),
        }
    }

    /// Creates an entry for a closure rule.
    pub fn from_fn(
        name: impl Into<String>,
        rule: impl Fn(&str, RuleContext) -> Result<(), RuleError> + 'static,
    ) -> Self {
        Self::new(name, rule)
    }

    /// Sets the human-readable description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the default options, layered under the configured ones.
    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = options;
        self
    }

    /// Unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The rule itself.
    pub fn rule(&self) -> Rc<dyn Rule> {
        Rc::clone(&self.rule)
    }

    /// Default options.
    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }
}

impl fmt::Debug for RuleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleEntry")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Rules by name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: BTreeMap<String, RuleEntry>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in rules.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        rules::register_builtin(&mut registry);
        registry
    }

    /// Adds `entry`, replacing any entry with the same name. Entries with
    /// an empty name are skipped.
    pub fn register(&mut self, entry: RuleEntry) -> &mut Self {
        if entry.name.is_empty() {
            warn!("skipping rule registered without a name");
            return self;
        }
        self.entries.insert(entry.name.clone(), entry);
        self
    }

    /// Looks up a rule.
    pub fn get(&self, name: &str) -> Option<&RuleEntry> {
        self.entries.get(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Registered entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = &RuleEntry> {
        self.entries.values()
    }

    /// Number of registered rules.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no rule is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
