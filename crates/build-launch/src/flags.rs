//! Translation of named options into command-line flags.
//!
//! A switch set to `true` becomes `--option-name`, a switch set to `false`
//! is omitted, and a valued option becomes `--option-name value`.
//! Underscores in option names are rendered as hyphens.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Value of a single named option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Switch(bool),
    Value(String),
}

/// Ordered collection of named options for one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, FlagValue>", into = "BTreeMap<String, FlagValue>")]
pub struct FlagSet {
    entries: Vec<(String, FlagValue)>,
}

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bare flag, rendered only when `enabled`.
    pub fn switch(mut self, name: &str, enabled: bool) -> Self {
        self.set(name, FlagValue::Switch(enabled));
        self
    }

    pub fn value(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.set(name, FlagValue::Value(value.to_string()));
        self
    }

    /// Add a valued flag when `value` is present, otherwise nothing.
    pub fn opt_value<T: fmt::Display>(self, name: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.value(name, v),
            None => self,
        }
    }

    /// Append all options of `other`, replacing any with the same name.
    pub fn extend(mut self, other: &FlagSet) -> Self {
        for (name, value) in &other.entries {
            self.set(name, value.clone());
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.to_args().is_empty()
    }

    /// Rendered tokens, one flag or flag value per element.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for (name, value) in &self.entries {
            let flag = format!("--{}", name.replace('_', "-"));
            match value {
                FlagValue::Switch(true) => args.push(flag),
                FlagValue::Switch(false) => {}
                FlagValue::Value(v) => {
                    args.push(flag);
                    args.push(v.clone());
                }
            }
        }
        args
    }

    /// Flags joined into a single argument string.
    pub fn render(&self) -> String {
        self.to_args().join(" ")
    }

    fn set(&mut self, name: &str, value: FlagValue) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }
}

impl From<BTreeMap<String, FlagValue>> for FlagSet {
    fn from(map: BTreeMap<String, FlagValue>) -> Self {
        Self {
            entries: map.into_iter().collect(),
        }
    }
}

impl From<FlagSet> for BTreeMap<String, FlagValue> {
    fn from(flags: FlagSet) -> Self {
        flags.entries.into_iter().collect()
    }
}

impl fmt::Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
