//! Typed recipe flags set from `key=value` strings.

use crate::{Error, Result};
use indexmap::IndexMap;
use std::fmt;

/// Value of a flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    /// On/off switch
    Bool(bool),
    /// Unsigned integer
    Int(u64),
    /// Free text
    String(String),
    /// Integer that may be unset
    OptionalInt(Option<u64>),
}

impl FlagValue {
    fn kind(&self) -> &'static str {
        match self {
            FlagValue::Bool(_) => "bool",
            FlagValue::Int(_) => "int",
            FlagValue::String(_) => "string",
            FlagValue::OptionalInt(_) => "int?",
        }
    }

    /// Parse `raw` as a value of the same kind as `self`
    fn parse_like(&self, raw: &str) -> std::result::Result<FlagValue, String> {
        let raw = raw.trim();
        match self {
            FlagValue::Bool(_) => match raw.to_ascii_lowercase().as_str() {
                "" | "true" | "1" | "yes" | "on" => Ok(FlagValue::Bool(true)),
                "false" | "0" | "no" | "off" => Ok(FlagValue::Bool(false)),
                other => Err(format!("'{}' is not a boolean", other)),
            },
            FlagValue::Int(_) => raw
                .parse()
                .map(FlagValue::Int)
                .map_err(|_| format!("'{}' is not an integer", raw)),
            FlagValue::String(_) => Ok(FlagValue::String(raw.to_string())),
            FlagValue::OptionalInt(_) => match raw {
                "" | "none" | "nil" => Ok(FlagValue::OptionalInt(None)),
                n => n
                    .parse()
                    .map(|v| FlagValue::OptionalInt(Some(v)))
                    .map_err(|_| format!("'{}' is not an integer", raw)),
            },
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Bool(b) => write!(f, "{}", b),
            FlagValue::Int(n) => write!(f, "{}", n),
            FlagValue::String(s) => write!(f, "{}", s),
            FlagValue::OptionalInt(Some(n)) => write!(f, "{}", n),
            FlagValue::OptionalInt(None) => f.write_str("unset"),
        }
    }
}

/// A declared flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flag {
    /// Flag name
    pub name: String,
    /// Help text
    pub description: String,
    /// Current value, initially the default
    pub value: FlagValue,
}

/// The flags a recipe accepts, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet {
    flags: IndexMap<String, Flag>,
}

impl FlagSet {
    /// Empty flag set
    pub fn new() -> Self {
        Self::default()
    }

    fn declare(mut self, name: &str, description: &str, value: FlagValue) -> Self {
        self.flags.insert(
            name.to_string(),
            Flag { name: name.to_string(), description: description.to_string(), value },
        );
        self
    }

    /// Declare a boolean flag
    pub fn bool(self, name: &str, default: bool, description: &str) -> Self {
        self.declare(name, description, FlagValue::Bool(default))
    }

    /// Declare an integer flag
    pub fn int(self, name: &str, default: u64, description: &str) -> Self {
        self.declare(name, description, FlagValue::Int(default))
    }

    /// Declare a string flag
    pub fn string(self, name: &str, default: &str, description: &str) -> Self {
        self.declare(name, description, FlagValue::String(default.to_string()))
    }

    /// Declare an optional integer flag
    pub fn optional_int(self, name: &str, description: &str) -> Self {
        self.declare(name, description, FlagValue::OptionalInt(None))
    }

    /// Merge the declarations of another set, keeping ours on conflict
    pub fn extend(mut self, other: FlagSet) -> Self {
        for (name, flag) in other.flags {
            self.flags.entry(name).or_insert(flag);
        }
        self
    }

    /// Set a flag from `key=value`; a bare `key` turns a boolean on
    pub fn set(&mut self, assignment: &str) -> Result<()> {
        let (key, raw) = assignment.split_once('=').unwrap_or((assignment, ""));
        self.set_value(key.trim(), raw)
    }

    /// Set a flag by name from its textual value
    pub fn set_value(&mut self, key: &str, raw: &str) -> Result<()> {
        let flag = self
            .flags
            .get_mut(key)
            .ok_or_else(|| Error::Flag(format!("unknown flag '{}'", key)))?;
        flag.value = flag
            .value
            .parse_like(raw)
            .map_err(|e| Error::Flag(format!("{}: {}", key, e)))?;
        Ok(())
    }

    /// Declared flags
    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.flags.values()
    }

    /// Raw value of a flag
    pub fn get(&self, name: &str) -> Option<&FlagValue> {
        self.flags.get(name).map(|f| &f.value)
    }

    /// Boolean value, `false` when undeclared
    pub fn get_bool(&self, name: &str) -> bool {
        matches!(self.get(name), Some(FlagValue::Bool(true)))
    }

    /// Integer value
    pub fn get_int(&self, name: &str) -> Option<u64> {
        match self.get(name) {
            Some(FlagValue::Int(n)) => Some(*n),
            Some(FlagValue::OptionalInt(n)) => *n,
            _ => None,
        }
    }

    /// String value, `None` when undeclared or empty
    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(FlagValue::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    /// Kind names for help output
    pub fn describe(&self) -> Vec<(String, String, String, String)> {
        self.iter()
            .map(|f| {
                (f.name.clone(), f.value.kind().to_string(), f.value.to_string(), f.description.clone())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags() -> FlagSet {
        FlagSet::new()
            .bool("latest-fork", false, "")
            .int("block-time", 2, "")
            .string("external-builder", "", "")
            .optional_int("l2-fork", "")
    }

    #[test]
    fn test_set_typed_values() {
        let mut flags = flags();
        flags.set("latest-fork").unwrap();
        flags.set("block-time=4").unwrap();
        flags.set("external-builder=http://host:8551").unwrap();
        flags.set("l2-fork=3").unwrap();

        assert!(flags.get_bool("latest-fork"));
        assert_eq!(flags.get_int("block-time"), Some(4));
        assert_eq!(flags.get_string("external-builder"), Some("http://host:8551"));
        assert_eq!(flags.get_int("l2-fork"), Some(3));
    }

    #[test]
    fn test_defaults_and_errors() {
        let mut flags = flags();
        assert!(!flags.get_bool("latest-fork"));
        assert_eq!(flags.get_int("l2-fork"), None);
        assert_eq!(flags.get_string("external-builder"), None);

        assert!(matches!(flags.set("nope=1"), Err(Error::Flag(_))));
        assert!(matches!(flags.set("block-time=fast"), Err(Error::Flag(_))));
        assert!(matches!(flags.set("latest-fork=maybe"), Err(Error::Flag(_))));
    }

    #[test]
    fn test_extend_keeps_existing() {
        let base = FlagSet::new().int("block-time", 12, "l1");
        let merged = base.extend(FlagSet::new().int("block-time", 2, "l2").bool("x", true, ""));
        assert_eq!(merged.get_int("block-time"), Some(12));
        assert!(merged.get_bool("x"));
    }
}
