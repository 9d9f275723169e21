// modrules-common/src/model/context.rs
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModrulesError, Result};

pub const EDITOR_BUILD: &str = "editorBuild";
pub const PLATFORM: &str = "platform";
pub const CONFIGURATION: &str = "configuration";

/// Value of a single build flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Text(String),
}

impl FlagValue {
    /// Boolean view of the value. Text values read as `false`.
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Text(_) => false,
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl FromStr for FlagValue {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            other => Self::Text(other.to_string()),
        })
    }
}

impl From<bool> for FlagValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for FlagValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Flag values for one build invocation.
///
/// Read-only once built. Flags that are not present read as `false`, so
/// descriptors written against a newer flag schema still resolve.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetContext {
    flags: BTreeMap<String, FlagValue>,
}

impl TargetContext {
    pub fn builder() -> TargetContextBuilder {
        TargetContextBuilder::default()
    }

    pub fn get(&self, flag: &str) -> bool {
        self.flags.get(flag).is_some_and(FlagValue::as_bool)
    }

    pub fn value(&self, flag: &str) -> Option<&FlagValue> {
        self.flags.get(flag)
    }

    pub fn flags(&self) -> impl Iterator<Item = (&str, &FlagValue)> {
        self.flags.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// A copy of this context with `overrides` layered on top.
    pub fn overlay(&self, overrides: &TargetContext) -> Self {
        let mut flags = self.flags.clone();
        flags.extend(overrides.flags.clone());
        Self { flags }
    }
}

impl fmt::Display for TargetContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.flags.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

impl<K, V> FromIterator<(K, V)> for TargetContext
where
    K: Into<String>,
    V: Into<FlagValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            flags: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct TargetContextBuilder {
    flags: BTreeMap<String, FlagValue>,
}

impl TargetContextBuilder {
    pub fn flag(mut self, name: impl Into<String>, value: impl Into<FlagValue>) -> Self {
        self.flags.insert(name.into(), value.into());
        self
    }

    pub fn editor_build(self, enabled: bool) -> Self {
        self.flag(EDITOR_BUILD, enabled)
    }

    pub fn platform(self, platform: &str) -> Self {
        self.flag(PLATFORM, platform)
    }

    pub fn configuration(self, configuration: &str) -> Self {
        self.flag(CONFIGURATION, configuration)
    }

    /// Parses a `name=value` assignment as given on the command line.
    pub fn assignment(self, raw: &str) -> Result<Self> {
        let (name, value) = parse_assignment(raw)?;
        Ok(self.flag(name, value))
    }

    pub fn build(self) -> TargetContext {
        TargetContext { flags: self.flags }
    }
}

pub fn parse_assignment(raw: &str) -> Result<(String, FlagValue)> {
    let (name, value) = raw.split_once('=').ok_or_else(|| {
        ModrulesError::ParseError("flag assignment", format!("expected name=value, got '{raw}'"))
    })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ModrulesError::ParseError(
            "flag assignment",
            format!("missing flag name in '{raw}'"),
        ));
    }
    let value = match value.trim().parse::<FlagValue>() {
        Ok(v) => v,
        Err(never) => match never {},
    };
    Ok((name.to_string(), value))
}
