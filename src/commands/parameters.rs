use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::error::{AppError, AppResult};

/// Value type a command declares for one of its parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Text,
    Int,
    Bool,
    Filename,
    Option,
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterKind::String => write!(f, "string"),
            ParameterKind::Text => write!(f, "text"),
            ParameterKind::Int => write!(f, "int"),
            ParameterKind::Bool => write!(f, "bool"),
            ParameterKind::Filename => write!(f, "filename"),
            ParameterKind::Option => write!(f, "option"),
        }
    }
}

/// Declared parameter of a command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSpec {
    pub name: String,
    pub description: String,
    pub kind: ParameterKind,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub default: Option<String>,
    pub options: Vec<String>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind,
            min: None,
            max: None,
            default: None,
            options: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Checks `value` against the declared type, range and options.
    pub fn validate(&self, value: &str) -> AppResult<()> {
        let fail = |reason: String| Err(AppError::validation(self.name.clone(), reason));

        match self.kind {
            ParameterKind::Int => {
                let Ok(n) = value.trim().parse::<i64>() else {
                    return fail(format!("'{}' is not an integer", value));
                };
                if let Some(min) = self.min
                    && n < min
                {
                    return fail(format!("{} is below the minimum {}", n, min));
                }
                if let Some(max) = self.max
                    && n > max
                {
                    return fail(format!("{} is above the maximum {}", n, max));
                }
                Ok(())
            }
            ParameterKind::Bool => match parse_bool(value) {
                Some(_) => Ok(()),
                None => fail(format!("'{}' is not a boolean", value)),
            },
            ParameterKind::Option => {
                if self.options.iter().any(|o| o.eq_ignore_ascii_case(value.trim())) {
                    Ok(())
                } else {
                    fail(format!(
                        "'{}' is not one of {}",
                        value,
                        self.options.join(", ")
                    ))
                }
            }
            ParameterKind::String | ParameterKind::Text | ParameterKind::Filename => Ok(()),
        }
    }
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "on" => Some(true),
        "false" | "no" | "n" | "0" | "off" => Some(false),
        _ => None,
    }
}

/// Merged parameter values for one invocation, keyed case-insensitively.
///
/// The declared casing of a name is kept for display; lookups ignore case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterMap {
    values: HashMap<String, (String, String)>,
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `name`, keeping the first casing seen.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        self.values
            .entry(name.to_ascii_lowercase())
            .and_modify(|(_, v)| *v = value.clone())
            .or_insert_with(|| (name.to_string(), value));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(&name.to_ascii_lowercase())
            .map(|(_, v)| v.as_str())
    }

    pub fn require(&self, name: &str) -> anyhow::Result<&str> {
        self.get(name)
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter '{}'", name))
    }

    pub fn get_i64(&self, name: &str) -> anyhow::Result<i64> {
        let raw = self.require(name)?;
        raw.trim().parse().map_err(|e| {
            anyhow::anyhow!("Parameter '{}' = '{}' is not an integer: {}", name, raw, e)
        })
    }

    pub fn get_bool(&self, name: &str) -> anyhow::Result<bool> {
        let raw = self.require(name)?;
        parse_bool(raw)
            .ok_or_else(|| anyhow::anyhow!("Parameter '{}' = '{}' is not a boolean", name, raw))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// (declared name, value) pairs sorted by name.
    pub fn entries(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<_> = self
            .values
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        entries.sort_by_key(|(name, _)| name.to_ascii_lowercase());
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_range() {
        let spec = ParameterSpec::new("RetentionDays", ParameterKind::Int).range(1, 10);
        assert!(spec.validate("5").is_ok());
        assert!(spec.validate(" 10 ").is_ok());
        assert!(spec.validate("0").is_err());
        assert!(spec.validate("11").is_err());
        assert!(matches!(
            spec.validate("ten"),
            Err(AppError::Validation { ref field, .. }) if field == "RetentionDays"
        ));
    }

    #[test]
    fn test_bool_literals() {
        let spec = ParameterSpec::new("Verbose", ParameterKind::Bool);
        for ok in ["true", "FALSE", "yes", "0", "On"] {
            assert!(spec.validate(ok).is_ok(), "{}", ok);
        }
        assert!(spec.validate("maybe").is_err());
    }

    #[test]
    fn test_option_membership_ignores_case() {
        let spec = ParameterSpec::new("Level", ParameterKind::Option).options(["info", "warn"]);
        assert!(spec.validate("WARN").is_ok());
        assert!(spec.validate("debug").is_err());
    }

    #[test]
    fn test_free_text_kinds_accept_anything() {
        for kind in [ParameterKind::String, ParameterKind::Text, ParameterKind::Filename] {
            assert!(ParameterSpec::new("x", kind).validate("").is_ok());
        }
    }

    #[test]
    fn test_parameter_map_lookup_is_case_insensitive() {
        let mut params = ParameterMap::new();
        params.insert("Message", "hello");
        params.insert("MESSAGE", "override");

        assert_eq!(params.get("message"), Some("override"));
        assert_eq!(params.len(), 1);
        assert_eq!(params.entries(), vec![("Message", "override")]);
    }

    #[test]
    fn test_typed_getters() {
        let mut params = ParameterMap::new();
        params.insert("Days", "12");
        params.insert("Dry", "no");
        params.insert("Bad", "x");

        assert_eq!(params.get_i64("days").unwrap(), 12);
        assert!(!params.get_bool("dry").unwrap());
        assert!(params.get_i64("bad").is_err());
        assert!(params.require("missing").is_err());
    }
}
