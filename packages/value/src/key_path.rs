//! Dotted key paths with validated identifier components.

use std::fmt;

use thiserror::Error;

/// Errors related to key path parsing and validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyPathError {
    /// A component is not a valid Unicode identifier or index.
    #[error("invalid key path component '{component}' at position {position}: {message}")]
    InvalidComponent {
        component: String,
        position: usize,
        message: String,
    },
    /// The key path string is empty.
    #[error("empty key path")]
    Empty,
}

/// A validated key path such as `user.name` or `items.0`.
///
/// Components must be valid Unicode identifiers (per UAX#31) or numeric
/// strings (for array indexing). A key path is what the engine's built-in
/// expressions read through a scope; it is not an expression language.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct KeyPath {
    components: Vec<String>,
}

impl KeyPath {
    /// Parse a dotted key path, validating components.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use scopewatch_value::KeyPath;
    ///
    /// let path = KeyPath::parse("user.tags.0").unwrap();
    /// assert_eq!(path.len(), 3);
    /// assert_eq!(path.first(), "user");
    ///
    /// assert!(KeyPath::parse("user..name").is_err());
    /// assert!(KeyPath::parse("").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self, KeyPathError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(KeyPathError::Empty);
        }

        let components: Vec<String> = s.split('.').map(|c| c.to_string()).collect();
        for (i, component) in components.iter().enumerate() {
            Self::validate_component(component, i)?;
        }

        Ok(KeyPath { components })
    }

    /// A single-component path for a plain key.
    pub fn key(key: &str) -> Result<Self, KeyPathError> {
        Self::validate_component(key, 0)?;
        Ok(KeyPath {
            components: vec![key.to_string()],
        })
    }

    fn validate_component(component: &str, position: usize) -> Result<(), KeyPathError> {
        let invalid = |message: String| KeyPathError::InvalidComponent {
            component: component.to_string(),
            position,
            message,
        };

        let mut chars = component.chars();
        let Some(first) = chars.next() else {
            return Err(invalid("empty component".to_string()));
        };

        // Pure numeric strings index into arrays
        if component.chars().all(|c| c.is_ascii_digit()) {
            return Ok(());
        }

        if !(unicode_ident::is_xid_start(first) || first == '_' || first == '$') {
            return Err(invalid(
                "must start with a letter, underscore or dollar sign".to_string(),
            ));
        }

        for c in chars {
            if !(unicode_ident::is_xid_continue(c) || c == '$') {
                return Err(invalid(format!("invalid character '{}' in identifier", c)));
            }
        }

        Ok(())
    }

    /// The leading component, resolved against the scope itself.
    pub fn first(&self) -> &str {
        &self.components[0]
    }

    /// The components after the first one.
    pub fn rest(&self) -> &[String] {
        &self.components[1..]
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Always false: a parsed key path has at least one component.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.components.iter()
    }

    /// The path without its leading component, if any components remain.
    #[must_use]
    pub fn tail(&self) -> Option<KeyPath> {
        (self.components.len() > 1).then(|| KeyPath {
            components: self.components[1..].to_vec(),
        })
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components.join("."))
    }
}

impl std::ops::Index<usize> for KeyPath {
    type Output = String;

    fn index(&self, i: usize) -> &Self::Output {
        &self.components[i]
    }
}

impl std::str::FromStr for KeyPath {
    type Err = KeyPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyPath::parse(s)
    }
}

/// Macro for creating key paths from literals.
///
/// # Example
///
/// ```rust
/// use scopewatch_value::key_path;
///
/// let p = key_path!("user.name");
/// assert_eq!(p.len(), 2);
/// ```
#[macro_export]
macro_rules! key_path {
    ($s:expr) => {
        $crate::KeyPath::parse($s).expect("invalid key path literal")
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic_paths() {
        assert_eq!(KeyPath::parse("a").unwrap().len(), 1);
        assert_eq!(KeyPath::parse("a.b").unwrap().len(), 2);
        assert_eq!(KeyPath::parse(" a.b.c ").unwrap().len(), 3);
    }

    #[test]
    fn numeric_components_allowed() {
        let p = KeyPath::parse("items.0.name").unwrap();
        assert_eq!(&p[1], "0");
        assert_eq!(p.tail().unwrap().to_string(), "0.name");
    }

    #[test]
    fn dollar_and_unicode_identifiers_allowed() {
        assert!(KeyPath::parse("$parent.value").is_ok());
        assert!(KeyPath::parse("usuarios.名前").is_ok());
    }

    #[test]
    fn invalid_components_rejected() {
        assert_eq!(KeyPath::parse(""), Err(KeyPathError::Empty));
        assert!(KeyPath::parse("a + b").is_err());
        assert!(KeyPath::parse("foo-bar").is_err());
        assert!(KeyPath::parse(".hidden").is_err());
        assert!(KeyPath::parse("123abc").is_err());
        assert!(KeyPath::parse("a..b").is_err());
    }

    #[test]
    fn error_display_names_component() {
        let err = KeyPath::parse("ok.not ok").unwrap_err();
        let display = err.to_string();
        assert!(display.contains("not ok"));
        assert!(display.contains("position 1"));
    }

    #[test]
    fn single_key_has_no_tail() {
        let p = KeyPath::key("a").unwrap();
        assert!(p.tail().is_none());
        assert!(p.rest().is_empty());
        assert!(!p.is_empty());
    }
}
