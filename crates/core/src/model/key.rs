use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::CoreError;

/// Type identity: a path name plus ordered generic arguments
///
/// Serialized as its rendered form, e.g. `"Map<String, app::Handler>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeRef {
    pub name: String,
    pub args: Vec<TypeRef>,
}

impl TypeRef {
    /// Create a non-generic type reference
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Create a generic type reference
    pub fn generic(name: impl Into<String>, args: impl IntoIterator<Item = TypeRef>) -> Self {
        Self {
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }

    /// Number of generic arguments
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Last path segment of the type name
    pub fn short_name(&self) -> &str {
        self.name
            .rsplit(|c: char| c == ':' || c == '.')
            .next()
            .unwrap_or(&self.name)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.args.is_empty() {
            write!(f, "<")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", arg)?;
            }
            write!(f, ">")?;
        }
        Ok(())
    }
}

impl FromStr for TypeRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = TypeParser { source: s, pos: 0 };
        let ty = parser.parse_type()?;
        parser.skip_whitespace();
        if parser.pos != s.len() {
            return Err(parser.error("unexpected trailing characters"));
        }
        Ok(ty)
    }
}

impl TryFrom<String> for TypeRef {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TypeRef> for String {
    fn from(value: TypeRef) -> Self {
        value.to_string()
    }
}

struct TypeParser<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> TypeParser<'a> {
    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn bump(&mut self, c: char) {
        self.pos += c.len_utf8();
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.bump(c);
        }
    }

    fn error(&self, message: &str) -> CoreError {
        CoreError::InvalidTypeReference {
            input: self.source.to_string(),
            message: format!("{} at offset {}", message, self.pos),
        }
    }

    fn parse_type(&mut self) -> Result<TypeRef, CoreError> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == ':' || c == '.' {
                self.bump(c);
            } else {
                break;
            }
        }
        if start == self.pos {
            return Err(self.error("expected a type name"));
        }
        let name = self.source[start..self.pos].to_string();

        self.skip_whitespace();
        let mut args = Vec::new();
        if self.peek() == Some('<') {
            self.bump('<');
            loop {
                args.push(self.parse_type()?);
                self.skip_whitespace();
                match self.peek() {
                    Some(',') => self.bump(','),
                    Some('>') => {
                        self.bump('>');
                        break;
                    }
                    _ => return Err(self.error("expected ',' or '>'")),
                }
            }
        }

        Ok(TypeRef { name, args })
    }
}

/// Discriminator between bindings of the same underlying type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Qualifier {
    /// No qualifier; a distinct value of its own
    #[default]
    None,
    /// A label string
    Label(String),
    /// A custom marker type
    Marker(TypeRef),
}

impl Qualifier {
    /// Check if the qualifier is absent
    pub fn is_none(&self) -> bool {
        matches!(self, Qualifier::None)
    }
}

/// Identity of a requested or provided value
///
/// Serialized as `Type`, `Type@label` or `Type#Marker`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BindingKey {
    pub ty: TypeRef,
    pub qualifier: Qualifier,
}

impl BindingKey {
    /// Create an unqualified key for a type
    pub fn of(ty: TypeRef) -> Self {
        Self {
            ty,
            qualifier: Qualifier::None,
        }
    }

    /// Create an unqualified key for a non-generic type name
    pub fn named(name: impl Into<String>) -> Self {
        Self::of(TypeRef::named(name))
    }

    /// Create a label-qualified key
    pub fn labeled(ty: TypeRef, label: impl Into<String>) -> Self {
        Self {
            ty,
            qualifier: Qualifier::Label(label.into()),
        }
    }

    /// Create a marker-qualified key
    pub fn marked(ty: TypeRef, marker: TypeRef) -> Self {
        Self {
            ty,
            qualifier: Qualifier::Marker(marker),
        }
    }

    /// Check if the key carries no qualifier
    pub fn is_unqualified(&self) -> bool {
        self.qualifier.is_none()
    }
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Qualifier::None => write!(f, "{}", self.ty),
            Qualifier::Label(label) => write!(f, "{}@{}", self.ty, label),
            Qualifier::Marker(marker) => write!(f, "{}#{}", self.ty, marker),
        }
    }
}

impl FromStr for BindingKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| CoreError::InvalidBindingKey {
            input: s.to_string(),
            message: message.to_string(),
        };

        if let Some((ty, label)) = s.split_once('@') {
            let label = label.trim();
            if label.is_empty() {
                return Err(invalid("empty label qualifier"));
            }
            return Ok(Self::labeled(ty.parse()?, label));
        }

        if let Some((ty, marker)) = s.split_once('#') {
            return Ok(Self::marked(ty.parse()?, marker.parse()?));
        }

        Ok(Self::of(s.parse()?))
    }
}

impl TryFrom<String> for BindingKey {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BindingKey> for String {
    fn from(value: BindingKey) -> Self {
        value.to_string()
    }
}

/// A parameter requirement
///
/// A deferred dependency ("deferred factory of X") needs X's binding to
/// exist but does not construct X while its holder is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "DependencyRecord")]
pub struct Dependency {
    pub key: BindingKey,
    #[serde(default)]
    pub deferred: bool,
}

impl Dependency {
    /// Create a direct dependency
    pub fn direct(key: BindingKey) -> Self {
        Self {
            key,
            deferred: false,
        }
    }

    /// Create a deferred dependency
    pub fn deferred(key: BindingKey) -> Self {
        Self {
            key,
            deferred: true,
        }
    }
}

impl From<BindingKey> for Dependency {
    fn from(key: BindingKey) -> Self {
        Self::direct(key)
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.deferred {
            write!(f, "deferred {}", self.key)
        } else {
            write!(f, "{}", self.key)
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DependencyRecord {
    Plain(BindingKey),
    Full {
        key: BindingKey,
        #[serde(default)]
        deferred: bool,
    },
}

impl From<DependencyRecord> for Dependency {
    fn from(record: DependencyRecord) -> Self {
        match record {
            DependencyRecord::Plain(key) => Dependency::direct(key),
            DependencyRecord::Full { key, deferred } => Dependency { key, deferred },
        }
    }
}
