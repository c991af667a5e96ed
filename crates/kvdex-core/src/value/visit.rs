use crate::value::Value;
use std::fmt;
use thiserror::Error as ThisError;

///
/// ValidationError
///
/// Caller-supplied value rejected before any write is attempted.
/// Never retried by the write protocol.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ValidationError {
    #[error("expected an object value, found {kind}")]
    NotAnObject { kind: &'static str },

    #[error("value at '{path}' is not indexable ({kind})")]
    NotIndexable { path: ValuePath, kind: &'static str },

    #[error("value nesting at '{path}' exceeds max depth {max}")]
    TooDeep { path: ValuePath, max: usize },

    #[error("non-finite float at '{path}'")]
    NonFiniteFloat { path: ValuePath },

    #[error("invalid value at '{path}': {message}")]
    Custom { path: ValuePath, message: String },
}

impl ValidationError {
    /// Construct a root-level custom rejection.
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            path: ValuePath::root(),
            message: message.into(),
        }
    }

    /// Re-anchor a root-relative error under a field path.
    #[must_use]
    pub fn at_field(self, field: &str) -> Self {
        match self {
            Self::NotIndexable { path, kind } => Self::NotIndexable {
                path: path.prefixed(field),
                kind,
            },
            other => other,
        }
    }
}

///
/// PathSegment
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

///
/// ValuePath
///
/// Location of a nested value, rendered as `address.lines[2]`.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ValuePath(Vec<PathSegment>);

impl ValuePath {
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    fn push(&mut self, segment: PathSegment) {
        self.0.push(segment);
    }

    fn pop(&mut self) {
        self.0.pop();
    }

    fn prefixed(mut self, field: &str) -> Self {
        self.0.insert(0, PathSegment::Field(field.to_string()));
        self
    }
}

impl fmt::Display for ValuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("$");
        }

        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Field(name) if i == 0 => f.write_str(name)?,
                PathSegment::Field(name) => write!(f, ".{name}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }

        Ok(())
    }
}

///
/// ValueVisitor
///
/// Pre-order visitor over a value tree. Returning an error stops the walk.
///

pub trait ValueVisitor {
    type Error;

    fn visit(&mut self, path: &ValuePath, value: &Value) -> Result<(), Self::Error>;
}

/// Walk `value` depth-first, visiting every node before its children.
pub fn walk<V: ValueVisitor>(value: &Value, visitor: &mut V) -> Result<(), V::Error> {
    let mut path = ValuePath::root();

    walk_inner(value, &mut path, visitor)
}

fn walk_inner<V: ValueVisitor>(
    value: &Value,
    path: &mut ValuePath,
    visitor: &mut V,
) -> Result<(), V::Error> {
    visitor.visit(path, value)?;

    match value {
        Value::List(items) => {
            for (index, item) in items.iter().enumerate() {
                path.push(PathSegment::Index(index));
                walk_inner(item, path, visitor)?;
                path.pop();
            }
        }
        Value::Object(fields) => {
            for (field, item) in fields {
                path.push(PathSegment::Field(field.clone()));
                walk_inner(item, path, visitor)?;
                path.pop();
            }
        }
        _ => {}
    }

    Ok(())
}

///
/// ValueValidator
///
/// Structural checks every stored value must pass.
///

#[derive(Clone, Copy, Debug)]
pub struct ValueValidator {
    pub max_depth: usize,
}

impl Default for ValueValidator {
    fn default() -> Self {
        Self {
            max_depth: crate::MAX_VALUE_DEPTH,
        }
    }
}

impl ValueValidator {
    pub fn validate(mut self, value: &Value) -> Result<(), ValidationError> {
        walk(value, &mut self)
    }
}

impl ValueVisitor for ValueValidator {
    type Error = ValidationError;

    fn visit(&mut self, path: &ValuePath, value: &Value) -> Result<(), Self::Error> {
        if path.depth() > self.max_depth {
            return Err(ValidationError::TooDeep {
                path: path.clone(),
                max: self.max_depth,
            });
        }

        if let Value::Float(v) = value
            && !v.is_finite()
        {
            return Err(ValidationError::NonFiniteFloat { path: path.clone() });
        }

        Ok(())
    }
}

///
/// DocumentValidator
///
/// Caller-supplied model check run before every write of a collection.
///

pub trait DocumentValidator: Send + Sync {
    fn validate(&self, value: &Value) -> Result<(), ValidationError>;
}

impl<F> DocumentValidator for F
where
    F: Fn(&Value) -> Result<(), ValidationError> + Send + Sync,
{
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        self(value)
    }
}
