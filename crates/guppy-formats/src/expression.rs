//! Variable expressions and their resolution against a header
//!
//! An expression names what a caller wants to read:
//!
//! - `name`: a whole column (scalar, or vector of triplets)
//! - `name[k]`: component `k` (0, 1, or 2) of a vector column
//! - `[RockstarParticle]`: the composite id + position + velocity record
//!
//! The brace spellings `name{k}` and `{RockstarParticle}` are accepted too.
//! Parsing never touches the header, so malformed expressions can be
//! rejected on their own. Resolution then checks the parsed form against a
//! header and produces the column accesses needed to fill a buffer.

use std::fmt;
use std::str::FromStr;

use crate::convert::ScalarType;
use crate::error::{FormatError, FormatResult};
use crate::header::Header;

/// Name of the identifier quantity every file carries
pub const ID_NAME: &str = "id";

/// Name of the position vector column
pub const POSITION_NAME: &str = "x";

/// Name of the velocity vector column
pub const VELOCITY_NAME: &str = "v";

/// Highest valid component index
pub const MAX_COMPONENT: usize = 2;

/// Fixed aggregate schemas that can be read in one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeKind {
    /// `id`, `x[0..3]`, `v[0..3]` as a [`crate::RockstarParticle`]
    RockstarParticle,
}

impl CompositeKind {
    /// Canonical expression string
    pub const fn name(self) -> &'static str {
        match self {
            Self::RockstarParticle => "[RockstarParticle]",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "RockstarParticle" => Some(Self::RockstarParticle),
            _ => None,
        }
    }

    /// The simple expressions the composite is assembled from
    pub fn expand(self) -> Vec<VariableExpression> {
        match self {
            Self::RockstarParticle => {
                let mut parts = Vec::with_capacity(7);
                for k in 0..=MAX_COMPONENT {
                    parts.push(VariableExpression::Component(POSITION_NAME.to_string(), k));
                }
                for k in 0..=MAX_COMPONENT {
                    parts.push(VariableExpression::Component(VELOCITY_NAME.to_string(), k));
                }
                parts.push(VariableExpression::Plain(ID_NAME.to_string()));
                parts
            }
        }
    }
}

/// A parsed variable expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VariableExpression {
    /// A whole column
    Plain(String),
    /// One component of a vector column
    Component(String, usize),
    /// A composite record
    Composite(CompositeKind),
}

fn invalid(expr: &str) -> FormatError {
    FormatError::InvalidExpression(expr.to_string())
}

fn is_bracket(c: char) -> bool {
    matches!(c, '[' | ']' | '{' | '}')
}

impl VariableExpression {
    /// Parse an expression string without consulting any header
    pub fn parse(expr: &str) -> FormatResult<Self> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(invalid(expr));
        }

        let close = match expr.chars().last() {
            Some(']') => Some('['),
            Some('}') => Some('{'),
            _ => None,
        };

        let Some(open) = close else {
            if expr.chars().any(is_bracket) {
                return Err(invalid(expr));
            }
            return Ok(Self::Plain(expr.to_string()));
        };

        let start = expr.rfind(open).ok_or_else(|| invalid(expr))?;
        let name = &expr[..start];
        let inner = &expr[start + 1..expr.len() - 1];

        if name.is_empty() {
            return CompositeKind::from_label(inner)
                .map(Self::Composite)
                .ok_or_else(|| invalid(expr));
        }

        if name.chars().any(is_bracket)
            || inner.is_empty()
            || !inner.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid(expr));
        }

        // Digit strings too long for usize are just very out of range
        let index = inner.parse::<usize>().unwrap_or(usize::MAX);
        if index > MAX_COMPONENT {
            return Err(FormatError::IndexOutOfRange {
                name: name.to_string(),
                index,
            });
        }

        Ok(Self::Component(name.to_string(), index))
    }

    /// Column name for the simple variants
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Plain(name) | Self::Component(name, _) => Some(name),
            Self::Composite(_) => None,
        }
    }

    /// Check the expression against a header
    pub fn validate(&self, header: &Header) -> FormatResult<()> {
        match self {
            Self::Plain(name) => {
                if name == ID_NAME || header.find(name).is_some() {
                    Ok(())
                } else {
                    Err(unknown(name, header))
                }
            }
            Self::Component(name, index) => {
                let column = header.find(name);
                if column.is_none() && name != ID_NAME {
                    return Err(unknown(name, header));
                }
                if *index > MAX_COMPONENT || !column.is_some_and(|j| header.is_vector(j)) {
                    return Err(FormatError::IndexOutOfRange {
                        name: name.clone(),
                        index: *index,
                    });
                }
                Ok(())
            }
            Self::Composite(kind) => kind
                .expand()
                .iter()
                .try_for_each(|part| part.validate(header)),
        }
    }

    /// Column accesses needed to read this expression, in output order.
    ///
    /// Plain and component expressions produce one access; composites
    /// produce one per record field.
    pub fn plan(&self, header: &Header) -> FormatResult<Vec<ColumnAccess>> {
        self.validate(header)?;
        match self {
            Self::Plain(name) => Ok(vec![ColumnAccess::for_name(name, None, header)]),
            Self::Component(name, index) => {
                Ok(vec![ColumnAccess::for_name(name, Some(*index), header)])
            }
            Self::Composite(kind) => {
                let mut accesses = Vec::new();
                for part in kind.expand() {
                    accesses.extend(part.plan(header)?);
                }
                Ok(accesses)
            }
        }
    }
}

fn unknown(name: &str, header: &Header) -> FormatError {
    FormatError::UnknownVariable {
        name: name.to_string(),
        available: header.names.clone(),
    }
}

impl FromStr for VariableExpression {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VariableExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(name) => f.write_str(name),
            Self::Component(name, index) => write!(f, "{name}[{index}]"),
            Self::Composite(kind) => f.write_str(kind.name()),
        }
    }
}

/// Where an access takes its values from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSource {
    /// A column stored in the file
    Stored {
        /// Column index in the header
        index: usize,
        /// Absolute byte offset of the column
        offset: u64,
        /// Column length in bytes
        extent: u64,
    },
    /// The identifier sequence `id_offset, id_offset + 1, ...`
    ImplicitId {
        /// First identifier
        start: u64,
    },
}

/// One column read needed to satisfy an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnAccess {
    /// Source of the values
    pub source: ColumnSource,
    /// Stored element type
    pub scalar: ScalarType,
    /// Stored components per particle
    pub width: usize,
    /// Selected component, or `None` for every component
    pub component: Option<usize>,
}

impl ColumnAccess {
    fn for_name(name: &str, component: Option<usize>, header: &Header) -> Self {
        match header.find(name) {
            Some(index) => Self {
                source: ColumnSource::Stored {
                    index,
                    offset: header.column_offset(index),
                    extent: header.column_extent(index),
                },
                scalar: header.types[index],
                width: usize::from(header.widths[index]),
                component,
            },
            None => Self::implicit_id(header),
        }
    }

    fn implicit_id(header: &Header) -> Self {
        Self {
            source: ColumnSource::ImplicitId {
                start: header.id_offset,
            },
            scalar: ScalarType::U64,
            width: 1,
            component: None,
        }
    }

    /// True when every component of a vector column is read
    pub fn is_whole_vector(&self) -> bool {
        self.width > 1 && self.component.is_none()
    }
}

/// Parse and validate one expression against a header
pub fn resolve(expression: &str, header: &Header) -> FormatResult<VariableExpression> {
    let parsed = VariableExpression::parse(expression)?;
    parsed.validate(header)?;
    Ok(parsed)
}

/// Parse and validate a list of expressions, failing on the first bad one.
///
/// Lets a caller reject a whole request before reading any column data.
pub fn resolve_all<'a, I>(expressions: I, header: &Header) -> FormatResult<Vec<VariableExpression>>
where
    I: IntoIterator<Item = &'a str>,
{
    expressions
        .into_iter()
        .map(|expression| resolve(expression, header))
        .collect()
}
