//! Condition AST.

use reldb_value::Value;
use std::fmt;

/// A dotted field path, e.g. `address.state`.
///
/// The pseudo-segment `#ID` binds to the primary-key field of the row it
/// is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path(pub Vec<String>);

impl Path {
    /// A single-segment path.
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// The path segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `=~` — containment; collapses to `==` for scalar/scalar.
    Contains,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// ` IN ` — membership; same any-match semantics as `=~`.
    In,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Contains => "=~",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "IN",
        };
        write!(f, "{text}")
    }
}

/// The right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Positional placeholder `?`; indices assigned left to right.
    Positional(usize),
    /// Named placeholder `:name`.
    Named(String),
    /// Inline literal.
    Literal(Value),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positional(_) => write!(f, "?"),
            Self::Named(name) => write!(f, ":{name}"),
            Self::Literal(value) => write!(f, "{}", render_literal(value)),
        }
    }
}

/// A parsed condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    /// A single comparison.
    Cmp {
        /// Field path on the left.
        path: Path,
        /// Comparison operator.
        op: CmpOp,
        /// Right-hand operand.
        operand: Operand,
    },
    /// Conjunction; `&&` binds tighter than `||`.
    And(Vec<Cond>),
    /// Disjunction.
    Or(Vec<Cond>),
}

impl Cond {
    /// A single comparison condition.
    #[must_use]
    pub fn cmp(path: Path, op: CmpOp, operand: Operand) -> Self {
        Self::Cmp { path, op, operand }
    }

    /// Renders the condition back to its surface form.
    ///
    /// Reparsing the rendered text yields an equal AST.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Cmp { path, op, operand } => format!("{path} {op} {operand}"),
            Self::And(parts) => parts
                .iter()
                .map(|part| match part {
                    // `||` inside `&&` needs its grouping back
                    Self::Or(_) => format!("({})", part.to_text()),
                    _ => part.to_text(),
                })
                .collect::<Vec<_>>()
                .join(" && "),
            Self::Or(parts) => parts
                .iter()
                .map(Self::to_text)
                .collect::<Vec<_>>()
                .join(" || "),
        }
    }
}

fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => format!("{f:?}"),
        Value::Text(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        other => other.type_name().to_string(),
    }
}
