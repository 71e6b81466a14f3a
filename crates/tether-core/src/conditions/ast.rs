//! Syntax tree of a conditions expression.

/// A boolean expression over a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    /// A bare operand, true when its value is truthy.
    Truthy(Operand),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BeginsWith,
    EndsWith,
    Contains,
    /// The left value equals one of the values in the right list.
    Any,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Dotted path into the record.
    Property(Vec<String>),
    /// Named value from the query parameters.
    Parameter(String),
    Literal(Literal),
    List(Vec<Operand>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}
