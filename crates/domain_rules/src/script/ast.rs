//! Arena-allocated syntax tree
//!
//! Expressions live in a flat `Vec<Node>` owned by the compiled script and
//! refer to each other by [`NodeId`]. Field and function names are resolved
//! while parsing, so evaluation never looks anything up by string.

use rust_decimal::Decimal;

use domain_claims::ContextField;

/// Byte range into the script source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn slice(self, source: &str) -> &str {
        source.get(self.start..self.end).unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn new(index: usize) -> Self {
        NodeId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

/// Functions callable from expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Append,
    Contains,
    Len,
    Min,
    Max,
    Clamp,
    Floor,
    Percent,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Builtin> {
        match name {
            "Append" => Some(Builtin::Append),
            "Contains" => Some(Builtin::Contains),
            "Len" => Some(Builtin::Len),
            "Min" => Some(Builtin::Min),
            "Max" => Some(Builtin::Max),
            "Clamp" => Some(Builtin::Clamp),
            "Floor" => Some(Builtin::Floor),
            "Percent" => Some(Builtin::Percent),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Append => "Append",
            Builtin::Contains => "Contains",
            Builtin::Len => "Len",
            Builtin::Min => "Min",
            Builtin::Max => "Max",
            Builtin::Clamp => "Clamp",
            Builtin::Floor => "Floor",
            Builtin::Percent => "Percent",
        }
    }

    /// Accepted argument counts
    pub fn arities(&self) -> &'static [usize] {
        match self {
            Builtin::Append | Builtin::Contains | Builtin::Min | Builtin::Max => &[2],
            Builtin::Len | Builtin::Floor => &[1],
            Builtin::Clamp => &[3],
            Builtin::Percent => &[2, 4],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Decimal(Decimal),
    Bool(bool),
    Str(String),
    List(Vec<NodeId>),
    Field(ContextField),
    Unary { op: UnaryOp, operand: NodeId },
    Binary { op: BinaryOp, lhs: NodeId, rhs: NodeId },
    Call { func: Builtin, args: Vec<NodeId> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub expr: Expr,
    pub span: Span,
}

/// One action in the `then` section
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assign {
        field: ContextField,
        value: NodeId,
        span: Span,
    },
    /// Removes the named rule from the rest of the batch
    Retract { code: String, span: Span },
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::Assign { span, .. } | Statement::Retract { span, .. } => *span,
        }
    }
}
