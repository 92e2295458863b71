//! Expression and statement nodes
//!
//! Both sums are closed: every consumer (binder, evaluator, encoder, compile
//! listing) matches them exhaustively.

use serde_json::Value as JsonValue;

/* ===================== Expressions ===================== */

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Variable lookup through the scope chain
    Name(String),

    /// Constant JSON value
    Literal(JsonValue),

    /// Escape hatch: source evaluated by the host substrate
    Raw(String),

    Call {
        callee: Callee,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },

    Attr {
        base: Box<Expr>,
        attr: String,
    },

    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },

    List(Vec<Expr>),

    Tuple(Vec<Expr>),

    Dict(Vec<(Expr, Expr)>),

    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    Validate {
        target: ValidateTarget,
        data: Box<Expr>,
    },

    Parallel(Vec<ParallelTask>),
}

/// Call target: a bare name or an arbitrary expression
#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    Name(String),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidateTarget {
    Schema(Box<Expr>),
    /// A bare name refers to a registered model; other expressions must yield a model name
    Model(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParallelTask {
    pub name: String,
    pub call: Expr,
}

impl Expr {
    pub fn name(name: impl Into<String>) -> Self {
        Expr::Name(name.into())
    }

    pub fn literal(value: impl Into<JsonValue>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Callee::Name(callee.into()),
            args,
            kwargs: Vec::new(),
        }
    }

    /// Visit this expression and every nested expression, parents first
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Name(_) | Expr::Literal(_) | Expr::Raw(_) => {}
            Expr::Call {
                callee,
                args,
                kwargs,
            } => {
                if let Callee::Expr(callee) = callee {
                    callee.walk(visit);
                }
                for arg in args {
                    arg.walk(visit);
                }
                for (_, value) in kwargs {
                    value.walk(visit);
                }
            }
            Expr::Attr { base, .. } => base.walk(visit),
            Expr::Index { base, index } => {
                base.walk(visit);
                index.walk(visit);
            }
            Expr::List(items) | Expr::Tuple(items) => {
                for item in items {
                    item.walk(visit);
                }
            }
            Expr::Dict(entries) => {
                for (key, value) in entries {
                    key.walk(visit);
                    value.walk(visit);
                }
            }
            Expr::BinOp { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Validate { target, data } => {
                match target {
                    ValidateTarget::Schema(e) | ValidateTarget::Model(e) => e.walk(visit),
                }
                data.walk(visit);
            }
            Expr::Parallel(tasks) => {
                for task in tasks {
                    task.call.walk(visit);
                }
            }
        }
    }
}

impl Stmt {
    /// Expressions owned directly by this statement (not by nested blocks)
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Stmt::Set { value, .. } => vec![value],
            Stmt::Expr(e) | Stmt::Return(e) => vec![e],
            Stmt::If { cond, .. } | Stmt::While { cond, .. } => vec![cond],
            Stmt::For { iter, .. } => vec![iter],
            Stmt::With { items, .. } => items.iter().map(|i| &i.context).collect(),
            Stmt::Assert { cond, msg } => {
                let mut out = vec![cond];
                out.extend(msg.iter());
                out
            }
            Stmt::Raise(value) => value.iter().collect(),
            Stmt::Break | Stmt::Continue | Stmt::Raw(_) => Vec::new(),
        }
    }

    /// Nested statement blocks, in source order
    pub fn blocks(&self) -> Vec<&[Stmt]> {
        match self {
            Stmt::If {
                then, otherwise, ..
            } => vec![then.as_slice(), otherwise.as_slice()],
            Stmt::While {
                body, otherwise, ..
            } => vec![body.as_slice(), otherwise.as_slice()],
            Stmt::For { body, .. } | Stmt::With { body, .. } => vec![body.as_slice()],
            _ => Vec::new(),
        }
    }
}

/* ===================== Operators ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    NotIn,
}

impl BinOp {
    pub const ALL: [BinOp; 17] = [
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::Div,
        BinOp::FloorDiv,
        BinOp::Mod,
        BinOp::Pow,
        BinOp::And,
        BinOp::Or,
        BinOp::Eq,
        BinOp::Ne,
        BinOp::Lt,
        BinOp::Gt,
        BinOp::Le,
        BinOp::Ge,
        BinOp::In,
        BinOp::NotIn,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::In => "in",
            BinOp::NotIn => "not in",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<BinOp> {
        BinOp::ALL.into_iter().find(|op| op.symbol() == symbol)
    }
}

/* ===================== Statements ===================== */

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Set {
        name: String,
        value: Expr,
    },

    Expr(Expr),

    Return(Expr),

    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },

    For {
        var: String,
        iter: Expr,
        body: Vec<Stmt>,
    },

    /// `otherwise` runs only when the loop ends without `break`
    While {
        cond: Expr,
        body: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },

    Break,

    Continue,

    With {
        items: Vec<WithItem>,
        body: Vec<Stmt>,
    },

    Assert {
        cond: Expr,
        msg: Option<Expr>,
    },

    /// `None` re-raises the error most recently suppressed in the current scope
    Raise(Option<Expr>),

    Raw(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithItem {
    pub context: Expr,
    pub alias: Option<String>,
}
