//! Syntax tree for the script dialect accepted by the remote engine.
//!
//! Only the subset the generator emits is modelled, plus enough general
//! expression syntax that hand-edited scripts still parse.

use std::time::Duration;

mod display;

// ---------------------------------------------------------------------------
// Program & statements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `var name = value`
    Var { name: String, value: Value },
    /// A bare pipeline, e.g. `trigger |httpOut('output')`.
    Chain(Chain),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Expr(Expr),
    Chain(Chain),
}

impl Program {
    /// Expression bound by `var name = ...`, if any.
    pub fn var_expr(&self, name: &str) -> Option<&Expr> {
        self.statements.iter().find_map(|stmt| match stmt {
            Statement::Var {
                name: n,
                value: Value::Expr(expr),
            } if n == name => Some(expr),
            _ => None,
        })
    }

    /// Pipeline bound by `var name = source |...`, if any.
    pub fn var_chain(&self, name: &str) -> Option<&Chain> {
        self.statements.iter().find_map(|stmt| match stmt {
            Statement::Var {
                name: n,
                value: Value::Chain(chain),
            } if n == name => Some(chain),
            _ => None,
        })
    }

    /// All bare pipelines in source order.
    pub fn bare_chains(&self) -> impl Iterator<Item = &Chain> {
        self.statements.iter().filter_map(|stmt| match stmt {
            Statement::Chain(chain) => Some(chain),
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

/// `source |node(args) .property(args) |node(args) ...`
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    /// `stream`, `batch` or the name of another pipeline variable.
    pub source: String,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Link {
    /// `|name(args)`: creates a new node.
    Node(Call),
    /// `.name(args)`: configures the most recent node.
    Property(Call),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Expr>,
}

impl Call {
    pub fn new(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// A node together with the properties that follow it.
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    pub node: &'a Call,
    pub properties: &'a [Link],
}

impl NodeView<'_> {
    pub fn properties(&self) -> impl Iterator<Item = &Call> {
        self.properties.iter().filter_map(|link| match link {
            Link::Property(call) => Some(call),
            Link::Node(_) => None,
        })
    }

    pub fn property(&self, name: &str) -> Option<&Call> {
        self.properties().find(|call| call.name == name)
    }
}

impl Chain {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            links: Vec::new(),
        }
    }

    pub fn node(mut self, name: &str, args: Vec<Expr>) -> Self {
        self.links.push(Link::Node(Call::new(name, args)));
        self
    }

    pub fn prop(mut self, name: &str, args: Vec<Expr>) -> Self {
        self.links.push(Link::Property(Call::new(name, args)));
        self
    }

    /// Group the links into nodes with their trailing properties.
    /// Properties that appear before the first node are ignored.
    pub fn nodes(&self) -> Vec<NodeView<'_>> {
        let mut views = Vec::new();
        let mut idx = 0;
        while idx < self.links.len() {
            if let Link::Node(node) = &self.links[idx] {
                let start = idx + 1;
                let mut end = start;
                while end < self.links.len() && matches!(self.links[end], Link::Property(_)) {
                    end += 1;
                }
                views.push(NodeView {
                    node,
                    properties: &self.links[start..end],
                });
                idx = end;
            } else {
                idx += 1;
            }
        }
        views
    }

    pub fn find_node(&self, name: &str) -> Option<NodeView<'_>> {
        self.nodes().into_iter().find(|view| view.node.name == name)
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// `'single quoted'`
    Str(String),
    /// `'''triple quoted'''`
    RawStr(String),
    Duration(Duration),
    Bool(bool),
    Ident(String),
    /// `"field"` reference inside a lambda.
    Field(String),
    List(Vec<Expr>),
    Lambda(Box<Expr>),
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Neg(Box<Expr>),
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => 3,
            BinOp::Add | BinOp::Sub => 4,
            BinOp::Mul | BinOp::Div => 5,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::And => "AND",
            BinOp::Or => "OR",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        }
    }
}

impl Expr {
    pub fn str(value: impl Into<String>) -> Self {
        Expr::Str(value.into())
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn field(name: impl Into<String>) -> Self {
        Expr::Field(name.into())
    }

    pub fn lambda(body: Expr) -> Self {
        Expr::Lambda(Box::new(body))
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    pub fn bin(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Fold `items` into a left-nested chain joined by `op`.
    pub fn fold(op: BinOp, items: impl IntoIterator<Item = Expr>) -> Option<Self> {
        items
            .into_iter()
            .reduce(|left, right| Expr::bin(op, left, right))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expr::Str(s) | Expr::RawStr(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident(name) => Some(name),
            _ => None,
        }
    }
}
