//! Abstract syntax tree for the Box language.
//!
//! Both categories are closed sum types visited by pattern match. Every node
//! owns its children exclusively (the tree is never a DAG) and carries a
//! token whose line/column pin diagnostics. All types derive
//! `Serialize`/`Deserialize` so the whole program can be exported as JSON.

use crate::compiler::token::{LiteralValue, Token};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════
//  Expressions
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    Literal {
        value: LiteralValue,
        token: Token,
    },
    Variable {
        name: Token,
    },
    Assign {
        name: Token,
        value: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: Token,
        right: Box<Expr>,
    },
    Unary {
        op: Token,
        right: Box<Expr>,
    },
    Logical {
        left: Box<Expr>,
        op: Token,
        right: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        paren: Token,
        arguments: Vec<Expr>,
    },
    Grouping {
        expression: Box<Expr>,
    },
    ArrayLiteral {
        elements: Vec<Expr>,
        bracket: Token,
    },
    DictLiteral {
        pairs: Vec<(Expr, Expr)>,
        brace: Token,
    },
    IndexGet {
        container: Box<Expr>,
        index: Box<Expr>,
        bracket: Token,
    },
    IndexSet {
        container: Box<Expr>,
        index: Box<Expr>,
        value: Box<Expr>,
        bracket: Token,
    },
}

impl Expr {
    /// The name of the called built-in or user function, when the callee is a
    /// plain variable. The code generator and analyzer dispatch on this.
    pub fn callee_name(&self) -> Option<&str> {
        if let Expr::Call { callee, .. } = self {
            if let Expr::Variable { name } = callee.as_ref() {
                return Some(&name.lexeme);
            }
        }
        None
    }
}

// ═══════════════════════════════════════════════════════════════
//  Statements
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseClause {
    pub value: Expr,
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    Expr {
        expression: Expr,
    },
    Print {
        expression: Expr,
        keyword: Token,
    },
    Var {
        name: Token,
        initializer: Option<Expr>,
    },
    Block {
        statements: Vec<Stmt>,
        /// Carries line/column for diagnostics only.
        opening_brace: Token,
    },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        keyword: Token,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
        keyword: Token,
    },
    Switch {
        keyword: Token,
        condition: Expr,
        cases: Vec<CaseClause>,
        default_case: Option<Vec<Stmt>>,
    },
    Function {
        name: Token,
        params: Vec<Token>,
        body: Vec<Stmt>,
    },
    Return {
        keyword: Token,
        value: Option<Expr>,
    },
    Break {
        keyword: Token,
    },
    Unsafe {
        keyword: Token,
        statements: Vec<Stmt>,
    },
    LlvmInline {
        keyword: Token,
        code: String,
        variables_map: std::collections::HashMap<String, String>,
    },
    Import {
        keyword: Token,
        file_path: String,
        path_token: Token,
    },
}
