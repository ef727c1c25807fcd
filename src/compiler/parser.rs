//! Recursive-descent parser for the Box language.
//!
//! Collects every syntax error via panic-mode synchronization instead of
//! stopping at the first, then surfaces the whole set as one bundled
//! failure. Precedence climbs assignment → or → and → equality → comparison
//! → term → factor → unary → call → primary.

use crate::compiler::ast::{CaseClause, Expr, Stmt};
use crate::compiler::diag;
use crate::compiler::token::{LiteralValue, Token, TokenKind};
use std::collections::{HashMap, HashSet};
use std::fmt;

pub const MAX_ARGUMENTS: usize = 255;
pub const MAX_PARAMETERS: usize = 255;
pub const MAX_LOOP_DEPTH: usize = 100;
pub const MAX_BLOCK_DEPTH: usize = 100;
pub const MAX_FUNCTION_DEPTH: usize = 100;
pub const MAX_ARRAY_LITERAL_ELEMENTS: usize = 1000;
pub const MAX_DICT_LITERAL_PAIRS: usize = 1000;

// ═══════════════════════════════════════════════════════════════
//  Error types
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct ParseError {
    pub token: Token,
    pub message: String,
    pub hint: Option<String>,
    pub source_line: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = if self.source_line.is_empty() {
            None
        } else {
            Some(self.source_line.as_str())
        };
        f.write_str(&diag::format_error(
            "PARSER ERROR",
            Some((self.token.line, self.token.column)),
            &self.message,
            line,
            self.hint.as_deref(),
        ))
    }
}

impl std::error::Error for ParseError {}

/// Every parse error from one run, surfaced together.
#[derive(Debug, Clone)]
pub struct ParseErrorBundle {
    pub errors: Vec<ParseError>,
}

impl fmt::Display for ParseErrorBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&diag::format_failure_summary(
            self.errors.len(),
            "parsing error",
        ))?;
        for e in &self.errors {
            write!(f, "{}", e)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseErrorBundle {}

// ═══════════════════════════════════════════════════════════════
//  Parser
// ═══════════════════════════════════════════════════════════════

pub struct Parser {
    tokens: Vec<Token>,
    lines: Vec<String>,
    current: usize,
    errors: Vec<ParseError>,
    loop_depth: usize,
    block_depth: usize,
    function_depth: usize,
    in_unsafe_block: bool,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    pub fn new(tokens: Vec<Token>, source: &str) -> Self {
        Self {
            tokens,
            lines: source.split('\n').map(|l| l.to_string()).collect(),
            current: 0,
            errors: Vec::new(),
            loop_depth: 0,
            block_depth: 0,
            function_depth: 0,
            in_unsafe_block: false,
        }
    }

    /// Parse the token stream into top-level statements, or surface every
    /// collected error as one bundle.
    pub fn parse(mut self) -> Result<Vec<Stmt>, ParseErrorBundle> {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(e) => {
                    self.errors.push(e);
                    self.synchronize();
                }
            }
        }

        if self.errors.is_empty() {
            Ok(statements)
        } else {
            Err(ParseErrorBundle {
                errors: self.errors,
            })
        }
    }

    // ── Declarations ─────────────────────────────────────────────

    fn declaration(&mut self) -> PResult<Stmt> {
        if self.match_kind(TokenKind::Import) {
            return self.import_statement();
        }
        if self.match_kind(TokenKind::Var) {
            return self.var_declaration();
        }
        if self.match_kind(TokenKind::Fun) {
            return self.function("function");
        }
        self.statement()
    }

    fn var_declaration(&mut self) -> PResult<Stmt> {
        if !self.check(TokenKind::Identifier) {
            let hint = "Variable declarations must follow this pattern:\n\
                        \x20      var variableName = value;\n\
                        \x20      var variableName;";
            return Err(self.error(self.peek().clone(), "Expect variable name after 'var'", Some(hint)));
        }

        let name = self.advance().clone();

        if name.lexeme.len() > 255 {
            let hint = format!(
                "Variable names must be 255 characters or fewer.\n\
                 \x20      Current length: {} characters.\n\
                 \x20      Use a shorter, more descriptive name.",
                name.lexeme.len()
            );
            let message = format!("Variable name too long: '{}...'", &name.lexeme[..50]);
            return Err(self.error(name, &message, Some(&hint)));
        }

        let initializer = if self.match_kind(TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };

        if !self.check(TokenKind::Semicolon) {
            let hint = "Variable declarations must end with a semicolon.\n\
                        \x20      Add ';' after the variable declaration.";
            return Err(self.error(
                self.peek().clone(),
                "Expect ';' after variable declaration",
                Some(hint),
            ));
        }
        self.advance();

        Ok(Stmt::Var { name, initializer })
    }

    fn function(&mut self, kind: &str) -> PResult<Stmt> {
        if !self.check(TokenKind::Identifier) {
            let hint = "Function declarations must have a name.\n\
                        \x20      Example: fun myFunction() { ... }";
            return Err(self.error(
                self.peek().clone(),
                &format!("Expect {} name", kind),
                Some(hint),
            ));
        }
        let name = self.advance().clone();

        if name.lexeme.len() > 255 {
            let hint = format!(
                "Function names must be 255 characters or fewer.\n\
                 \x20      Current length: {} characters.",
                name.lexeme.len()
            );
            let message = format!("Function name too long: '{}...'", &name.lexeme[..50]);
            return Err(self.error(name, &message, Some(&hint)));
        }

        if !self.check(TokenKind::LParen) {
            let hint = format!(
                "Function name must be followed by '('.\n\
                 \x20      Example: fun {}() {{ ... }}",
                name.lexeme
            );
            return Err(self.error(
                self.peek().clone(),
                &format!("Expect '(' after {} name", kind),
                Some(&hint),
            ));
        }
        self.advance();

        let mut params: Vec<Token> = Vec::new();
        let mut param_names: HashSet<String> = HashSet::new();

        if !self.check(TokenKind::RParen) {
            loop {
                if params.len() >= MAX_PARAMETERS {
                    let hint = format!(
                        "Box functions support up to {} parameters.\n\
                         \x20      Consider restructuring your function to use fewer parameters.",
                        MAX_PARAMETERS
                    );
                    return Err(self.error(
                        self.peek().clone(),
                        &format!("Cannot have more than {} parameters", MAX_PARAMETERS),
                        Some(&hint),
                    ));
                }

                if !self.check(TokenKind::Identifier) {
                    let hint = format!(
                        "Function parameters must be identifiers.\n\
                         \x20      Example: fun {}(param1, param2) {{ ... }}",
                        name.lexeme
                    );
                    return Err(self.error(self.peek().clone(), "Expect parameter name", Some(&hint)));
                }
                let param = self.advance().clone();

                if param_names.contains(&param.lexeme) {
                    let hint = format!(
                        "Each parameter name must be unique within the function.\n\
                         \x20      Parameter '{}' is already defined.\n\
                         \x20      Use different names for each parameter.",
                        param.lexeme
                    );
                    let message = format!("Duplicate parameter name '{}'", param.lexeme);
                    return Err(self.error(param, &message, Some(&hint)));
                }
                param_names.insert(param.lexeme.clone());
                params.push(param);

                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
                if self.check(TokenKind::RParen) {
                    let hint = format!(
                        "Remove the trailing comma before ')'.\n\
                         \x20      Example: fun {}(a, b) not fun {}(a, b,)",
                        name.lexeme, name.lexeme
                    );
                    return Err(self.error(
                        self.peek().clone(),
                        "Trailing comma in parameter list",
                        Some(&hint),
                    ));
                }
            }
        }

        self.consume(TokenKind::RParen, "Expect ')' after parameters")?;

        if !self.check(TokenKind::LBrace) {
            let hint = format!(
                "Function body must be enclosed in curly braces.\n\
                 \x20      Example: fun {}() {{ return 42; }}",
                name.lexeme
            );
            return Err(self.error(
                self.peek().clone(),
                &format!("Expect '{{' before {} body", kind),
                Some(&hint),
            ));
        }
        self.advance();

        self.function_depth += 1;
        if self.function_depth > MAX_FUNCTION_DEPTH {
            self.function_depth -= 1;
            let hint = "Function nesting is too deep (maximum 100 levels).\n\
                        \x20      Consider refactoring nested functions into separate top-level functions.";
            return Err(self.error(name, "Function nesting depth exceeds maximum", Some(hint)));
        }

        let body = self.block();
        self.function_depth -= 1;
        let body = body?;

        Ok(Stmt::Function { name, params, body })
    }

    // ── Statements ───────────────────────────────────────────────

    fn statement(&mut self) -> PResult<Stmt> {
        if self.match_kind(TokenKind::Print) {
            return self.print_statement();
        }
        if self.match_kind(TokenKind::If) {
            return self.if_statement();
        }
        if self.match_kind(TokenKind::While) {
            return self.while_statement();
        }
        if self.match_kind(TokenKind::For) {
            return self.for_statement();
        }
        if self.match_kind(TokenKind::Switch) {
            return self.switch_statement();
        }
        if self.match_kind(TokenKind::Return) {
            return self.return_statement();
        }
        if self.match_kind(TokenKind::Break) {
            return self.break_statement();
        }
        if self.match_kind(TokenKind::Unsafe) {
            return self.unsafe_statement();
        }
        if self.match_kind(TokenKind::LlvmInline) {
            return self.llvm_inline_statement();
        }
        if self.match_kind(TokenKind::LBrace) {
            let opening_brace = self.previous().clone();
            let statements = self.block()?;
            return Ok(Stmt::Block {
                statements,
                opening_brace,
            });
        }

        self.expression_statement()
    }

    fn print_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.previous().clone();
        let value = self.expression()?;

        if !self.check(TokenKind::Semicolon) {
            let hint = "Print statements must end with a semicolon.\n\
                        \x20      Example: print value;";
            return Err(self.error(
                self.peek().clone(),
                "Expect ';' after value in print statement",
                Some(hint),
            ));
        }
        self.advance();

        Ok(Stmt::Print {
            expression: value,
            keyword,
        })
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.previous().clone();

        if !self.check(TokenKind::LParen) {
            let hint = "If statements require a condition in parentheses.\n\
                        \x20      Example: if (x > 5) { ... }";
            return Err(self.error(self.peek().clone(), "Expect '(' after 'if'", Some(hint)));
        }
        self.advance();

        let condition = self.expression()?;

        if !self.check(TokenKind::RParen) {
            let hint = "Close the condition with ')' before the if body.\n\
                        \x20      Example: if (condition) { ... }";
            return Err(self.error(
                self.peek().clone(),
                "Expect ')' after if condition",
                Some(hint),
            ));
        }
        self.advance();

        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_kind(TokenKind::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
            keyword,
        })
    }

    fn while_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.previous().clone();

        self.loop_depth += 1;
        if self.loop_depth > MAX_LOOP_DEPTH {
            self.loop_depth -= 1;
            let hint = format!(
                "Loop nesting is too deep (maximum {} levels).\n\
                 \x20      Consider extracting inner loops into separate functions.",
                MAX_LOOP_DEPTH
            );
            return Err(self.error(keyword, "Loop nesting depth exceeds maximum", Some(&hint)));
        }

        let result = (|| {
            if !self.check(TokenKind::LParen) {
                let hint = "While loops require a condition in parentheses.\n\
                            \x20      Example: while (count < 10) { ... }";
                return Err(self.error(self.peek().clone(), "Expect '(' after 'while'", Some(hint)));
            }
            self.advance();

            let condition = self.expression()?;

            if !self.check(TokenKind::RParen) {
                let hint = "Close the condition with ')' before the loop body.\n\
                            \x20      Example: while (condition) { ... }";
                return Err(self.error(
                    self.peek().clone(),
                    "Expect ')' after while condition",
                    Some(hint),
                ));
            }
            self.advance();

            let body = Box::new(self.statement()?);
            Ok(Stmt::While {
                condition,
                body,
                keyword,
            })
        })();

        self.loop_depth -= 1;
        result
    }

    /// `for (init; cond; incr) body` desugars to
    /// `{ init; while (cond or true) { body; incr; } }`.
    fn for_statement(&mut self) -> PResult<Stmt> {
        let for_keyword = self.previous().clone();

        self.loop_depth += 1;
        if self.loop_depth > MAX_LOOP_DEPTH {
            self.loop_depth -= 1;
            let hint = format!(
                "Loop nesting is too deep (maximum {} levels).\n\
                 \x20      Consider extracting inner loops into separate functions.",
                MAX_LOOP_DEPTH
            );
            return Err(self.error(for_keyword, "Loop nesting depth exceeds maximum", Some(&hint)));
        }

        let result = (|| {
            if !self.check(TokenKind::LParen) {
                let hint = "For loops require three clauses in parentheses.\n\
                            \x20      Example: for (var i = 0; i < 10; i = i + 1) { ... }";
                return Err(self.error(self.peek().clone(), "Expect '(' after 'for'", Some(hint)));
            }
            self.advance();

            let initializer = if self.match_kind(TokenKind::Semicolon) {
                None
            } else if self.match_kind(TokenKind::Var) {
                Some(self.var_declaration()?)
            } else {
                Some(self.expression_statement()?)
            };

            let condition = if !self.check(TokenKind::Semicolon) {
                Some(self.expression()?)
            } else {
                None
            };

            if !self.check(TokenKind::Semicolon) {
                let hint = "For loop clauses must be separated by semicolons.\n\
                            \x20      Example: for (init; condition; increment) { ... }";
                return Err(self.error(
                    self.peek().clone(),
                    "Expect ';' after loop condition",
                    Some(hint),
                ));
            }
            self.advance();

            let increment = if !self.check(TokenKind::RParen) {
                Some(self.expression()?)
            } else {
                None
            };

            if !self.check(TokenKind::RParen) {
                let hint = "Close the for loop clauses with ')' before the body.\n\
                            \x20      Example: for (init; cond; incr) { ... }";
                return Err(self.error(
                    self.peek().clone(),
                    "Expect ')' after for clauses",
                    Some(hint),
                ));
            }
            self.advance();

            let mut body = self.statement()?;

            if let Some(increment) = increment {
                body = Stmt::Block {
                    statements: vec![body, Stmt::Expr { expression: increment }],
                    opening_brace: for_keyword.clone(),
                };
            }

            let condition = condition.unwrap_or(Expr::Literal {
                value: LiteralValue::Bool(true),
                token: for_keyword.clone(),
            });

            body = Stmt::While {
                condition,
                body: Box::new(body),
                keyword: for_keyword.clone(),
            };

            if let Some(initializer) = initializer {
                body = Stmt::Block {
                    statements: vec![initializer, body],
                    opening_brace: for_keyword.clone(),
                };
            }

            Ok(body)
        })();

        self.loop_depth -= 1;
        result
    }

    fn return_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.previous().clone();

        if self.function_depth == 0 {
            let hint = "Return statements can only be used inside functions.\n\
                        \x20      Move this return statement inside a function body.";
            return Err(self.error(keyword, "Cannot use 'return' outside of a function", Some(hint)));
        }

        let value = if !self.check(TokenKind::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };

        if !self.check(TokenKind::Semicolon) {
            let hint = "Return statements must end with a semicolon.\n\
                        \x20      Example: return value;";
            return Err(self.error(
                self.peek().clone(),
                "Expect ';' after return value",
                Some(hint),
            ));
        }
        self.advance();

        Ok(Stmt::Return { keyword, value })
    }

    fn break_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.previous().clone();

        if self.loop_depth == 0 {
            let hint = "Break statements can only be used inside loops or switch statements.\n\
                        \x20      Move this break statement inside a loop or switch body.";
            return Err(self.error(
                keyword,
                "Cannot use 'break' outside of a loop or switch",
                Some(hint),
            ));
        }

        if !self.check(TokenKind::Semicolon) {
            let hint = "Break statements must end with a semicolon.\n\
                        \x20      Example: break;";
            return Err(self.error(self.peek().clone(), "Expect ';' after 'break'", Some(hint)));
        }
        self.advance();

        Ok(Stmt::Break { keyword })
    }

    fn switch_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.previous().clone();

        if !self.check(TokenKind::LParen) {
            let hint = "Switch statements require a condition in parentheses.\n\
                        \x20      Example: switch (value) { case 1: ... }";
            return Err(self.error(self.peek().clone(), "Expect '(' after 'switch'", Some(hint)));
        }
        self.advance();

        let condition = self.expression()?;

        if !self.check(TokenKind::RParen) {
            let hint = "Close the condition with ')' before the switch body.\n\
                        \x20      Example: switch (condition) { ... }";
            return Err(self.error(
                self.peek().clone(),
                "Expect ')' after switch condition",
                Some(hint),
            ));
        }
        self.advance();

        if !self.check(TokenKind::LBrace) {
            let hint = "Switch body must be enclosed in curly braces.\n\
                        \x20      Example: switch (x) { case 1: ... }";
            return Err(self.error(
                self.peek().clone(),
                "Expect '{' before switch body",
                Some(hint),
            ));
        }
        self.advance();

        let mut cases: Vec<CaseClause> = Vec::new();
        let mut default_case: Option<Vec<Stmt>> = None;
        let mut seen_default = false;

        // break is legal inside a switch body
        self.loop_depth += 1;

        let result = (|| {
            while !self.check(TokenKind::RBrace) && !self.is_at_end() {
                if self.match_kind(TokenKind::Case) {
                    if seen_default {
                        let hint = "Case clauses cannot appear after default clause.\n\
                                    \x20      Move all case clauses before the default clause.";
                        return Err(self.error(self.previous().clone(), "Case after default", Some(hint)));
                    }

                    let case_value = self.expression()?;

                    if !self.check(TokenKind::Colon) {
                        let hint = "Case value must be followed by ':'.\n\
                                    \x20      Example: case 1: statements...";
                        return Err(self.error(
                            self.peek().clone(),
                            "Expect ':' after case value",
                            Some(hint),
                        ));
                    }
                    self.advance();

                    let mut statements = Vec::new();
                    while !self.check(TokenKind::Case)
                        && !self.check(TokenKind::Default)
                        && !self.check(TokenKind::RBrace)
                        && !self.is_at_end()
                    {
                        statements.push(self.declaration()?);
                    }

                    cases.push(CaseClause {
                        value: case_value,
                        statements,
                    });
                } else if self.match_kind(TokenKind::Default) {
                    if seen_default {
                        let hint = "Only one default clause is allowed per switch.\n\
                                    \x20      Remove the duplicate default clause.";
                        return Err(self.error(
                            self.previous().clone(),
                            "Duplicate default clause",
                            Some(hint),
                        ));
                    }
                    seen_default = true;

                    if !self.check(TokenKind::Colon) {
                        let hint = "Default must be followed by ':'.\n\
                                    \x20      Example: default: statements...";
                        return Err(self.error(
                            self.peek().clone(),
                            "Expect ':' after 'default'",
                            Some(hint),
                        ));
                    }
                    self.advance();

                    let mut statements = Vec::new();
                    while !self.check(TokenKind::Case)
                        && !self.check(TokenKind::Default)
                        && !self.check(TokenKind::RBrace)
                        && !self.is_at_end()
                    {
                        statements.push(self.declaration()?);
                    }

                    default_case = Some(statements);
                } else {
                    let hint = "Switch body must contain case or default clauses.\n\
                                \x20      Example: switch (x) { case 1: ... default: ... }";
                    return Err(self.error(
                        self.peek().clone(),
                        "Expect 'case' or 'default' in switch body",
                        Some(hint),
                    ));
                }
            }

            if !self.check(TokenKind::RBrace) {
                let hint = "Switch statements must be closed with '}'.\n\
                            \x20      Check that all opening '{' have matching closing '}'.";
                return Err(self.error(
                    self.peek().clone(),
                    "Expect '}' after switch body",
                    Some(hint),
                ));
            }
            self.advance();

            Ok(Stmt::Switch {
                keyword,
                condition,
                cases,
                default_case,
            })
        })();

        self.loop_depth -= 1;
        result
    }

    fn unsafe_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.previous().clone();

        if !self.check(TokenKind::LBrace) {
            let hint = "Unsafe blocks must be followed by '{'.\n\
                        \x20      Example: unsafe { ... }";
            return Err(self.error(self.peek().clone(), "Expect '{' after 'unsafe'", Some(hint)));
        }
        self.advance();

        let prev_unsafe = self.in_unsafe_block;
        self.in_unsafe_block = true;

        let result = (|| {
            let mut statements = Vec::new();
            while !self.check(TokenKind::RBrace) && !self.is_at_end() {
                statements.push(self.declaration()?);
            }

            if !self.check(TokenKind::RBrace) {
                let hint = "Unsafe blocks must be closed with '}'.\n\
                            \x20      Check that all opening '{' have matching closing '}'.";
                return Err(self.error(
                    self.peek().clone(),
                    "Expect '}' after unsafe block",
                    Some(hint),
                ));
            }
            self.advance();

            Ok(Stmt::Unsafe { keyword, statements })
        })();

        self.in_unsafe_block = prev_unsafe;
        result
    }

    fn llvm_inline_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.previous().clone();

        if !self.in_unsafe_block {
            let hint = "llvm_inline() can only be used inside unsafe blocks.\n\
                        \x20      Wrap your code in: unsafe { llvm_inline(...); }";
            return Err(self.error(keyword, "llvm_inline() requires unsafe context", Some(hint)));
        }

        if !self.check(TokenKind::LParen) {
            let hint = "llvm_inline requires parentheses.\n\
                        \x20      Example: llvm_inline(\"LLVM IR code\");";
            return Err(self.error(
                self.peek().clone(),
                "Expect '(' after 'llvm_inline'",
                Some(hint),
            ));
        }
        self.advance();

        if !self.check(TokenKind::Str) {
            let hint = "llvm_inline requires a string literal containing LLVM IR code.\n\
                        \x20      Example: llvm_inline(\"%result = add i32 5, 10\");";
            return Err(self.error(
                self.peek().clone(),
                "Expect string literal with LLVM IR code",
                Some(hint),
            ));
        }
        let code_token = self.advance().clone();
        let code = match code_token.literal {
            Some(LiteralValue::Str(s)) => s,
            _ => String::new(),
        };

        if !self.check(TokenKind::RParen) {
            let hint = "llvm_inline call must be closed with ')'.\n\
                        \x20      Check that all opening '(' have matching closing ')'.";
            return Err(self.error(
                self.peek().clone(),
                "Expect ')' after LLVM IR code",
                Some(hint),
            ));
        }
        self.advance();

        if !self.check(TokenKind::Semicolon) {
            let hint = "Statements must end with semicolon.\n\
                        \x20      Add ';' at the end of the statement.";
            return Err(self.error(
                self.peek().clone(),
                "Expect ';' after llvm_inline() call",
                Some(hint),
            ));
        }
        self.advance();

        Ok(Stmt::LlvmInline {
            keyword,
            code,
            variables_map: HashMap::new(),
        })
    }

    fn import_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.previous().clone();

        if !self.check(TokenKind::Str) {
            let hint = "import requires a string literal with the file path.\n\
                        \x20      Example: import \"module.box\";";
            return Err(self.error(
                self.peek().clone(),
                "Expect string literal with file path after 'import'",
                Some(hint),
            ));
        }

        let path_token = self.advance().clone();
        let file_path = match &path_token.literal {
            Some(LiteralValue::Str(s)) => s.clone(),
            _ => {
                let hint = "import path must be a string.\n\
                            \x20      Example: import \"utils.box\";";
                return Err(self.error(path_token, "Invalid import path", Some(hint)));
            }
        };

        if file_path.is_empty() {
            let hint = "Import path cannot be empty.\n\
                        \x20      Provide a valid file path like \"module.box\"";
            return Err(self.error(path_token, "Empty import path", Some(hint)));
        }

        if !self.check(TokenKind::Semicolon) {
            let hint = "Import statements must end with a semicolon.\n\
                        \x20      Example: import \"module.box\";";
            return Err(self.error(
                self.peek().clone(),
                "Expect ';' after import path",
                Some(hint),
            ));
        }
        self.advance();

        Ok(Stmt::Import {
            keyword,
            file_path,
            path_token,
        })
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        self.block_depth += 1;
        if self.block_depth > MAX_BLOCK_DEPTH {
            self.block_depth -= 1;
            let hint = format!(
                "Block nesting is too deep (maximum {} levels).\n\
                 \x20      Consider refactoring deeply nested code.",
                MAX_BLOCK_DEPTH
            );
            return Err(self.error(
                self.peek().clone(),
                "Block nesting depth exceeds maximum",
                Some(&hint),
            ));
        }

        let result = (|| {
            let mut statements = Vec::new();
            while !self.check(TokenKind::RBrace) && !self.is_at_end() {
                statements.push(self.declaration()?);
            }

            if !self.check(TokenKind::RBrace) {
                let hint = "Blocks must be closed with '}'.\n\
                            \x20      Check that all opening '{' have matching closing '}'.";
                return Err(self.error(self.peek().clone(), "Expect '}' after block", Some(hint)));
            }
            self.advance();

            Ok(statements)
        })();

        self.block_depth -= 1;
        result
    }

    fn expression_statement(&mut self) -> PResult<Stmt> {
        let expr = self.expression()?;

        if !self.check(TokenKind::Semicolon) {
            let hint = "Statements must end with a semicolon.\n\
                        \x20      Add ';' at the end of the statement.";
            return Err(self.error(
                self.peek().clone(),
                "Expect ';' after expression",
                Some(hint),
            ));
        }
        self.advance();

        Ok(Stmt::Expr { expression: expr })
    }

    // ── Expressions ──────────────────────────────────────────────

    fn expression(&mut self) -> PResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> PResult<Expr> {
        let expr = self.or_expr()?;

        if self.match_kind(TokenKind::Equal) {
            let equals = self.previous().clone();
            let value = self.assignment()?;

            return match expr {
                Expr::Variable { name } => Ok(Expr::Assign {
                    name,
                    value: Box::new(value),
                }),
                Expr::IndexGet {
                    container,
                    index,
                    bracket,
                } => Ok(Expr::IndexSet {
                    container,
                    index,
                    value: Box::new(value),
                    bracket,
                }),
                _ => {
                    let hint = "Invalid assignment target. Only variables and array elements can be assigned to.\n\
                                \x20      Example: variableName = value; or arr[0] = value;\n\
                                \x20      Cannot assign to: literals, expressions, function calls";
                    Err(self.error(equals, "Invalid assignment target", Some(hint)))
                }
            };
        }

        Ok(expr)
    }

    fn or_expr(&mut self) -> PResult<Expr> {
        let mut expr = self.and_expr()?;

        while self.match_kind(TokenKind::Or) {
            let op = self.previous().clone();
            let right = self.and_expr()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn and_expr(&mut self) -> PResult<Expr> {
        let mut expr = self.equality()?;

        while self.match_kind(TokenKind::And) {
            let op = self.previous().clone();
            let right = self.equality()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn equality(&mut self) -> PResult<Expr> {
        let mut expr = self.comparison()?;

        while self.match_any(&[TokenKind::BangEqual, TokenKind::EqualEqual]) {
            let op = self.previous().clone();
            let right = self.comparison()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let mut expr = self.term()?;

        while self.match_any(&[
            TokenKind::Greater,
            TokenKind::GreaterEqual,
            TokenKind::Less,
            TokenKind::LessEqual,
        ]) {
            let op = self.previous().clone();
            let right = self.term()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn term(&mut self) -> PResult<Expr> {
        let mut expr = self.factor()?;

        while self.match_any(&[TokenKind::Minus, TokenKind::Plus]) {
            let op = self.previous().clone();
            let right = self.factor()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn factor(&mut self) -> PResult<Expr> {
        let mut expr = self.unary()?;

        while self.match_any(&[TokenKind::Slash, TokenKind::Star, TokenKind::Percent]) {
            let op = self.previous().clone();
            let right = self.unary()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn unary(&mut self) -> PResult<Expr> {
        if self.match_any(&[TokenKind::Bang, TokenKind::Minus]) {
            let op = self.previous().clone();
            let right = self.unary()?;
            return Ok(Expr::Unary {
                op,
                right: Box::new(right),
            });
        }

        self.call()
    }

    fn call(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;

        loop {
            if self.match_kind(TokenKind::LParen) {
                expr = self.finish_call(expr)?;
            } else if self.match_kind(TokenKind::LBracket) {
                expr = self.finish_index(expr)?;
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> PResult<Expr> {
        let mut arguments = Vec::new();

        if !self.check(TokenKind::RParen) {
            loop {
                if arguments.len() >= MAX_ARGUMENTS {
                    let hint = format!(
                        "Function calls support up to {} arguments.\n\
                         \x20      Consider restructuring to use fewer arguments.",
                        MAX_ARGUMENTS
                    );
                    return Err(self.error(
                        self.peek().clone(),
                        &format!("Cannot have more than {} arguments", MAX_ARGUMENTS),
                        Some(&hint),
                    ));
                }

                arguments.push(self.expression()?);

                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
                if self.check(TokenKind::RParen) {
                    let hint = "Remove the trailing comma before ')'.\n\
                                \x20      Example: func(a, b) not func(a, b,)";
                    return Err(self.error(
                        self.peek().clone(),
                        "Trailing comma in argument list",
                        Some(hint),
                    ));
                }
            }
        }

        if !self.check(TokenKind::RParen) {
            let hint = "Function calls must be closed with ')'.\n\
                        \x20      Example: functionName(arg1, arg2)";
            return Err(self.error(self.peek().clone(), "Expect ')' after arguments", Some(hint)));
        }
        let paren = self.advance().clone();

        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        })
    }

    fn finish_index(&mut self, container: Expr) -> PResult<Expr> {
        let index = self.expression()?;

        if !self.check(TokenKind::RBracket) {
            let hint = "Array indexing must be closed with ']'.\n\
                        \x20      Example: arr[index]";
            return Err(self.error(
                self.peek().clone(),
                "Expect ']' after array index",
                Some(hint),
            ));
        }
        let bracket = self.advance().clone();

        Ok(Expr::IndexGet {
            container: Box::new(container),
            index: Box::new(index),
            bracket,
        })
    }

    fn array_literal(&mut self) -> PResult<Expr> {
        let mut elements = Vec::new();

        if !self.check(TokenKind::RBracket) {
            loop {
                if elements.len() >= MAX_ARRAY_LITERAL_ELEMENTS {
                    let hint = "Array literals support up to 1000 elements.\n\
                                \x20      Consider using a different data structure or initialization method.";
                    return Err(self.error(self.peek().clone(), "Array literal too large", Some(hint)));
                }

                elements.push(self.expression()?);

                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
                if self.check(TokenKind::RBracket) {
                    let hint = "Remove the trailing comma before ']'.\n\
                                \x20      Example: [1, 2, 3] not [1, 2, 3,]";
                    return Err(self.error(
                        self.peek().clone(),
                        "Trailing comma in array literal",
                        Some(hint),
                    ));
                }
            }
        }

        if !self.check(TokenKind::RBracket) {
            let hint = "Array literals must be closed with ']'.\n\
                        \x20      Example: [1, 2, 3]";
            return Err(self.error(
                self.peek().clone(),
                "Expect ']' after array elements",
                Some(hint),
            ));
        }
        let closing = self.advance().clone();

        Ok(Expr::ArrayLiteral {
            elements,
            bracket: closing,
        })
    }

    fn dict_literal(&mut self) -> PResult<Expr> {
        let brace = self.previous().clone();
        let mut pairs = Vec::new();

        if !self.check(TokenKind::RBrace) {
            loop {
                if pairs.len() >= MAX_DICT_LITERAL_PAIRS {
                    let hint = "Dictionary literals support up to 1000 key-value pairs.\n\
                                \x20      Consider using a different data structure or initialization method.";
                    return Err(self.error(
                        self.peek().clone(),
                        "Dictionary literal too large",
                        Some(hint),
                    ));
                }

                let key = self.expression()?;

                if !self.check(TokenKind::Colon) {
                    let hint = "Dictionary key-value pairs must be separated by ':'.\n\
                                \x20      Example: {key: value}";
                    return Err(self.error(
                        self.peek().clone(),
                        "Expect ':' after dictionary key",
                        Some(hint),
                    ));
                }
                self.advance();

                let value = self.expression()?;
                pairs.push((key, value));

                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
                if self.check(TokenKind::RBrace) {
                    let hint = "Remove the trailing comma before '}'.\n\
                                \x20      Example: {1: 2, 3: 4} not {1: 2, 3: 4,}";
                    return Err(self.error(
                        self.peek().clone(),
                        "Trailing comma in dictionary literal",
                        Some(hint),
                    ));
                }
            }
        }

        if !self.check(TokenKind::RBrace) {
            let hint = "Dictionary literals must be closed with '}'.\n\
                        \x20      Example: {1: 2}";
            return Err(self.error(
                self.peek().clone(),
                "Expect '}' after dictionary elements",
                Some(hint),
            ));
        }
        self.advance();

        Ok(Expr::DictLiteral { pairs, brace })
    }

    fn primary(&mut self) -> PResult<Expr> {
        if self.match_any(&[TokenKind::False, TokenKind::True, TokenKind::Nil]) {
            let token = self.previous().clone();
            let value = match token.kind {
                TokenKind::False => LiteralValue::Bool(false),
                TokenKind::True => LiteralValue::Bool(true),
                _ => LiteralValue::Nil,
            };
            return Ok(Expr::Literal { value, token });
        }

        if self.match_kind(TokenKind::Number) {
            let token = self.previous().clone();
            let value = match &token.literal {
                Some(v @ LiteralValue::Number(_)) => v.clone(),
                _ => {
                    return Err(self.error(
                        token,
                        "Internal error: NUMBER token without numeric value",
                        None,
                    ))
                }
            };
            return Ok(Expr::Literal { value, token });
        }

        if self.match_kind(TokenKind::Str) {
            let token = self.previous().clone();
            let value = match &token.literal {
                Some(v @ LiteralValue::Str(_)) => v.clone(),
                _ => {
                    return Err(self.error(
                        token,
                        "Internal error: STRING token without string value",
                        None,
                    ))
                }
            };
            return Ok(Expr::Literal { value, token });
        }

        // Built-in names parse as variables so they can be callees.
        if self.check(TokenKind::Identifier) || self.peek().kind.is_builtin_callable() {
            let name = self.advance().clone();
            return Ok(Expr::Variable { name });
        }

        if self.match_kind(TokenKind::LBracket) {
            return self.array_literal();
        }

        if self.match_kind(TokenKind::LBrace) {
            return self.dict_literal();
        }

        if self.match_kind(TokenKind::LParen) {
            let expr = self.expression()?;

            if !self.check(TokenKind::RParen) {
                let hint = "Grouped expressions must be closed with ')'.\n\
                            \x20      Check that all opening '(' have matching closing ')'.";
                return Err(self.error(
                    self.peek().clone(),
                    "Expect ')' after expression",
                    Some(hint),
                ));
            }
            self.advance();

            return Ok(Expr::Grouping {
                expression: Box::new(expr),
            });
        }

        let current = self.peek().clone();
        let hint = match current.kind {
            TokenKind::Semicolon => {
                "Unexpected semicolon. Did you forget an expression before ';'?".to_string()
            }
            TokenKind::RBrace => {
                "Unexpected '}'. Check for matching '{' or missing expression.".to_string()
            }
            TokenKind::RParen => {
                "Unexpected ')'. Check for matching '(' or missing expression.".to_string()
            }
            TokenKind::Plus | TokenKind::Star | TokenKind::Slash | TokenKind::Percent => format!(
                "'{}' requires a left operand.\n\
                 \x20      Example: value {} 5",
                current.lexeme, current.lexeme
            ),
            TokenKind::EndOfFile => {
                "Unexpected end of file. Check for unclosed blocks or incomplete expressions."
                    .to_string()
            }
            _ => "This token cannot start an expression.\n\
                  \x20      Valid expression starters: numbers, strings, identifiers, '(', '[', '{', true, false, nil"
                .to_string(),
        };

        Err(self.error(current, "Expect expression", Some(&hint)))
    }

    // ── Recovery ─────────────────────────────────────────────────

    /// Panic-mode recovery: skip tokens until just past a `;` or in front of
    /// a statement keyword, then resume parsing.
    fn synchronize(&mut self) {
        self.advance();

        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }

            match self.peek().kind {
                TokenKind::Var
                | TokenKind::Fun
                | TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Print
                | TokenKind::Return
                | TokenKind::Switch
                | TokenKind::Break => return,
                _ => {}
            }

            self.advance();
        }
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_any(&mut self, kinds: &[TokenKind]) -> bool {
        for &kind in kinds {
            if self.check(kind) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check(&self, kind: TokenKind) -> bool {
        !self.is_at_end() && self.peek().kind == kind
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::EndOfFile
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> PResult<Token> {
        if self.check(kind) {
            return Ok(self.advance().clone());
        }
        Err(self.error(self.peek().clone(), message, None))
    }

    fn error(&self, token: Token, message: &str, hint: Option<&str>) -> ParseError {
        let source_line = self
            .lines
            .get(token.line.saturating_sub(1) as usize)
            .cloned()
            .unwrap_or_default();
        ParseError {
            token,
            message: message.to_string(),
            hint: hint.map(|h| h.to_string()),
            source_line,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Unit tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::Lexer;

    fn parse(source: &str) -> Vec<Stmt> {
        let tokens = Lexer::new(source).scan_tokens().unwrap();
        Parser::new(tokens, source).parse().unwrap()
    }

    fn parse_err(source: &str) -> ParseErrorBundle {
        let tokens = Lexer::new(source).scan_tokens().unwrap();
        Parser::new(tokens, source).parse().unwrap_err()
    }

    #[test]
    fn test_var_declaration() {
        let stmts = parse("var x = 42;");
        assert_eq!(stmts.len(), 1);
        match &stmts[0] {
            Stmt::Var { name, initializer } => {
                assert_eq!(name.lexeme, "x");
                assert!(initializer.is_some());
            }
            other => panic!("expected Var, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_source_is_empty_program() {
        assert!(parse("  // nothing here\n/* at all */").is_empty());
    }

    #[test]
    fn test_precedence() {
        let stmts = parse("var x = 1 + 2 * 3;");
        let init = match &stmts[0] {
            Stmt::Var { initializer, .. } => initializer.as_ref().unwrap(),
            _ => unreachable!(),
        };
        // + at the root, * nested on the right
        match init {
            Expr::Binary { op, right, .. } => {
                assert_eq!(op.kind, TokenKind::Plus);
                assert!(matches!(right.as_ref(), Expr::Binary { op, .. } if op.kind == TokenKind::Star));
            }
            other => panic!("expected Binary, got {:?}", other),
        }
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let stmts = parse("var a; var b; a = b = 1;");
        match &stmts[2] {
            Stmt::Expr { expression } => match expression {
                Expr::Assign { name, value } => {
                    assert_eq!(name.lexeme, "a");
                    assert!(matches!(value.as_ref(), Expr::Assign { .. }));
                }
                other => panic!("expected Assign, got {:?}", other),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_index_assignment_becomes_index_set() {
        let stmts = parse("var a = [1]; a[0] = 2;");
        match &stmts[1] {
            Stmt::Expr { expression } => {
                assert!(matches!(expression, Expr::IndexSet { .. }));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_invalid_assignment_target() {
        let bundle = parse_err("1 = 2;");
        assert_eq!(bundle.errors[0].message, "Invalid assignment target");
        assert_eq!(bundle.errors[0].token.kind, TokenKind::Equal);
    }

    #[test]
    fn test_for_desugars_to_while() {
        let stmts = parse("for (var i = 0; i < 3; i = i + 1) { print i; }");
        // Outer block: [initializer, while]
        match &stmts[0] {
            Stmt::Block { statements, .. } => {
                assert_eq!(statements.len(), 2);
                assert!(matches!(statements[0], Stmt::Var { .. }));
                assert!(matches!(statements[1], Stmt::While { .. }));
            }
            other => panic!("expected Block, got {:?}", other),
        }
    }

    #[test]
    fn test_for_without_condition_loops_on_true() {
        let stmts = parse("for (;;) { break; }");
        match &stmts[0] {
            Stmt::While { condition, .. } => {
                assert!(matches!(
                    condition,
                    Expr::Literal {
                        value: LiteralValue::Bool(true),
                        ..
                    }
                ));
            }
            other => panic!("expected While, got {:?}", other),
        }
    }

    #[test]
    fn test_switch_with_cases_and_default() {
        let stmts = parse(
            "switch (x) { case 1: print 1; break; case 2: print 2; default: print 0; }",
        );
        match &stmts[0] {
            Stmt::Switch {
                cases,
                default_case,
                ..
            } => {
                assert_eq!(cases.len(), 2);
                assert!(default_case.is_some());
            }
            other => panic!("expected Switch, got {:?}", other),
        }
    }

    #[test]
    fn test_case_after_default_rejected() {
        let bundle = parse_err("switch (x) { default: print 0; case 1: print 1; }");
        assert!(bundle.errors[0].message.contains("Case after default"));
    }

    #[test]
    fn test_break_outside_loop_rejected() {
        let bundle = parse_err("break;");
        assert!(bundle.errors[0]
            .message
            .contains("Cannot use 'break' outside of a loop or switch"));
    }

    #[test]
    fn test_return_outside_function_rejected() {
        let bundle = parse_err("return 1;");
        assert!(bundle.errors[0]
            .message
            .contains("Cannot use 'return' outside of a function"));
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let bundle = parse_err("fun f(a, a) { return a; }");
        assert!(bundle.errors[0].message.contains("Duplicate parameter name"));
    }

    #[test]
    fn test_trailing_comma_in_call() {
        let bundle = parse_err("var x = f(1, 2,);");
        assert!(bundle.errors[0]
            .message
            .contains("Trailing comma in argument list"));
    }

    #[test]
    fn test_llvm_inline_requires_unsafe() {
        let bundle = parse_err("llvm_inline(\"ret void\");");
        assert!(bundle.errors[0]
            .message
            .contains("llvm_inline() requires unsafe context"));
    }

    #[test]
    fn test_llvm_inline_inside_unsafe() {
        let stmts = parse("unsafe { llvm_inline(\"ret void\"); }");
        match &stmts[0] {
            Stmt::Unsafe { statements, .. } => {
                assert!(matches!(statements[0], Stmt::LlvmInline { .. }));
            }
            other => panic!("expected Unsafe, got {:?}", other),
        }
    }

    #[test]
    fn test_builtins_usable_as_callees() {
        let stmts = parse("var p = malloc(8); free(p);");
        assert_eq!(stmts.len(), 2);
        match &stmts[1] {
            Stmt::Expr { expression } => {
                assert_eq!(expression.callee_name(), Some("free"));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_dict_literal() {
        let stmts = parse("var d = {1: 2, 3: 4};");
        match &stmts[0] {
            Stmt::Var {
                initializer: Some(Expr::DictLiteral { pairs, .. }),
                ..
            } => assert_eq!(pairs.len(), 2),
            other => panic!("expected dict literal, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_import_path_rejected() {
        let bundle = parse_err("import \"\";");
        assert!(bundle.errors[0].message.contains("Empty import path"));
    }

    #[test]
    fn test_multiple_errors_collected() {
        let bundle = parse_err("var ; var x = 1; print ;");
        assert!(bundle.errors.len() >= 2);
    }

    #[test]
    fn test_recovery_continues_after_error() {
        // The bad statement is dropped but the good ones still parse, which
        // shows synchronize() found the next statement boundary.
        let bundle = parse_err("var = 5; var ok = 1;");
        assert_eq!(bundle.errors.len(), 1);
    }

    #[test]
    fn test_argument_limit() {
        let many: Vec<String> = (0..=255).map(|i| i.to_string()).collect();
        let source = format!("var x = f({});", many.join(", "));
        let bundle = parse_err(&source);
        assert!(bundle.errors[0]
            .message
            .contains("Cannot have more than 255 arguments"));

        let exactly: Vec<String> = (0..255).map(|i| i.to_string()).collect();
        let source = format!("var x = f({});", exactly.join(", "));
        assert_eq!(parse(&source).len(), 1);
    }
}
