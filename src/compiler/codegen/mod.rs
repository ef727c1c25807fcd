//! LLVM IR code generation for the Box language.
//!
//! Emits a textual typed IR module consumable by `llc`/`clang`. Values live
//! in stack slots (the alloca/load/store pattern) so mem2reg recovers SSA;
//! short-circuit logic and the container walkers use stack slots instead of
//! PHIs. Codegen fails fast: the first type error aborts lowering.

use crate::compiler::ast::{CaseClause, Expr, Stmt};
use crate::compiler::diag;
use crate::compiler::optimizer::{Optimizer, OptimizerConfig};
use crate::compiler::token::{LiteralValue, Token, TokenKind};
use std::collections::HashMap;
use std::fmt;

mod builtins;
mod containers;
mod inline_ir;
mod value;

pub use value::{BoxType, BoxValue};
use value::VarSlot;

// ═══════════════════════════════════════════════════════════════
//  Error type
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct CodegenError {
    pub message: String,
    pub token: Option<Token>,
    pub hint: Option<String>,
}

impl CodegenError {
    pub(crate) fn new(
        message: impl Into<String>,
        token: Option<Token>,
        hint: Option<String>,
    ) -> Self {
        Self {
            message: message.into(),
            token,
            hint,
        }
    }
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let position = self.token.as_ref().map(|t| (t.line, t.column));
        f.write_str(&diag::format_error(
            "CODEGEN ERROR",
            position,
            &self.message,
            None,
            self.hint.as_deref(),
        ))
    }
}

impl std::error::Error for CodegenError {}

pub(crate) type CResult<T> = Result<T, CodegenError>;

// ═══════════════════════════════════════════════════════════════
//  Code generator
// ═══════════════════════════════════════════════════════════════

pub struct Codegen {
    // Output buffers
    string_globals: String,
    finished_fns: Vec<String>,
    body: String,

    // Unique-name counters (module-wide so buffers can interleave)
    temp_counter: u32,
    label_counter: u32,
    string_counter: u32,

    // Symbol tables
    string_constants: HashMap<String, String>,
    scopes: Vec<HashMap<String, VarSlot>>,
    functions: HashMap<String, Vec<String>>,

    // State within a function
    break_blocks: Vec<String>,
    block_terminated: bool,
    in_unsafe_block: bool,
    inline_vars: HashMap<String, String>,
    needs_realloc: bool,

    optimizer: Option<Optimizer>,
}

impl Codegen {
    pub fn new(optimize: bool, optimize_level: u8) -> Self {
        let optimizer = if optimize {
            Some(Optimizer::new(OptimizerConfig::for_level(optimize_level)))
        } else {
            None
        };

        Self {
            string_globals: String::new(),
            finished_fns: Vec::new(),
            body: String::new(),
            temp_counter: 0,
            label_counter: 0,
            string_counter: 0,
            string_constants: HashMap::new(),
            scopes: Vec::new(),
            functions: HashMap::new(),
            break_blocks: Vec::new(),
            block_terminated: false,
            in_unsafe_block: false,
            inline_vars: HashMap::new(),
            needs_realloc: false,
            optimizer,
        }
    }

    /// Lower the program to a textual IR module.
    pub fn generate(&mut self, statements: Vec<Stmt>) -> CResult<String> {
        let statements = match self.optimizer.as_mut() {
            Some(optimizer) => optimizer.optimize(statements),
            None => statements,
        };

        self.body.push_str("define i32 @main() {\n");
        self.start_block("entry");
        self.push_scope();

        for stmt in &statements {
            self.visit_stmt(stmt)?;
        }

        if !self.block_terminated {
            self.line("ret i32 0");
        }
        self.pop_scope();
        self.body.push_str("}\n");

        Ok(self.assemble())
    }

    fn assemble(&mut self) -> String {
        let mut module = String::new();
        module.push_str("; ModuleID = 'box_module'\n");
        module.push_str("source_filename = \"box_module\"\n\n");

        module.push_str("%Array = type { i64, ptr }\n");
        module.push_str("%DictEntry = type { double, double, i1 }\n");
        module.push_str("%Dict = type { i64, ptr }\n\n");

        module.push_str(RUNTIME_DECLS);
        if self.needs_realloc {
            module.push_str("declare ptr @realloc(ptr, i64)\n");
        }
        module.push_str("@stdin = external global ptr\n");
        module.push_str("@stdout = external global ptr\n\n");

        module.push_str(&self.string_globals);
        if !self.string_globals.is_empty() {
            module.push('\n');
        }

        for func in &self.finished_fns {
            module.push_str(func);
            module.push('\n');
        }

        module.push_str(&self.body);
        module
    }

    // ── Emission helpers ─────────────────────────────────────────

    fn tmp(&mut self) -> String {
        let name = format!("%t{}", self.temp_counter);
        self.temp_counter += 1;
        name
    }

    fn label(&mut self, base: &str) -> String {
        let name = format!("{}{}", base, self.label_counter);
        self.label_counter += 1;
        name
    }

    fn line(&mut self, text: &str) {
        self.body.push_str("  ");
        self.body.push_str(text);
        self.body.push('\n');
    }

    fn start_block(&mut self, label: &str) {
        self.body.push_str(label);
        self.body.push_str(":\n");
        self.block_terminated = false;
    }

    fn branch(&mut self, label: &str) {
        self.line(&format!("br label %{}", label));
        self.block_terminated = true;
    }

    fn cond_branch(&mut self, cond: &str, then_label: &str, else_label: &str) {
        self.line(&format!(
            "br i1 {}, label %{}, label %{}",
            cond, then_label, else_label
        ));
        self.block_terminated = true;
    }

    /// Trap block: print the message, exit(1), unreachable. The caller is
    /// left positioned in the continue block.
    fn emit_trap(&mut self, cond: &str, error_base: &str, ok_base: &str, message: &str) {
        let error_label = self.label(error_base);
        let ok_label = self.label(ok_base);
        self.cond_branch(cond, &error_label, &ok_label);

        self.start_block(&error_label);
        let msg = self.string_constant(message);
        self.line(&format!("call i32 (ptr, ...) @printf(ptr {})", msg));
        self.line("call void @exit(i32 1)");
        self.line("unreachable");
        self.block_terminated = true;

        self.start_block(&ok_label);
    }

    /// Deduplicated string-constant global; returns its `@` name.
    fn string_constant(&mut self, value: &str) -> String {
        if let Some(name) = self.string_constants.get(value) {
            return name.clone();
        }

        let name = format!("@.str.{}", self.string_counter);
        self.string_counter += 1;

        let bytes = value.as_bytes();
        let mut encoded = String::new();
        for &b in bytes {
            match b {
                b'"' | b'\\' => encoded.push_str(&format!("\\{:02X}", b)),
                0x20..=0x7e => encoded.push(b as char),
                _ => encoded.push_str(&format!("\\{:02X}", b)),
            }
        }
        encoded.push_str("\\00");

        self.string_globals.push_str(&format!(
            "{} = private unnamed_addr constant [{} x i8] c\"{}\"\n",
            name,
            bytes.len() + 1,
            encoded
        ));

        self.string_constants.insert(value.to_string(), name.clone());
        name
    }

    // ── Scopes ───────────────────────────────────────────────────

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn define_var(&mut self, name: &str, slot: VarSlot) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), slot);
        }
    }

    fn lookup_var(&self, name: &str) -> Option<&VarSlot> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn exists_in_current_scope(&self, name: &str) -> bool {
        self.scopes
            .last()
            .is_some_and(|scope| scope.contains_key(name))
    }

    // ── Statements ───────────────────────────────────────────────

    fn visit_stmt(&mut self, stmt: &Stmt) -> CResult<()> {
        if self.block_terminated {
            return Ok(());
        }

        match stmt {
            Stmt::Expr { expression } => {
                self.visit_expr(expression)?;
                Ok(())
            }
            Stmt::Print { expression, keyword } => self.visit_print(expression, keyword),
            Stmt::Var { name, initializer } => self.visit_var(name, initializer.as_ref()),
            Stmt::Block { statements, .. } => {
                self.push_scope();
                for statement in statements {
                    if self.block_terminated {
                        break;
                    }
                    let result = self.visit_stmt(statement);
                    if result.is_err() {
                        self.pop_scope();
                        return result;
                    }
                }
                self.pop_scope();
                Ok(())
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => self.visit_if(condition, then_branch, else_branch.as_deref()),
            Stmt::While {
                condition, body, ..
            } => self.visit_while(condition, body),
            Stmt::Switch {
                keyword,
                condition,
                cases,
                default_case,
            } => self.visit_switch(keyword, condition, cases, default_case.as_deref()),
            Stmt::Function { name, params, body } => self.visit_function(name, params, body),
            Stmt::Return { value, .. } => self.visit_return(value.as_ref()),
            Stmt::Break { keyword } => self.visit_break(keyword),
            Stmt::Unsafe { statements, .. } => {
                let prev = self.in_unsafe_block;
                self.in_unsafe_block = true;
                for statement in statements {
                    if self.block_terminated {
                        break;
                    }
                    let result = self.visit_stmt(statement);
                    if result.is_err() {
                        self.in_unsafe_block = prev;
                        return result;
                    }
                }
                self.in_unsafe_block = prev;
                Ok(())
            }
            Stmt::LlvmInline {
                keyword,
                code,
                variables_map,
            } => self.visit_llvm_inline(keyword, code, variables_map),
            // Imports are resolved and spliced away before codegen.
            Stmt::Import { .. } => Ok(()),
        }
    }

    fn visit_print(&mut self, expression: &Expr, keyword: &Token) -> CResult<()> {
        let value = self.visit_expr(expression)?;

        match value.ty {
            BoxType::Number => {
                let fmt = self.string_constant("%g\n");
                self.line(&format!(
                    "call i32 (ptr, ...) @printf(ptr {}, double {})",
                    fmt, value.ir
                ));
            }
            BoxType::Str => {
                let fmt = self.string_constant("%s\n");
                self.line(&format!(
                    "call i32 (ptr, ...) @printf(ptr {}, ptr {})",
                    fmt, value.ir
                ));
            }
            BoxType::Bool => {
                let true_label = self.label("print_true");
                let false_label = self.label("print_false");
                let merge_label = self.label("print_merge");

                self.cond_branch(&value.ir, &true_label, &false_label);

                self.start_block(&true_label);
                let true_str = self.string_constant("true\n");
                self.line(&format!("call i32 (ptr, ...) @printf(ptr {})", true_str));
                self.branch(&merge_label);

                self.start_block(&false_label);
                let false_str = self.string_constant("false\n");
                self.line(&format!("call i32 (ptr, ...) @printf(ptr {})", false_str));
                self.branch(&merge_label);

                self.start_block(&merge_label);
            }
            BoxType::Nil => {
                let nil_str = self.string_constant("nil\n");
                self.line(&format!("call i32 (ptr, ...) @printf(ptr {})", nil_str));
            }
            BoxType::Array => self.print_array(&value),
            BoxType::Dict => self.print_dict(&value),
            other => {
                return Err(CodegenError::new(
                    format!("Cannot print value of type '{}'", other),
                    Some(keyword.clone()),
                    Some(
                        "Supported types for print: numbers, strings, booleans, nil, arrays, dictionaries"
                            .to_string(),
                    ),
                ));
            }
        }
        Ok(())
    }

    fn visit_var(&mut self, name: &Token, initializer: Option<&Expr>) -> CResult<()> {
        let var_name = &name.lexeme;

        if self.exists_in_current_scope(var_name) {
            let hint = format!(
                "Variable '{}' was already declared in this scope.\n\
                 \x20      Use a different name or assign to the existing variable.",
                var_name
            );
            return Err(CodegenError::new(
                format!("Variable '{}' already declared in this scope", var_name),
                Some(name.clone()),
                Some(hint),
            ));
        }

        let value = match initializer {
            Some(init) => self.visit_expr(init)?,
            None => BoxValue::new(double_const(0.0), BoxType::Nil),
        };

        let ptr = format!("%{}.addr{}", var_name, self.temp_counter);
        self.temp_counter += 1;
        let ir_ty = llvm_type_of(value.ty);
        self.line(&format!("{} = alloca {}", ptr, ir_ty));
        self.line(&format!("store {} {}, ptr {}", ir_ty, value.ir, ptr));

        self.define_var(
            var_name,
            VarSlot {
                ptr,
                ty: value.ty,
                is_mutable: true,
                element_type: value.element_type,
                value_type: value.value_type,
            },
        );
        Ok(())
    }

    fn visit_if(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> CResult<()> {
        let condition = self.visit_expr(condition)?;
        let cond_bool = self.to_boolean(&condition);

        let then_label = self.label("if_then");
        let else_label = self.label("if_else");
        let merge_label = self.label("if_merge");

        self.cond_branch(&cond_bool, &then_label, &else_label);

        self.start_block(&then_label);
        self.visit_stmt(then_branch)?;
        if !self.block_terminated {
            self.branch(&merge_label);
        }

        self.start_block(&else_label);
        if let Some(else_branch) = else_branch {
            self.visit_stmt(else_branch)?;
        }
        if !self.block_terminated {
            self.branch(&merge_label);
        }

        self.start_block(&merge_label);
        Ok(())
    }

    fn visit_while(&mut self, condition: &Expr, body: &Stmt) -> CResult<()> {
        let cond_label = self.label("while_cond");
        let body_label = self.label("while_body");
        let end_label = self.label("while_end");

        self.break_blocks.push(end_label.clone());

        self.branch(&cond_label);

        self.start_block(&cond_label);
        let condition = self.visit_expr(condition)?;
        let cond_bool = self.to_boolean(&condition);
        self.cond_branch(&cond_bool, &body_label, &end_label);

        self.start_block(&body_label);
        self.visit_stmt(body)?;
        if !self.block_terminated {
            self.branch(&cond_label);
        }

        self.start_block(&end_label);
        self.break_blocks.pop();
        Ok(())
    }

    fn visit_switch(
        &mut self,
        keyword: &Token,
        condition: &Expr,
        cases: &[CaseClause],
        default_case: Option<&[Stmt]>,
    ) -> CResult<()> {
        let condition = self.visit_expr(condition)?;

        let end_label = self.label("switch_end");
        self.break_blocks.push(end_label.clone());

        let case_labels: Vec<String> = (0..cases.len()).map(|_| self.label("case_")).collect();
        let default_label = default_case.map(|_| self.label("default"));

        let result = (|| -> CResult<()> {
            if cases.is_empty() {
                match &default_label {
                    Some(label) => self.branch(label),
                    None => self.branch(&end_label),
                }
            } else {
                let first_check = self.label("case_check");
                self.branch(&first_check);
                let mut check_label = first_check;

                for (i, case) in cases.iter().enumerate() {
                    self.start_block(&check_label);

                    let case_value = self.visit_expr(&case.value)?;
                    let matched = self.tmp();
                    match (condition.ty, case_value.ty) {
                        (BoxType::Number, BoxType::Number) => {
                            self.line(&format!(
                                "{} = fcmp oeq double {}, {}",
                                matched, condition.ir, case_value.ir
                            ));
                        }
                        (BoxType::Str, BoxType::Str) => {
                            let cmp = self.tmp();
                            self.line(&format!(
                                "{} = call i32 @strcmp(ptr {}, ptr {})",
                                cmp, condition.ir, case_value.ir
                            ));
                            self.line(&format!("{} = icmp eq i32 {}, 0", matched, cmp));
                        }
                        (BoxType::Bool, BoxType::Bool) => {
                            self.line(&format!(
                                "{} = icmp eq i1 {}, {}",
                                matched, condition.ir, case_value.ir
                            ));
                        }
                        (cond_ty, case_ty) => {
                            let hint = format!(
                                "Switch condition and case value types must match.\n\
                                 \x20      Condition: {}, Case: {}",
                                cond_ty, case_ty
                            );
                            return Err(CodegenError::new(
                                "Type mismatch in switch/case",
                                Some(keyword.clone()),
                                Some(hint),
                            ));
                        }
                    }

                    let fallthrough = if i < cases.len() - 1 {
                        self.label("case_check")
                    } else {
                        match &default_label {
                            Some(label) => label.clone(),
                            None => end_label.clone(),
                        }
                    };
                    self.cond_branch(&matched, &case_labels[i], &fallthrough);
                    check_label = fallthrough;
                }
            }

            for (case, case_label) in cases.iter().zip(&case_labels) {
                self.start_block(case_label);
                for stmt in &case.statements {
                    if self.block_terminated {
                        break;
                    }
                    self.visit_stmt(stmt)?;
                }
                if !self.block_terminated {
                    self.branch(&end_label);
                }
            }

            if let (Some(default_label), Some(default_stmts)) = (default_label.clone(), default_case)
            {
                self.start_block(&default_label);
                for stmt in default_stmts {
                    if self.block_terminated {
                        break;
                    }
                    self.visit_stmt(stmt)?;
                }
                if !self.block_terminated {
                    self.branch(&end_label);
                }
            }

            Ok(())
        })();

        self.break_blocks.pop();
        result?;

        self.start_block(&end_label);
        Ok(())
    }

    fn visit_function(&mut self, name: &Token, params: &[Token], body: &[Stmt]) -> CResult<()> {
        let func_name = &name.lexeme;

        if self.functions.contains_key(func_name) {
            let hint = format!(
                "Function '{}' was already declared.\n\
                 \x20      Use a different name or remove the duplicate declaration.",
                func_name
            );
            return Err(CodegenError::new(
                format!("Function '{}' already declared", func_name),
                Some(name.clone()),
                Some(hint),
            ));
        }

        let param_names: Vec<String> = params.iter().map(|p| p.lexeme.clone()).collect();
        self.functions.insert(func_name.clone(), param_names);

        // Lower the function into its own buffer; main's emission state is
        // saved around it.
        let saved_body = std::mem::take(&mut self.body);
        let saved_scopes = std::mem::take(&mut self.scopes);
        let saved_breaks = std::mem::take(&mut self.break_blocks);
        let saved_terminated = self.block_terminated;

        let param_list: Vec<String> = params
            .iter()
            .map(|p| format!("double %{}", p.lexeme))
            .collect();
        self.body.push_str(&format!(
            "define double @{}({}) {{\n",
            func_name,
            param_list.join(", ")
        ));
        self.start_block("entry");
        self.push_scope();

        for param in params {
            let ptr = format!("%{}.addr{}", param.lexeme, self.temp_counter);
            self.temp_counter += 1;
            self.line(&format!("{} = alloca double", ptr));
            self.line(&format!("store double %{}, ptr {}", param.lexeme, ptr));
            self.define_var(
                &param.lexeme,
                VarSlot {
                    ptr,
                    ty: BoxType::Number,
                    is_mutable: true,
                    element_type: None,
                    value_type: None,
                },
            );
        }

        let result = (|| -> CResult<()> {
            for stmt in body {
                if self.block_terminated {
                    break;
                }
                self.visit_stmt(stmt)?;
            }
            Ok(())
        })();

        if result.is_ok() && !self.block_terminated {
            self.line(&format!("ret double {}", double_const(0.0)));
        }
        self.body.push_str("}\n");

        let func_ir = std::mem::replace(&mut self.body, saved_body);
        self.scopes = saved_scopes;
        self.break_blocks = saved_breaks;
        self.block_terminated = saved_terminated;
        result?;

        self.finished_fns.push(func_ir);
        Ok(())
    }

    fn visit_return(&mut self, value: Option<&Expr>) -> CResult<()> {
        match value {
            Some(value) => {
                let value = self.visit_expr(value)?;
                let numeric = if value.ty == BoxType::Number {
                    value.ir
                } else {
                    self.to_number(&value)?
                };
                self.line(&format!("ret double {}", numeric));
            }
            None => {
                self.line(&format!("ret double {}", double_const(0.0)));
            }
        }
        self.block_terminated = true;
        Ok(())
    }

    fn visit_break(&mut self, keyword: &Token) -> CResult<()> {
        let target = match self.break_blocks.last() {
            Some(target) => target.clone(),
            None => {
                return Err(CodegenError::new(
                    "Break statement outside of loop or switch",
                    Some(keyword.clone()),
                    Some("Break can only be used inside loops or switch statements.".to_string()),
                ));
            }
        };
        self.branch(&target);
        Ok(())
    }

    // ── Expressions ──────────────────────────────────────────────

    fn visit_expr(&mut self, expr: &Expr) -> CResult<BoxValue> {
        match expr {
            Expr::Literal { value, token } => self.visit_literal(value, token),
            Expr::Variable { name } => self.visit_variable(name),
            Expr::Assign { name, value } => self.visit_assign(name, value),
            Expr::Binary { left, op, right } => self.visit_binary(left, op, right),
            Expr::Unary { op, right } => self.visit_unary(op, right),
            Expr::Logical { left, op, right } => self.visit_logical(left, op, right),
            Expr::Call { .. } => self.visit_call(expr),
            Expr::Grouping { expression } => self.visit_expr(expression),
            Expr::ArrayLiteral { elements, bracket } => self.visit_array_literal(elements, bracket),
            Expr::DictLiteral { pairs, brace } => self.visit_dict_literal(pairs, brace),
            Expr::IndexGet {
                container,
                index,
                bracket,
            } => self.visit_index_get(container, index, bracket),
            Expr::IndexSet {
                container,
                index,
                value,
                bracket,
            } => self.visit_index_set(container, index, value, bracket),
        }
    }

    fn visit_literal(&mut self, value: &LiteralValue, _token: &Token) -> CResult<BoxValue> {
        match value {
            LiteralValue::Number(n) => Ok(BoxValue::immutable(double_const(*n), BoxType::Number)),
            LiteralValue::Str(s) => {
                let name = self.string_constant(s);
                Ok(BoxValue::immutable(name, BoxType::Str))
            }
            LiteralValue::Bool(b) => Ok(BoxValue::immutable(
                if *b { "true" } else { "false" },
                BoxType::Bool,
            )),
            LiteralValue::Nil => Ok(BoxValue::immutable(double_const(0.0), BoxType::Nil)),
        }
    }

    fn visit_variable(&mut self, name: &Token) -> CResult<BoxValue> {
        let slot = match self.lookup_var(&name.lexeme) {
            Some(slot) => slot.clone(),
            None => {
                let hint = format!(
                    "Make sure '{}' is declared before use.\n\
                     \x20      Example: var {} = value;",
                    name.lexeme, name.lexeme
                );
                return Err(CodegenError::new(
                    format!("Undefined variable '{}'", name.lexeme),
                    Some(name.clone()),
                    Some(hint),
                ));
            }
        };

        let loaded = self.tmp();
        let ir_ty = llvm_type_of(slot.ty);
        self.line(&format!("{} = load {}, ptr {}", loaded, ir_ty, slot.ptr));

        let mut value = BoxValue::new(loaded, slot.ty);
        value.element_type = slot.element_type;
        value.value_type = slot.value_type;
        Ok(value)
    }

    fn visit_assign(&mut self, name: &Token, value: &Expr) -> CResult<BoxValue> {
        let value = self.visit_expr(value)?;

        let slot = match self.lookup_var(&name.lexeme) {
            Some(slot) => slot.clone(),
            None => {
                let hint = format!(
                    "Variable '{}' must be declared before assignment.\n\
                     \x20      Use: var {} = value;",
                    name.lexeme, name.lexeme
                );
                return Err(CodegenError::new(
                    format!("Undefined variable '{}'", name.lexeme),
                    Some(name.clone()),
                    Some(hint),
                ));
            }
        };

        if !slot.is_mutable {
            return Err(CodegenError::new(
                format!("Cannot assign to immutable variable '{}'", name.lexeme),
                Some(name.clone()),
                Some("Literal values and constants cannot be reassigned.".to_string()),
            ));
        }

        self.line(&format!(
            "store {} {}, ptr {}",
            llvm_type_of(value.ty),
            value.ir,
            slot.ptr
        ));
        Ok(value)
    }

    fn visit_binary(&mut self, left: &Expr, op: &Token, right: &Expr) -> CResult<BoxValue> {
        let left = self.visit_expr(left)?;
        let right = self.visit_expr(right)?;

        let both_numbers = left.ty == BoxType::Number && right.ty == BoxType::Number;
        let both_bools = left.ty == BoxType::Bool && right.ty == BoxType::Bool;

        let numeric_mismatch = |op_lexeme: &str| {
            let hint = format!(
                "The '{}' operator requires both operands to be numbers.\n\
                 \x20      Left: {}, Right: {}",
                op_lexeme, left.ty, right.ty
            );
            CodegenError::new(
                format!("Operands must be numbers for '{}' operator", op_lexeme),
                Some(op.clone()),
                Some(hint),
            )
        };

        match op.kind {
            TokenKind::Plus | TokenKind::Minus | TokenKind::Star => {
                if !both_numbers {
                    return Err(numeric_mismatch(&op.lexeme));
                }
                let instr = match op.kind {
                    TokenKind::Plus => "fadd",
                    TokenKind::Minus => "fsub",
                    _ => "fmul",
                };
                let result = self.tmp();
                self.line(&format!(
                    "{} = {} double {}, {}",
                    result, instr, left.ir, right.ir
                ));
                Ok(BoxValue::new(result, BoxType::Number))
            }
            TokenKind::Slash | TokenKind::Percent => {
                if !both_numbers {
                    return Err(numeric_mismatch(&op.lexeme));
                }
                let op_name = if op.kind == TokenKind::Slash {
                    "Division"
                } else {
                    "Modulo"
                };
                self.check_division_by_zero(&right.ir, op, op_name);

                let instr = if op.kind == TokenKind::Slash {
                    "fdiv"
                } else {
                    "frem"
                };
                let result = self.tmp();
                self.line(&format!(
                    "{} = {} double {}, {}",
                    result, instr, left.ir, right.ir
                ));
                Ok(BoxValue::new(result, BoxType::Number))
            }
            TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual => {
                if !both_numbers {
                    return Err(numeric_mismatch(&op.lexeme));
                }
                let pred = match op.kind {
                    TokenKind::Less => "olt",
                    TokenKind::LessEqual => "ole",
                    TokenKind::Greater => "ogt",
                    _ => "oge",
                };
                let result = self.tmp();
                self.line(&format!(
                    "{} = fcmp {} double {}, {}",
                    result, pred, left.ir, right.ir
                ));
                Ok(BoxValue::new(result, BoxType::Bool))
            }
            TokenKind::EqualEqual | TokenKind::BangEqual => {
                let result = self.tmp();
                if both_numbers {
                    let pred = if op.kind == TokenKind::EqualEqual {
                        "oeq"
                    } else {
                        "one"
                    };
                    self.line(&format!(
                        "{} = fcmp {} double {}, {}",
                        result, pred, left.ir, right.ir
                    ));
                } else if both_bools {
                    let pred = if op.kind == TokenKind::EqualEqual {
                        "eq"
                    } else {
                        "ne"
                    };
                    self.line(&format!(
                        "{} = icmp {} i1 {}, {}",
                        result, pred, left.ir, right.ir
                    ));
                } else if left.ty == BoxType::Str && right.ty == BoxType::Str {
                    let cmp = self.tmp();
                    self.line(&format!(
                        "{} = call i32 @strcmp(ptr {}, ptr {})",
                        cmp, left.ir, right.ir
                    ));
                    let pred = if op.kind == TokenKind::EqualEqual {
                        "eq"
                    } else {
                        "ne"
                    };
                    self.line(&format!("{} = icmp {} i32 {}, 0", result, pred, cmp));
                } else {
                    let hint = format!(
                        "The '{}' operator requires both operands to be the same type.\n\
                         \x20      Left: {}, Right: {}",
                        op.lexeme, left.ty, right.ty
                    );
                    return Err(CodegenError::new(
                        format!("Operands must be of same type for '{}' operator", op.lexeme),
                        Some(op.clone()),
                        Some(hint),
                    ));
                }
                Ok(BoxValue::new(result, BoxType::Bool))
            }
            _ => Err(CodegenError::new(
                format!("Unknown binary operator: {}", op.lexeme),
                Some(op.clone()),
                None,
            )),
        }
    }

    fn visit_unary(&mut self, op: &Token, right: &Expr) -> CResult<BoxValue> {
        let right = self.visit_expr(right)?;

        match op.kind {
            TokenKind::Minus => {
                if right.ty != BoxType::Number {
                    let hint = format!(
                        "The '-' operator requires a number operand.\n\
                         \x20      Operand type: {}",
                        right.ty
                    );
                    return Err(CodegenError::new(
                        "Operand must be a number for '-' operator",
                        Some(op.clone()),
                        Some(hint),
                    ));
                }
                let result = self.tmp();
                self.line(&format!("{} = fneg double {}", result, right.ir));
                Ok(BoxValue::new(result, BoxType::Number))
            }
            TokenKind::Bang => {
                let as_bool = self.to_boolean(&right);
                let result = self.tmp();
                self.line(&format!("{} = xor i1 {}, true", result, as_bool));
                Ok(BoxValue::new(result, BoxType::Bool))
            }
            _ => Err(CodegenError::new(
                format!("Unknown unary operator: {}", op.lexeme),
                Some(op.clone()),
                None,
            )),
        }
    }

    fn visit_logical(&mut self, left: &Expr, op: &Token, right: &Expr) -> CResult<BoxValue> {
        let left = self.visit_expr(left)?;
        let left_bool = self.to_boolean(&left);

        let (base, short_circuit_on_true) = match op.kind {
            TokenKind::And => ("and", false),
            TokenKind::Or => ("or", true),
            _ => {
                return Err(CodegenError::new(
                    format!("Unknown logical operator: {}", op.lexeme),
                    Some(op.clone()),
                    None,
                ));
            }
        };

        let right_label = self.label(&format!("{}_right", base));
        let merge_label = self.label(&format!("{}_merge", base));

        let result_slot = self.tmp();
        self.line(&format!("{} = alloca i1", result_slot));
        self.line(&format!("store i1 {}, ptr {}", left_bool, result_slot));

        if short_circuit_on_true {
            self.cond_branch(&left_bool, &merge_label, &right_label);
        } else {
            self.cond_branch(&left_bool, &right_label, &merge_label);
        }

        self.start_block(&right_label);
        let right = self.visit_expr(right)?;
        let right_bool = self.to_boolean(&right);
        self.line(&format!("store i1 {}, ptr {}", right_bool, result_slot));
        self.branch(&merge_label);

        self.start_block(&merge_label);
        let result = self.tmp();
        self.line(&format!("{} = load i1, ptr {}", result, result_slot));
        Ok(BoxValue::new(result, BoxType::Bool))
    }

    // ── Runtime checks and coercions ─────────────────────────────

    fn check_division_by_zero(&mut self, divisor: &str, token: &Token, op_name: &str) {
        let is_zero = self.tmp();
        self.line(&format!(
            "{} = fcmp oeq double {}, {}",
            is_zero,
            divisor,
            double_const(0.0)
        ));
        let message = format!(
            "Runtime Error: {} by zero at line {}\n",
            op_name, token.line
        );
        self.emit_trap(&is_zero, "div_zero_error", "div_ok", &message);
    }

    fn to_boolean(&mut self, value: &BoxValue) -> String {
        match value.ty {
            BoxType::Bool => value.ir.clone(),
            BoxType::Number => {
                let result = self.tmp();
                self.line(&format!(
                    "{} = fcmp one double {}, {}",
                    result,
                    value.ir,
                    double_const(0.0)
                ));
                result
            }
            BoxType::Nil => "false".to_string(),
            _ => "true".to_string(),
        }
    }

    fn to_number(&mut self, value: &BoxValue) -> CResult<String> {
        match value.ty {
            BoxType::Number => Ok(value.ir.clone()),
            BoxType::Bool => {
                let result = self.tmp();
                self.line(&format!("{} = uitofp i1 {} to double", result, value.ir));
                Ok(result)
            }
            BoxType::Nil => Ok(double_const(0.0)),
            other => Err(CodegenError::new(
                format!("Cannot convert {} to number", other),
                None,
                Some(format!("Cannot convert {} to number.", other)),
            )),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Module-level constants and helpers
// ═══════════════════════════════════════════════════════════════

const RUNTIME_DECLS: &str = "\
declare i32 @printf(ptr, ...)
declare i32 @scanf(ptr, ...)
declare ptr @malloc(i64)
declare void @free(ptr)
declare ptr @memset(ptr, i32, i64)
declare void @exit(i32)
declare i32 @strcmp(ptr, ptr)
declare ptr @fopen(ptr, ptr)
declare i32 @fclose(ptr)
declare ptr @fgets(ptr, i32, ptr)
declare i32 @fputs(ptr, ptr)
declare i64 @fread(ptr, i64, i64, ptr)
declare i64 @fwrite(ptr, i64, i64, ptr)
declare i32 @fseek(ptr, i64, i32)
declare i64 @ftell(ptr)
declare void @rewind(ptr)
declare i32 @feof(ptr)
declare i32 @remove(ptr)
declare i64 @strlen(ptr)
declare ptr @strcpy(ptr, ptr)
declare ptr @strcat(ptr, ptr)
declare i32 @access(ptr, i32)
";

/// Doubles are emitted as their exact 64-bit hex pattern so the backend
/// parses them byte-identically.
pub(crate) fn double_const(value: f64) -> String {
    format!("0x{:016X}", value.to_bits())
}

pub(crate) fn llvm_type_of(ty: BoxType) -> &'static str {
    match ty {
        BoxType::Number | BoxType::Nil => "double",
        BoxType::Bool => "i1",
        BoxType::Str | BoxType::Pointer | BoxType::Array | BoxType::Dict | BoxType::Function => {
            "ptr"
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
    use crate::compiler::parser::Parser;

    fn generate(source: &str) -> String {
        let tokens = Lexer::new(source).scan_tokens().unwrap();
        let stmts = Parser::new(tokens, source).parse().unwrap();
        Codegen::new(true, 3).generate(stmts).unwrap()
    }

    fn generate_unoptimized(source: &str) -> String {
        let tokens = Lexer::new(source).scan_tokens().unwrap();
        let stmts = Parser::new(tokens, source).parse().unwrap();
        Codegen::new(false, 0).generate(stmts).unwrap()
    }

    fn generate_err(source: &str) -> CodegenError {
        let tokens = Lexer::new(source).scan_tokens().unwrap();
        let stmts = Parser::new(tokens, source).parse().unwrap();
        Codegen::new(false, 0).generate(stmts).unwrap_err()
    }

    #[test]
    fn test_module_skeleton() {
        let ir = generate("print 1;");
        assert!(ir.contains("; ModuleID = 'box_module'"));
        assert!(ir.contains("%Array = type { i64, ptr }"));
        assert!(ir.contains("%DictEntry = type { double, double, i1 }"));
        assert!(ir.contains("declare i32 @printf(ptr, ...)"));
        assert!(ir.contains("@stdin = external global ptr"));
        assert!(ir.contains("define i32 @main() {"));
        assert!(ir.contains("ret i32 0"));
    }

    #[test]
    fn test_realloc_declared_only_when_used() {
        let ir = generate_unoptimized("print 1;");
        assert!(!ir.contains("@realloc"));

        let ir = generate_unoptimized(
            "unsafe { var p = malloc(8); var q = realloc(p, 16); free(q); }",
        );
        assert!(ir.contains("declare ptr @realloc(ptr, i64)"));
    }

    #[test]
    fn test_print_number_uses_g_format() {
        let ir = generate_unoptimized("print 42;");
        assert!(ir.contains("@printf"));
        // "%g\n" constant: 25 67 0A
        assert!(ir.contains("c\"%g\\0A\\00\""));
        assert!(ir.contains(&double_const(42.0)));
    }

    #[test]
    fn test_constant_folding_feeds_codegen() {
        let ir = generate("print 21 + 21;");
        assert!(ir.contains(&double_const(42.0)));
        assert!(!ir.contains("fadd"));
    }

    #[test]
    fn test_division_emits_zero_check() {
        let ir = generate_unoptimized("var a = 1; var b = a / 0;");
        assert!(ir.contains("fcmp oeq double"));
        assert!(ir.contains("Division by zero at line 1"));
        assert!(ir.contains("call void @exit(i32 1)"));
        assert!(ir.contains("unreachable"));
    }

    #[test]
    fn test_string_constants_are_pooled() {
        let ir = generate_unoptimized("print \"hi\"; print \"hi\";");
        let occurrences = ir.matches("c\"hi\\00\"").count();
        assert_eq!(occurrences, 1);
    }

    #[test]
    fn test_while_emits_three_blocks() {
        let ir = generate_unoptimized("var i = 0; while (i < 3) { i = i + 1; }");
        assert!(ir.contains("while_cond"));
        assert!(ir.contains("while_body"));
        assert!(ir.contains("while_end"));
        assert!(ir.contains("fcmp olt double"));
    }

    #[test]
    fn test_function_definition_and_call() {
        let ir = generate_unoptimized("fun add(a, b) { return a + b; } print add(1, 2);");
        assert!(ir.contains("define double @add(double %a, double %b)"));
        assert!(ir.contains("call double @add(double"));
    }

    #[test]
    fn test_function_fallthrough_returns_zero() {
        let ir = generate_unoptimized("fun f() { print 1; } var r = f();");
        assert!(ir.contains(&format!("ret double {}", double_const(0.0))));
    }

    #[test]
    fn test_undefined_variable_fails() {
        let err = generate_err("print missing;");
        assert!(err.message.contains("Undefined variable 'missing'"));
    }

    #[test]
    fn test_undefined_function_fails() {
        let err = generate_err("var r = nope(1);");
        assert!(err.message.contains("Undefined function 'nope'"));
    }

    #[test]
    fn test_arity_mismatch_fails() {
        let err = generate_err("fun f(a) { return a; } var r = f(1, 2);");
        assert!(err.message.contains("expects 1 arguments but got 2"));
    }

    #[test]
    fn test_redeclaration_fails() {
        let err = generate_err("var x = 1; var x = 2;");
        assert!(err.message.contains("already declared in this scope"));
    }

    #[test]
    fn test_shadowing_in_nested_scope_is_fine() {
        let ir = generate_unoptimized("var x = 1; { var x = 2; print x; } print x;");
        assert!(ir.contains("define i32 @main()"));
    }

    #[test]
    fn test_type_mismatch_on_plus() {
        let err = generate_err("var s = \"a\" + 1;");
        assert!(err.message.contains("Operands must be numbers for '+'"));
    }

    #[test]
    fn test_logical_and_short_circuits() {
        let ir = generate_unoptimized("var a = 1; var b = a > 0 and a < 2;");
        assert!(ir.contains("and_right"));
        assert!(ir.contains("and_merge"));
        assert!(ir.contains("alloca i1"));
    }

    #[test]
    fn test_switch_chains_checks() {
        let ir = generate_unoptimized(
            "var x = 1; switch (x) { case 1: print 1; break; case 2: print 2; default: print 0; }",
        );
        assert!(ir.contains("case_check"));
        assert!(ir.contains("switch_end"));
        assert!(ir.contains("default"));
    }

    #[test]
    fn test_string_equality_uses_strcmp() {
        let ir = generate_unoptimized("var a = \"x\" == \"y\";");
        assert!(ir.contains("call i32 @strcmp"));
    }

    #[test]
    fn test_bool_print_branches() {
        let ir = generate_unoptimized("print true;");
        assert!(ir.contains("print_true"));
        assert!(ir.contains("print_false"));
        assert!(ir.contains("c\"true\\0A\\00\""));
    }

    #[test]
    fn test_break_inside_while() {
        let ir = generate_unoptimized("while (true) { break; }");
        assert!(ir.contains("br label %while_end"));
    }

    #[test]
    fn test_deterministic_output() {
        let source = "fun f(n) { return n * 2; } print f(21);";
        assert_eq!(generate(source), generate(source));
    }
}
