//! Raw IR injection for `unsafe { llvm_inline("...") }`.
//!
//! `$name` markers are substituted from the statement's variable map, then
//! each line is dispatched through a small instruction parser: arithmetic
//! (`add`/`sub`/`mul` over i32/i64/double), `call`, `ret`, `store`, and
//! `br`. Operands resolve through the inline-variable map, then the lexical
//! environment (yielding the variable's stack slot), then as typed numeric
//! constants. Anything else is rejected.

use super::{double_const, CResult, Codegen, CodegenError};
use crate::compiler::token::Token;
use std::collections::HashMap;

impl Codegen {
    pub(super) fn visit_llvm_inline(
        &mut self,
        keyword: &Token,
        code: &str,
        variables_map: &HashMap<String, String>,
    ) -> CResult<()> {
        if !self.in_unsafe_block {
            let hint = "llvm_inline() can only be used inside unsafe blocks.\n\
                        \x20      Wrap your code in: unsafe { ... }";
            return Err(CodegenError::new(
                "llvm_inline() requires unsafe context",
                Some(keyword.clone()),
                Some(hint.to_string()),
            ));
        }

        let processed = self.substitute_inline_vars(code, variables_map);

        for raw_line in processed.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            self.emit_inline_instruction(line).map_err(|e| {
                let hint = format!(
                    "Invalid LLVM IR instruction.\n\
                     \x20      Error: {}\n\
                     \x20      Instruction: {}",
                    e.message, line
                );
                CodegenError::new("LLVM IR injection failed", None, Some(hint))
            })?;
        }

        Ok(())
    }

    /// Replace `$name` markers with the mapped IR names, for every mapping
    /// whose Box variable is actually in scope.
    fn substitute_inline_vars(
        &self,
        code: &str,
        variables_map: &HashMap<String, String>,
    ) -> String {
        let mut processed = code.to_string();
        for (box_var, llvm_var) in variables_map {
            if self.lookup_var(box_var).is_some() {
                processed = processed.replace(&format!("${}", box_var), llvm_var);
            }
        }
        processed
    }

    fn emit_inline_instruction(&mut self, instr: &str) -> CResult<()> {
        if let Some(eq_pos) = instr.find('=') {
            let result_var = instr[..eq_pos].trim().to_string();
            let operation = instr[eq_pos + 1..].trim().to_string();

            if operation.starts_with("add")
                || operation.starts_with("sub")
                || operation.starts_with("mul")
            {
                return self.emit_inline_arith(&result_var, &operation);
            }
            if operation.starts_with("call") {
                return self.emit_inline_call(&result_var, &operation);
            }
            return Err(CodegenError::new(
                format!("Unsupported LLVM operation: {}", operation),
                None,
                None,
            ));
        }

        if instr.starts_with("ret") {
            return self.emit_inline_ret(instr);
        }
        if instr.starts_with("store") {
            return self.emit_inline_store(instr);
        }
        if instr.starts_with("br") {
            return self.emit_inline_br(instr);
        }

        Err(CodegenError::new(
            format!("Unsupported LLVM instruction: {}", instr),
            None,
            None,
        ))
    }

    /// `%r = add|sub|mul T a, b` with T in {i32, i64, double}.
    fn emit_inline_arith(&mut self, result_var: &str, operation: &str) -> CResult<()> {
        let mut parts = operation.splitn(3, char::is_whitespace);
        let opcode = parts.next().unwrap_or_default();
        let ty = parts.next().unwrap_or_default();
        let operands = parts.next().unwrap_or_default();

        if !matches!(ty, "i32" | "i64" | "double") {
            return Err(CodegenError::new(
                format!("Unsupported type in llvm_inline: {}", ty),
                None,
                None,
            ));
        }

        let (lhs, rhs) = operands.split_once(',').ok_or_else(|| {
            CodegenError::new(
                format!("Malformed {} instruction: {}", opcode, operation),
                None,
                None,
            )
        })?;
        let lhs = self.resolve_inline_value(lhs.trim(), ty)?;
        let rhs = self.resolve_inline_value(rhs.trim(), ty)?;

        let instr = match (opcode, ty) {
            ("add", "double") => "fadd",
            ("sub", "double") => "fsub",
            ("mul", "double") => "fmul",
            (other, _) => other,
        };

        self.line(&format!(
            "{} = {} {} {}, {}",
            result_var, instr, ty, lhs, rhs
        ));
        self.inline_vars
            .insert(result_var.to_string(), result_var.to_string());
        Ok(())
    }

    /// `%r = call T @f(args)` — only user-defined functions are callable.
    fn emit_inline_call(&mut self, result_var: &str, operation: &str) -> CResult<()> {
        let rest = operation.strip_prefix("call").unwrap_or(operation).trim();
        let (ret_ty, rest) = rest.split_once(char::is_whitespace).ok_or_else(|| {
            CodegenError::new(
                format!("Malformed call instruction: {}", operation),
                None,
                None,
            )
        })?;

        let rest = rest.trim();
        let func_name = rest
            .strip_prefix('@')
            .and_then(|r| r.split('(').next())
            .ok_or_else(|| {
                CodegenError::new(
                    format!("Malformed call instruction: {}", operation),
                    None,
                    None,
                )
            })?
            .to_string();

        if !self.functions.contains_key(&func_name) {
            return Err(CodegenError::new(
                format!("Undefined function in llvm_inline: @{}", func_name),
                None,
                None,
            ));
        }

        let args_text = rest
            .split_once('(')
            .and_then(|(_, after)| after.rsplit_once(')'))
            .map(|(inner, _)| inner.trim().to_string())
            .unwrap_or_default();

        let mut args = Vec::new();
        if !args_text.is_empty() {
            for part in args_text.split(',') {
                let part = part.trim();
                let (arg_ty, arg_value) = part.split_once(char::is_whitespace).ok_or_else(|| {
                    CodegenError::new(format!("Malformed call argument: {}", part), None, None)
                })?;
                let resolved = self.resolve_inline_value(arg_value.trim(), arg_ty)?;
                args.push(format!("{} {}", arg_ty, resolved));
            }
        }

        self.line(&format!(
            "{} = call {} @{}({})",
            result_var,
            ret_ty,
            func_name,
            args.join(", ")
        ));
        self.inline_vars
            .insert(result_var.to_string(), result_var.to_string());
        Ok(())
    }

    fn emit_inline_ret(&mut self, instr: &str) -> CResult<()> {
        let trimmed = instr.trim();
        if trimmed == "ret void" {
            self.line("ret void");
            self.block_terminated = true;
            return Ok(());
        }

        let rest = trimmed.strip_prefix("ret").unwrap_or(trimmed).trim();
        let (ty, value) = rest.split_once(char::is_whitespace).ok_or_else(|| {
            CodegenError::new(format!("Malformed ret instruction: {}", instr), None, None)
        })?;
        let resolved = self.resolve_inline_value(value.trim(), ty)?;
        self.line(&format!("ret {} {}", ty, resolved));
        self.block_terminated = true;
        Ok(())
    }

    /// `store T v, T* p` — the pointer must name an inline result or a
    /// variable in scope.
    fn emit_inline_store(&mut self, instr: &str) -> CResult<()> {
        let rest = instr.strip_prefix("store").unwrap_or(instr).trim();
        let (value_part, pointer_part) = rest.split_once(',').ok_or_else(|| {
            CodegenError::new(format!("Malformed store instruction: {}", instr), None, None)
        })?;

        let value_part = value_part.trim();
        let (value_ty, value) = value_part.split_once(char::is_whitespace).ok_or_else(|| {
            CodegenError::new(format!("Malformed store instruction: {}", instr), None, None)
        })?;
        let resolved_value = self.resolve_inline_value(value.trim(), value_ty)?;

        let pointer_part = pointer_part.trim();
        let pointer_name = pointer_part
            .split_whitespace()
            .last()
            .unwrap_or_default()
            .to_string();

        let pointer = if let Some(known) = self.inline_vars.get(&pointer_name) {
            known.clone()
        } else if let Some(stripped) = pointer_name.strip_prefix('%') {
            match self.lookup_var(stripped) {
                Some(slot) => slot.ptr.clone(),
                None => {
                    return Err(CodegenError::new(
                        format!("Undefined pointer in store: {}", pointer_name),
                        None,
                        None,
                    ));
                }
            }
        } else {
            return Err(CodegenError::new(
                format!("Undefined pointer in store: {}", pointer_name),
                None,
                None,
            ));
        };

        self.line(&format!(
            "store {} {}, ptr {}",
            value_ty, resolved_value, pointer
        ));
        Ok(())
    }

    /// `br label %L` and `br i1 c, label %A, label %B`. The branch is
    /// emitted and lowering continues in the (first) target block.
    fn emit_inline_br(&mut self, instr: &str) -> CResult<()> {
        let rest = instr.strip_prefix("br").unwrap_or(instr).trim();

        if let Some(label) = rest.strip_prefix("label") {
            let label = label.trim().strip_prefix('%').unwrap_or(label.trim());
            let label = label.to_string();
            self.branch(&label);
            self.start_block(&label);
            return Ok(());
        }

        if let Some(cond_rest) = rest.strip_prefix("i1") {
            let mut pieces = cond_rest.split(',');
            let cond = pieces.next().unwrap_or_default().trim();
            let true_part = pieces.next().unwrap_or_default().trim();
            let false_part = pieces.next().unwrap_or_default().trim();

            let strip_label = |part: &str| -> Option<String> {
                part.strip_prefix("label")
                    .map(|l| l.trim().trim_start_matches('%').to_string())
            };
            let (true_label, false_label) = match (strip_label(true_part), strip_label(false_part))
            {
                (Some(t), Some(f)) => (t, f),
                _ => {
                    return Err(CodegenError::new(
                        format!("Malformed br instruction: {}", instr),
                        None,
                        None,
                    ));
                }
            };

            let cond = self.resolve_inline_value(cond, "i1")?;
            self.cond_branch(&cond, &true_label, &false_label);
            self.start_block(&true_label);
            return Ok(());
        }

        Err(CodegenError::new(
            format!("Malformed br instruction: {}", instr),
            None,
            None,
        ))
    }

    /// Resolve an operand: inline results first, then in-scope variables
    /// (their stack slot), then typed numeric constants.
    fn resolve_inline_value(&mut self, value: &str, ty: &str) -> CResult<String> {
        let value = value.trim();

        if let Some(stripped) = value.strip_prefix('%') {
            if let Some(known) = self.inline_vars.get(value) {
                return Ok(known.clone());
            }
            if let Some(slot) = self.lookup_var(stripped) {
                return Ok(slot.ptr.clone());
            }
            return Err(CodegenError::new(
                format!("Undefined variable in llvm_inline: {}", value),
                None,
                None,
            ));
        }

        if let Ok(number) = value.parse::<f64>() {
            return Ok(match ty {
                "i32" | "i64" => format!("{}", number as i64),
                "i1" => {
                    if number != 0.0 {
                        "true".to_string()
                    } else {
                        "false".to_string()
                    }
                }
                "double" => double_const(number),
                other => {
                    return Err(CodegenError::new(
                        format!("Unsupported type in llvm_inline: {}", other),
                        None,
                        None,
                    ));
                }
            });
        }

        Err(CodegenError::new(
            format!("Cannot resolve value in llvm_inline: {}", value),
            None,
            None,
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::codegen::Codegen;
    use crate::compiler::lexer::Lexer;
    use crate::compiler::parser::Parser;

    fn generate(source: &str) -> String {
        let tokens = Lexer::new(source).scan_tokens().unwrap();
        let stmts = Parser::new(tokens, source).parse().unwrap();
        Codegen::new(false, 0).generate(stmts).unwrap()
    }

    fn generate_err(source: &str) -> String {
        let tokens = Lexer::new(source).scan_tokens().unwrap();
        let stmts = Parser::new(tokens, source).parse().unwrap();
        Codegen::new(false, 0)
            .generate(stmts)
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn test_inline_add_is_emitted() {
        let ir = generate("unsafe { llvm_inline(\"%r1 = add i32 5, 10\"); }");
        assert!(ir.contains("%r1 = add i32 5, 10"));
    }

    #[test]
    fn test_inline_double_uses_float_ops() {
        let ir = generate("unsafe { llvm_inline(\"%r1 = mul double 2.0, 4.0\"); }");
        assert!(ir.contains("%r1 = fmul double"));
    }

    #[test]
    fn test_inline_chained_results_resolve() {
        let ir = generate(
            "unsafe { llvm_inline(\"%a = add i64 1, 2\n%b = add i64 %a, 3\"); }",
        );
        assert!(ir.contains("%a = add i64 1, 2"));
        assert!(ir.contains("%b = add i64 %a, 3"));
    }

    #[test]
    fn test_inline_unknown_instruction_rejected() {
        let err = generate_err("unsafe { llvm_inline(\"fence seq_cst\"); }");
        assert!(err.contains("LLVM IR injection failed"));
    }

    #[test]
    fn test_inline_undefined_variable_rejected() {
        let err = generate_err("unsafe { llvm_inline(\"%r = add i32 %nope, 1\"); }");
        assert!(err.contains("LLVM IR injection failed"));
    }

    #[test]
    fn test_inline_call_requires_known_function() {
        let err = generate_err("unsafe { llvm_inline(\"%r = call double @ghost()\"); }");
        assert!(err.contains("LLVM IR injection failed"));

        let ir = generate(
            "fun f() { return 1; } unsafe { llvm_inline(\"%r = call double @f()\"); }",
        );
        assert!(ir.contains("%r = call double @f()"));
    }
}
