//! Call lowering: the built-in functions (memory, I/O, containers) and
//! user-defined function calls. Built-ins are recognized by callee name and
//! expanded inline at the call site.

use super::{double_const, BoxType, BoxValue, CResult, Codegen, CodegenError};
use crate::compiler::ast::Expr;
use crate::compiler::token::Token;

const INPUT_BUFFER_SIZE: usize = 4096;

impl Codegen {
    pub(super) fn visit_call(&mut self, expr: &Expr) -> CResult<BoxValue> {
        let (callee, paren, arguments) = match expr {
            Expr::Call {
                callee,
                paren,
                arguments,
            } => (callee, paren, arguments),
            _ => unreachable!("visit_call on a non-call expression"),
        };

        let name_token = match callee.as_ref() {
            Expr::Variable { name } => name.clone(),
            _ => {
                let hint = "Only named functions can be called.\n\
                            \x20      Example: functionName(arg1, arg2)";
                return Err(CodegenError::new(
                    "Can only call named functions",
                    Some(paren.clone()),
                    Some(hint.to_string()),
                ));
            }
        };

        match name_token.lexeme.as_str() {
            "malloc" => {
                self.expect_arity(arguments, 1, paren, "malloc", "var ptr = malloc(40);")?;
                self.builtin_malloc(&arguments[0])
            }
            "calloc" => {
                self.expect_arity(arguments, 2, paren, "calloc", "var ptr = calloc(10, 8);")?;
                self.builtin_calloc(&arguments[0], &arguments[1])
            }
            "realloc" => {
                self.expect_arity(
                    arguments,
                    2,
                    paren,
                    "realloc",
                    "var new_ptr = realloc(old_ptr, 80);",
                )?;
                self.builtin_realloc(&arguments[0], &arguments[1])
            }
            "free" => {
                self.expect_arity(arguments, 1, paren, "free", "free(ptr);")?;
                self.builtin_free(&arguments[0])
            }
            "addr_of" => {
                self.expect_arity(arguments, 1, paren, "addr_of", "var ptr = addr_of(myvar);")?;
                self.builtin_addr_of(&arguments[0])
            }
            "deref" => {
                self.expect_arity(arguments, 1, paren, "deref", "var value = deref(ptr);")?;
                self.builtin_deref(&arguments[0])
            }
            "input" => {
                self.expect_arity(arguments, 0, paren, "input", "var name = input();")?;
                self.builtin_input()
            }
            "input_num" => {
                self.expect_arity(arguments, 0, paren, "input_num", "var age = input_num();")?;
                self.builtin_input_num()
            }
            "read_file" => {
                self.expect_arity(
                    arguments,
                    1,
                    paren,
                    "read_file",
                    "var content = read_file(\"data.txt\");",
                )?;
                let path = self.visit_expr(&arguments[0])?;
                self.expect_string(&path, paren, "read_file", "File path must be a string.")?;
                self.builtin_read_file(&path)
            }
            "write_file" => {
                self.expect_arity(
                    arguments,
                    2,
                    paren,
                    "write_file",
                    "write_file(\"output.txt\", \"Hello\");",
                )?;
                let path = self.visit_expr(&arguments[0])?;
                let content = self.visit_expr(&arguments[1])?;
                self.expect_string(&path, paren, "write_file", "File path must be a string.")?;
                self.expect_string(&content, paren, "write_file", "File content must be a string.")?;
                self.builtin_open_write(&path, &content, "w", "writing")
            }
            "append_file" => {
                self.expect_arity(
                    arguments,
                    2,
                    paren,
                    "append_file",
                    "append_file(\"log.txt\", \"New entry\");",
                )?;
                let path = self.visit_expr(&arguments[0])?;
                let content = self.visit_expr(&arguments[1])?;
                self.expect_string(&path, paren, "append_file", "File path must be a string.")?;
                self.expect_string(
                    &content,
                    paren,
                    "append_file",
                    "File content must be a string.",
                )?;
                self.builtin_open_write(&path, &content, "a", "appending")
            }
            "file_exists" => {
                self.expect_arity(
                    arguments,
                    1,
                    paren,
                    "file_exists",
                    "if (file_exists(\"data.txt\")) { ... }",
                )?;
                let path = self.visit_expr(&arguments[0])?;
                self.expect_string(&path, paren, "file_exists", "File path must be a string.")?;
                self.builtin_file_exists(&path)
            }
            "len" => {
                self.expect_arity(arguments, 1, paren, "len", "len(array)")?;
                let arg = self.visit_expr(&arguments[0])?;
                self.builtin_len(&arg, paren)
            }
            "has" => {
                self.expect_arity(arguments, 2, paren, "has", "has(dict, key)")?;
                let dict = self.visit_expr(&arguments[0])?;
                let key = self.visit_expr(&arguments[1])?;
                self.builtin_has(&dict, &key, paren)
            }
            "keys" => {
                self.expect_arity(arguments, 1, paren, "keys", "keys(dict)")?;
                let arg = self.visit_expr(&arguments[0])?;
                if arg.ty != BoxType::Dict {
                    let hint = format!(
                        "The 'keys' function only works with dictionaries.\n\
                         \x20      Argument type: {}",
                        arg.ty
                    );
                    return Err(CodegenError::new(
                        "keys() requires a dict argument",
                        Some(paren.clone()),
                        Some(hint),
                    ));
                }
                Ok(self.dict_field_array(&arg, 0))
            }
            "values" => {
                self.expect_arity(arguments, 1, paren, "values", "values(dict)")?;
                let arg = self.visit_expr(&arguments[0])?;
                if arg.ty != BoxType::Dict {
                    let hint = format!(
                        "The 'values' function only works with dictionaries.\n\
                         \x20      Argument type: {}",
                        arg.ty
                    );
                    return Err(CodegenError::new(
                        "values() requires a dict argument",
                        Some(paren.clone()),
                        Some(hint),
                    ));
                }
                Ok(self.dict_field_array(&arg, 1))
            }
            _ => self.call_user_function(&name_token, paren, arguments),
        }
    }

    fn expect_arity(
        &self,
        arguments: &[Expr],
        expected: usize,
        paren: &Token,
        name: &str,
        example: &str,
    ) -> CResult<()> {
        if arguments.len() == expected {
            return Ok(());
        }
        let what = match expected {
            0 => "no arguments".to_string(),
            1 => "exactly one argument".to_string(),
            n => format!("exactly {} arguments", n),
        };
        let hint = format!(
            "The '{}' function requires {}.\n\
             \x20      Example: {}",
            name, what, example
        );
        Err(CodegenError::new(
            format!(
                "{}() expects {} arguments but got {}",
                name,
                expected,
                arguments.len()
            ),
            Some(paren.clone()),
            Some(hint),
        ))
    }

    fn expect_string(
        &self,
        value: &BoxValue,
        paren: &Token,
        name: &str,
        what: &str,
    ) -> CResult<()> {
        if value.ty == BoxType::Str {
            return Ok(());
        }
        let hint = format!(
            "{}\n\
             \x20      Argument type: {}",
            what, value.ty
        );
        Err(CodegenError::new(
            format!("{}() requires a string argument", name),
            Some(paren.clone()),
            Some(hint),
        ))
    }

    fn call_user_function(
        &mut self,
        name: &Token,
        paren: &Token,
        arguments: &[Expr],
    ) -> CResult<BoxValue> {
        let func_name = &name.lexeme;

        let param_count = match self.functions.get(func_name) {
            Some(params) => params.len(),
            None => {
                let hint = format!(
                    "Make sure function '{}' is declared before calling it.\n\
                     \x20      Example: fun {}() {{ ... }}",
                    func_name, func_name
                );
                return Err(CodegenError::new(
                    format!("Undefined function '{}'", func_name),
                    Some(name.clone()),
                    Some(hint),
                ));
            }
        };

        if arguments.len() != param_count {
            let hint = format!(
                "Function '{}' expects {} argument(s).\n\
                 \x20      You provided {} argument(s).",
                func_name,
                param_count,
                arguments.len()
            );
            return Err(CodegenError::new(
                format!(
                    "Function '{}' expects {} arguments but got {}",
                    func_name,
                    param_count,
                    arguments.len()
                ),
                Some(paren.clone()),
                Some(hint),
            ));
        }

        let mut args = Vec::with_capacity(arguments.len());
        for argument in arguments {
            let value = self.visit_expr(argument)?;
            let numeric = if value.ty == BoxType::Number {
                value.ir
            } else {
                self.to_number(&value)?
            };
            args.push(format!("double {}", numeric));
        }

        let result = self.tmp();
        self.line(&format!(
            "{} = call double @{}({})",
            result,
            func_name,
            args.join(", ")
        ));
        Ok(BoxValue::new(result, BoxType::Number))
    }

    // ── Memory built-ins ─────────────────────────────────────────

    fn builtin_malloc(&mut self, size_expr: &Expr) -> CResult<BoxValue> {
        let size = self.visit_expr(size_expr)?;
        if size.ty != BoxType::Number {
            let hint = format!(
                "malloc() size must be a number.\n\
                 \x20      Got: {}",
                size.ty
            );
            return Err(CodegenError::new(
                "malloc() size must be a number",
                None,
                Some(hint),
            ));
        }

        let size_i64 = self.tmp();
        self.line(&format!("{} = fptosi double {} to i64", size_i64, size.ir));

        let negative = self.tmp();
        self.line(&format!("{} = icmp slt i64 {}, 0", negative, size_i64));
        self.emit_trap(
            &negative,
            "malloc_error",
            "malloc_ok",
            "Runtime Error: malloc() size cannot be negative\n",
        );

        let ptr = self.tmp();
        self.line(&format!("{} = call ptr @malloc(i64 {})", ptr, size_i64));
        Ok(BoxValue::new(ptr, BoxType::Pointer))
    }

    fn builtin_calloc(&mut self, count_expr: &Expr, size_expr: &Expr) -> CResult<BoxValue> {
        let count = self.visit_expr(count_expr)?;
        let size = self.visit_expr(size_expr)?;

        if count.ty != BoxType::Number {
            return Err(CodegenError::new(
                "calloc() count must be a number",
                None,
                None,
            ));
        }
        if size.ty != BoxType::Number {
            return Err(CodegenError::new(
                "calloc() size must be a number",
                None,
                None,
            ));
        }

        let count_i64 = self.tmp();
        self.line(&format!("{} = fptosi double {} to i64", count_i64, count.ir));
        let size_i64 = self.tmp();
        self.line(&format!("{} = fptosi double {} to i64", size_i64, size.ir));
        let total = self.tmp();
        self.line(&format!("{} = mul i64 {}, {}", total, count_i64, size_i64));

        let ptr = self.tmp();
        self.line(&format!("{} = call ptr @malloc(i64 {})", ptr, total));
        self.line(&format!(
            "call ptr @memset(ptr {}, i32 0, i64 {})",
            ptr, total
        ));
        Ok(BoxValue::new(ptr, BoxType::Pointer))
    }

    fn builtin_realloc(&mut self, ptr_expr: &Expr, size_expr: &Expr) -> CResult<BoxValue> {
        let old_ptr = self.visit_expr(ptr_expr)?;
        let size = self.visit_expr(size_expr)?;

        if old_ptr.ty != BoxType::Pointer {
            let hint = format!(
                "realloc() first argument must be a pointer.\n\
                 \x20      Got: {}",
                old_ptr.ty
            );
            return Err(CodegenError::new(
                "realloc() requires a pointer",
                None,
                Some(hint),
            ));
        }
        if size.ty != BoxType::Number {
            let hint = format!(
                "realloc() size must be a number.\n\
                 \x20      Got: {}",
                size.ty
            );
            return Err(CodegenError::new(
                "realloc() size must be a number",
                None,
                Some(hint),
            ));
        }

        let size_i64 = self.tmp();
        self.line(&format!("{} = fptosi double {} to i64", size_i64, size.ir));

        let negative = self.tmp();
        self.line(&format!("{} = icmp slt i64 {}, 0", negative, size_i64));
        self.emit_trap(
            &negative,
            "realloc_error",
            "realloc_ok",
            "Runtime Error: realloc() size cannot be negative\n",
        );

        self.needs_realloc = true;
        let new_ptr = self.tmp();
        self.line(&format!(
            "{} = call ptr @realloc(ptr {}, i64 {})",
            new_ptr, old_ptr.ir, size_i64
        ));

        let is_null = self.tmp();
        self.line(&format!("{} = icmp eq ptr {}, null", is_null, new_ptr));
        self.emit_trap(
            &is_null,
            "realloc_null_error",
            "realloc_success",
            "Runtime Error: realloc() failed - out of memory\n",
        );

        Ok(BoxValue::new(new_ptr, BoxType::Pointer))
    }

    fn builtin_free(&mut self, ptr_expr: &Expr) -> CResult<BoxValue> {
        let ptr = self.visit_expr(ptr_expr)?;
        if ptr.ty != BoxType::Pointer {
            let hint = format!(
                "free() requires a pointer argument.\n\
                 \x20      Got: {}",
                ptr.ty
            );
            return Err(CodegenError::new(
                "free() requires a pointer",
                None,
                Some(hint),
            ));
        }

        self.line(&format!("call void @free(ptr {})", ptr.ir));
        Ok(BoxValue::new(double_const(0.0), BoxType::Nil))
    }

    fn builtin_addr_of(&mut self, var_expr: &Expr) -> CResult<BoxValue> {
        let name = match var_expr {
            Expr::Variable { name } => name.clone(),
            _ => {
                let hint = "addr_of() requires a variable name.\n\
                            \x20      Example: addr_of(myvar)";
                return Err(CodegenError::new(
                    "addr_of() requires a variable",
                    None,
                    Some(hint.to_string()),
                ));
            }
        };

        let slot = match self.lookup_var(&name.lexeme) {
            Some(slot) => slot.clone(),
            None => {
                let hint = format!(
                    "Variable '{}' not found.\n\
                     \x20      Declare it first with: var {} = value;",
                    name.lexeme, name.lexeme
                );
                return Err(CodegenError::new(
                    format!("Undefined variable '{}'", name.lexeme),
                    Some(name.clone()),
                    Some(hint),
                ));
            }
        };

        if slot.ty != BoxType::Number {
            let hint = format!(
                "Can only take address of number variables currently.\n\
                 \x20      Variable '{}' has type: {}",
                name.lexeme, slot.ty
            );
            return Err(CodegenError::new(
                format!("Cannot take address of {}", slot.ty),
                Some(name),
                Some(hint),
            ));
        }

        // The alloca already is the address; opaque pointers need no cast.
        Ok(BoxValue::new(slot.ptr, BoxType::Pointer))
    }

    fn builtin_deref(&mut self, ptr_expr: &Expr) -> CResult<BoxValue> {
        let ptr = self.visit_expr(ptr_expr)?;
        if ptr.ty != BoxType::Pointer {
            let hint = format!(
                "deref() requires a pointer argument.\n\
                 \x20      Got: {}",
                ptr.ty
            );
            return Err(CodegenError::new(
                "deref() requires a pointer",
                None,
                Some(hint),
            ));
        }

        let is_null = self.tmp();
        self.line(&format!("{} = icmp eq ptr {}, null", is_null, ptr.ir));
        self.emit_trap(
            &is_null,
            "deref_null_error",
            "deref_ok",
            "Runtime Error: Null pointer dereference\n",
        );

        let value = self.tmp();
        self.line(&format!("{} = load double, ptr {}", value, ptr.ir));
        Ok(BoxValue::new(value, BoxType::Number))
    }

    // ── I/O built-ins ────────────────────────────────────────────

    fn builtin_input(&mut self) -> CResult<BoxValue> {
        let buffer_alloca = self.tmp();
        self.line(&format!(
            "{} = alloca [{} x i8]",
            buffer_alloca, INPUT_BUFFER_SIZE
        ));
        let buffer = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds [{} x i8], ptr {}, i32 0, i32 0",
            buffer, INPUT_BUFFER_SIZE, buffer_alloca
        ));

        let result_slot = self.tmp();
        self.line(&format!("{} = alloca ptr", result_slot));
        self.line(&format!("store ptr {}, ptr {}", buffer, result_slot));

        let stdin_ptr = self.tmp();
        self.line(&format!("{} = load ptr, ptr @stdin", stdin_ptr));
        let read = self.tmp();
        self.line(&format!(
            "{} = call ptr @fgets(ptr {}, i32 {}, ptr {})",
            read, buffer, INPUT_BUFFER_SIZE, stdin_ptr
        ));

        // fgets failure yields the empty string instead of trapping.
        let failed = self.tmp();
        self.line(&format!("{} = icmp eq ptr {}, null", failed, read));
        let error_label = self.label("input_error");
        let ok_label = self.label("input_ok");
        self.cond_branch(&failed, &error_label, &ok_label);

        self.start_block(&error_label);
        let empty = self.string_constant("");
        self.line(&format!("store ptr {}, ptr {}", empty, result_slot));
        self.branch(&ok_label);

        self.start_block(&ok_label);
        let result = self.tmp();
        self.line(&format!("{} = load ptr, ptr {}", result, result_slot));

        // Strip the trailing newline in place.
        let len = self.tmp();
        self.line(&format!("{} = call i64 @strlen(ptr {})", len, result));
        let empty_len = self.tmp();
        self.line(&format!("{} = icmp eq i64 {}, 0", empty_len, len));

        let check_label = self.label("check_newline");
        let replace_label = self.label("replace_newline");
        let skip_label = self.label("skip_newline");
        self.cond_branch(&empty_len, &skip_label, &check_label);

        self.start_block(&check_label);
        let last_idx = self.tmp();
        self.line(&format!("{} = sub i64 {}, 1", last_idx, len));
        let last_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds i8, ptr {}, i64 {}",
            last_ptr, result, last_idx
        ));
        let last_char = self.tmp();
        self.line(&format!("{} = load i8, ptr {}", last_char, last_ptr));
        let is_newline = self.tmp();
        self.line(&format!("{} = icmp eq i8 {}, 10", is_newline, last_char));
        self.cond_branch(&is_newline, &replace_label, &skip_label);

        self.start_block(&replace_label);
        self.line(&format!("store i8 0, ptr {}", last_ptr));
        self.branch(&skip_label);

        self.start_block(&skip_label);
        Ok(BoxValue::new(result, BoxType::Str))
    }

    fn builtin_input_num(&mut self) -> CResult<BoxValue> {
        let slot = self.tmp();
        self.line(&format!("{} = alloca double", slot));

        let fmt = self.string_constant("%lf");
        let scanned = self.tmp();
        self.line(&format!(
            "{} = call i32 (ptr, ...) @scanf(ptr {}, ptr {})",
            scanned, fmt, slot
        ));

        let failed = self.tmp();
        self.line(&format!("{} = icmp ne i32 {}, 1", failed, scanned));
        self.emit_trap(
            &failed,
            "input_num_error",
            "input_num_ok",
            "Runtime Error: Invalid number input\n",
        );

        let result = self.tmp();
        self.line(&format!("{} = load double, ptr {}", result, slot));
        Ok(BoxValue::new(result, BoxType::Number))
    }

    fn builtin_read_file(&mut self, path: &BoxValue) -> CResult<BoxValue> {
        let mode = self.string_constant("r");
        let file = self.tmp();
        self.line(&format!(
            "{} = call ptr @fopen(ptr {}, ptr {})",
            file, path.ir, mode
        ));

        let is_null = self.tmp();
        self.line(&format!("{} = icmp eq ptr {}, null", is_null, file));
        self.emit_trap(
            &is_null,
            "file_open_error",
            "file_open_ok",
            "Runtime Error: Cannot open file for reading\n",
        );

        // seek to end / ftell / rewind to learn the size
        self.line(&format!("call i32 @fseek(ptr {}, i64 0, i32 2)", file));
        let size = self.tmp();
        self.line(&format!("{} = call i64 @ftell(ptr {})", size, file));
        self.line(&format!("call void @rewind(ptr {})", file));

        let buffer_size = self.tmp();
        self.line(&format!("{} = add i64 {}, 1", buffer_size, size));
        let buffer = self.tmp();
        self.line(&format!(
            "{} = call ptr @malloc(i64 {})",
            buffer, buffer_size
        ));

        self.line(&format!(
            "call i64 @fread(ptr {}, i64 1, i64 {}, ptr {})",
            buffer, size, file
        ));

        let terminator_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds i8, ptr {}, i64 {}",
            terminator_ptr, buffer, size
        ));
        self.line(&format!("store i8 0, ptr {}", terminator_ptr));

        self.line(&format!("call i32 @fclose(ptr {})", file));
        Ok(BoxValue::new(buffer, BoxType::Str))
    }

    /// `write_file` / `append_file` differ only in the fopen mode.
    fn builtin_open_write(
        &mut self,
        path: &BoxValue,
        content: &BoxValue,
        mode: &str,
        action: &str,
    ) -> CResult<BoxValue> {
        let mode_str = self.string_constant(mode);
        let file = self.tmp();
        self.line(&format!(
            "{} = call ptr @fopen(ptr {}, ptr {})",
            file, path.ir, mode_str
        ));

        let is_null = self.tmp();
        self.line(&format!("{} = icmp eq ptr {}, null", is_null, file));
        let message = format!("Runtime Error: Cannot open file for {}\n", action);
        self.emit_trap(&is_null, "file_write_error", "file_write_ok", &message);

        self.line(&format!(
            "call i32 @fputs(ptr {}, ptr {})",
            content.ir, file
        ));
        self.line(&format!("call i32 @fclose(ptr {})", file));
        Ok(BoxValue::new(double_const(1.0), BoxType::Number))
    }

    fn builtin_file_exists(&mut self, path: &BoxValue) -> CResult<BoxValue> {
        let result = self.tmp();
        self.line(&format!(
            "{} = call i32 @access(ptr {}, i32 0)",
            result, path.ir
        ));
        let exists = self.tmp();
        self.line(&format!("{} = icmp eq i32 {}, 0", exists, result));
        Ok(BoxValue::new(exists, BoxType::Bool))
    }
}
