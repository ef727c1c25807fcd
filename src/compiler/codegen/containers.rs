//! Array and dictionary lowering: literals, indexing, the container
//! built-ins, and the `print` walkers.
//!
//! Arrays are `%Array = { i64 length, ptr data }` with f64 elements; dicts
//! are `%Dict = { i64 length, ptr entries }` over `%DictEntry = { double
//! key, double value, i1 used }`. Dict lookup is a linear key scan.

use super::{double_const, BoxType, BoxValue, CResult, Codegen, CodegenError};
use crate::compiler::ast::Expr;
use crate::compiler::token::Token;

impl Codegen {
    // ── Literals ─────────────────────────────────────────────────

    pub(super) fn visit_array_literal(
        &mut self,
        elements: &[Expr],
        bracket: &Token,
    ) -> CResult<BoxValue> {
        let length = elements.len();

        let array = self.tmp();
        self.line(&format!("{} = alloca %Array", array));

        let mut evaluated = Vec::with_capacity(length);
        for (i, element) in elements.iter().enumerate() {
            let value = self.visit_expr(element)?;
            if value.ty != BoxType::Number {
                let hint = format!(
                    "Currently, arrays can only contain numbers.\n\
                     \x20      Element at index {} has type '{}'.",
                    i, value.ty
                );
                return Err(CodegenError::new(
                    "Array elements must be numbers",
                    Some(bracket.clone()),
                    Some(hint),
                ));
            }
            evaluated.push(value);
        }

        let length_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %Array, ptr {}, i32 0, i32 0",
            length_ptr, array
        ));
        self.line(&format!("store i64 {}, ptr {}", length, length_ptr));

        let data_ptr_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %Array, ptr {}, i32 0, i32 1",
            data_ptr_ptr, array
        ));

        if length > 0 {
            let data = self.tmp();
            self.line(&format!(
                "{} = call ptr @malloc(i64 {})",
                data,
                length * 8
            ));
            for (i, value) in evaluated.iter().enumerate() {
                let elem_ptr = self.tmp();
                self.line(&format!(
                    "{} = getelementptr inbounds double, ptr {}, i64 {}",
                    elem_ptr, data, i
                ));
                self.line(&format!("store double {}, ptr {}", value.ir, elem_ptr));
            }
            self.line(&format!("store ptr {}, ptr {}", data, data_ptr_ptr));
        } else {
            self.line(&format!("store ptr null, ptr {}", data_ptr_ptr));
        }

        Ok(BoxValue::new(array, BoxType::Array).with_element_type(BoxType::Number))
    }

    pub(super) fn visit_dict_literal(
        &mut self,
        pairs: &[(Expr, Expr)],
        brace: &Token,
    ) -> CResult<BoxValue> {
        let length = pairs.len();

        let dict = self.tmp();
        self.line(&format!("{} = alloca %Dict", dict));

        let length_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %Dict, ptr {}, i32 0, i32 0",
            length_ptr, dict
        ));
        self.line(&format!("store i64 {}, ptr {}", length, length_ptr));

        let entries_ptr_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %Dict, ptr {}, i32 0, i32 1",
            entries_ptr_ptr, dict
        ));

        if length > 0 {
            let entries = self.tmp();
            self.line(&format!(
                "{} = call ptr @malloc(i64 {})",
                entries,
                length * 24
            ));

            for (i, (key, value)) in pairs.iter().enumerate() {
                let key_value = self.visit_expr(key)?;
                let val_value = self.visit_expr(value)?;

                if key_value.ty != BoxType::Number {
                    let hint = format!(
                        "Dictionary keys must be numbers.\n\
                         \x20      Key at index {} has type '{}'.",
                        i, key_value.ty
                    );
                    return Err(CodegenError::new(
                        "Dictionary keys must be numbers",
                        Some(brace.clone()),
                        Some(hint),
                    ));
                }
                if val_value.ty != BoxType::Number {
                    let hint = format!(
                        "Dictionary values must be numbers.\n\
                         \x20      Value at index {} has type '{}'.",
                        i, val_value.ty
                    );
                    return Err(CodegenError::new(
                        "Dictionary values must be numbers",
                        Some(brace.clone()),
                        Some(hint),
                    ));
                }

                let entry_ptr = self.tmp();
                self.line(&format!(
                    "{} = getelementptr inbounds %DictEntry, ptr {}, i64 {}",
                    entry_ptr, entries, i
                ));
                let key_field = self.tmp();
                self.line(&format!(
                    "{} = getelementptr inbounds %DictEntry, ptr {}, i32 0, i32 0",
                    key_field, entry_ptr
                ));
                self.line(&format!("store double {}, ptr {}", key_value.ir, key_field));
                let val_field = self.tmp();
                self.line(&format!(
                    "{} = getelementptr inbounds %DictEntry, ptr {}, i32 0, i32 1",
                    val_field, entry_ptr
                ));
                self.line(&format!("store double {}, ptr {}", val_value.ir, val_field));
                let used_field = self.tmp();
                self.line(&format!(
                    "{} = getelementptr inbounds %DictEntry, ptr {}, i32 0, i32 2",
                    used_field, entry_ptr
                ));
                self.line(&format!("store i1 true, ptr {}", used_field));
            }

            self.line(&format!("store ptr {}, ptr {}", entries, entries_ptr_ptr));
        } else {
            self.line(&format!("store ptr null, ptr {}", entries_ptr_ptr));
        }

        Ok(BoxValue::new(dict, BoxType::Dict)
            .with_element_type(BoxType::Number)
            .with_value_type(BoxType::Number))
    }

    // ── Indexing ─────────────────────────────────────────────────

    pub(super) fn visit_index_get(
        &mut self,
        container: &Expr,
        index: &Expr,
        bracket: &Token,
    ) -> CResult<BoxValue> {
        let container = self.visit_expr(container)?;

        match container.ty {
            BoxType::Array => self.array_get(&container, index, bracket),
            BoxType::Dict => self.dict_get(&container, index, bracket),
            other => {
                let hint = format!(
                    "Only arrays and dictionaries can be indexed with [].\n\
                     \x20      The expression has type '{}'.",
                    other
                );
                Err(CodegenError::new(
                    "Cannot index value",
                    Some(bracket.clone()),
                    Some(hint),
                ))
            }
        }
    }

    pub(super) fn visit_index_set(
        &mut self,
        container: &Expr,
        index: &Expr,
        value: &Expr,
        bracket: &Token,
    ) -> CResult<BoxValue> {
        let container = self.visit_expr(container)?;

        match container.ty {
            BoxType::Array => self.array_set(&container, index, value, bracket),
            BoxType::Dict => self.dict_set(&container, index, value, bracket),
            other => {
                let hint = format!(
                    "Only arrays and dictionaries can be indexed for assignment.\n\
                     \x20      The expression has type '{}'.",
                    other
                );
                Err(CodegenError::new(
                    "Cannot index value for assignment",
                    Some(bracket.clone()),
                    Some(hint),
                ))
            }
        }
    }

    fn checked_array_elem_ptr(
        &mut self,
        array: &BoxValue,
        index: &Expr,
        bracket: &Token,
    ) -> CResult<String> {
        let index_value = self.visit_expr(index)?;
        if index_value.ty != BoxType::Number {
            let hint = format!(
                "Array indices must be numbers.\n\
                 \x20      The index has type '{}'.",
                index_value.ty
            );
            return Err(CodegenError::new(
                "Array index must be a number",
                Some(bracket.clone()),
                Some(hint),
            ));
        }

        let length_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %Array, ptr {}, i32 0, i32 0",
            length_ptr, array.ir
        ));
        let length = self.tmp();
        self.line(&format!("{} = load i64, ptr {}", length, length_ptr));

        let index_i64 = self.tmp();
        self.line(&format!(
            "{} = fptosi double {} to i64",
            index_i64, index_value.ir
        ));

        self.check_array_bounds(&index_i64, &length, bracket);

        let data_ptr_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %Array, ptr {}, i32 0, i32 1",
            data_ptr_ptr, array.ir
        ));
        let data = self.tmp();
        self.line(&format!("{} = load ptr, ptr {}", data, data_ptr_ptr));

        let elem_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds double, ptr {}, i64 {}",
            elem_ptr, data, index_i64
        ));
        Ok(elem_ptr)
    }

    fn array_get(&mut self, array: &BoxValue, index: &Expr, bracket: &Token) -> CResult<BoxValue> {
        let elem_ptr = self.checked_array_elem_ptr(array, index, bracket)?;
        let elem = self.tmp();
        self.line(&format!("{} = load double, ptr {}", elem, elem_ptr));
        Ok(BoxValue::new(elem, BoxType::Number))
    }

    fn array_set(
        &mut self,
        array: &BoxValue,
        index: &Expr,
        value: &Expr,
        bracket: &Token,
    ) -> CResult<BoxValue> {
        let elem_ptr = self.checked_array_elem_ptr(array, index, bracket)?;

        let value = self.visit_expr(value)?;
        if value.ty != BoxType::Number {
            let hint = format!(
                "Can only assign numbers to array elements.\n\
                 \x20      The value has type '{}'.",
                value.ty
            );
            return Err(CodegenError::new(
                "Array elements must be numbers",
                Some(bracket.clone()),
                Some(hint),
            ));
        }

        self.line(&format!("store double {}, ptr {}", value.ir, elem_ptr));
        Ok(value)
    }

    pub(super) fn check_array_bounds(&mut self, index: &str, length: &str, token: &Token) {
        let negative = self.tmp();
        self.line(&format!("{} = icmp slt i64 {}, 0", negative, index));
        let too_large = self.tmp();
        self.line(&format!("{} = icmp sge i64 {}, {}", too_large, index, length));
        let out_of_bounds = self.tmp();
        self.line(&format!(
            "{} = or i1 {}, {}",
            out_of_bounds, negative, too_large
        ));

        let message = format!(
            "Runtime Error: Array index out of bounds at line {}\n",
            token.line
        );
        self.emit_trap(&out_of_bounds, "bounds_error", "bounds_ok", &message);
    }

    // ── Dict scan helpers ────────────────────────────────────────

    /// Load the (length, entries) pair out of a dict struct pointer.
    fn dict_header(&mut self, dict: &BoxValue) -> (String, String) {
        let length_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %Dict, ptr {}, i32 0, i32 0",
            length_ptr, dict.ir
        ));
        let length = self.tmp();
        self.line(&format!("{} = load i64, ptr {}", length, length_ptr));

        let entries_ptr_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %Dict, ptr {}, i32 0, i32 1",
            entries_ptr_ptr, dict.ir
        ));
        let entries = self.tmp();
        self.line(&format!("{} = load ptr, ptr {}", entries, entries_ptr_ptr));

        (length, entries)
    }

    fn dict_get(&mut self, dict: &BoxValue, index: &Expr, bracket: &Token) -> CResult<BoxValue> {
        let key = self.visit_expr(index)?;
        if key.ty != BoxType::Number {
            let hint = format!(
                "Dictionary keys must be numbers.\n\
                 \x20      The key has type '{}'.",
                key.ty
            );
            return Err(CodegenError::new(
                "Dictionary key must be a number",
                Some(bracket.clone()),
                Some(hint),
            ));
        }

        let (length, entries) = self.dict_header(dict);

        let result_slot = self.tmp();
        self.line(&format!("{} = alloca double", result_slot));
        self.line(&format!(
            "store double {}, ptr {}",
            double_const(0.0),
            result_slot
        ));

        let idx_slot = self.tmp();
        self.line(&format!("{} = alloca i64", idx_slot));
        self.line(&format!("store i64 0, ptr {}", idx_slot));

        let cond_label = self.label("dict_get_cond");
        let body_label = self.label("dict_get_body");
        let found_label = self.label("dict_get_found");
        let notfound_label = self.label("dict_get_notfound");
        let end_label = self.label("dict_get_end");
        let next_label = self.label("dict_get_next");

        self.branch(&cond_label);

        self.start_block(&cond_label);
        let i = self.tmp();
        self.line(&format!("{} = load i64, ptr {}", i, idx_slot));
        let in_range = self.tmp();
        self.line(&format!("{} = icmp slt i64 {}, {}", in_range, i, length));
        self.cond_branch(&in_range, &body_label, &notfound_label);

        self.start_block(&body_label);
        let i2 = self.tmp();
        self.line(&format!("{} = load i64, ptr {}", i2, idx_slot));
        let entry_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %DictEntry, ptr {}, i64 {}",
            entry_ptr, entries, i2
        ));
        let entry_key_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %DictEntry, ptr {}, i32 0, i32 0",
            entry_key_ptr, entry_ptr
        ));
        let entry_key = self.tmp();
        self.line(&format!("{} = load double, ptr {}", entry_key, entry_key_ptr));
        let matched = self.tmp();
        self.line(&format!(
            "{} = fcmp oeq double {}, {}",
            matched, entry_key, key.ir
        ));
        self.cond_branch(&matched, &found_label, &next_label);

        self.start_block(&next_label);
        let i_next = self.tmp();
        self.line(&format!("{} = add i64 {}, 1", i_next, i2));
        self.line(&format!("store i64 {}, ptr {}", i_next, idx_slot));
        self.branch(&cond_label);

        self.start_block(&found_label);
        let entry_val_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %DictEntry, ptr {}, i32 0, i32 1",
            entry_val_ptr, entry_ptr
        ));
        let entry_val = self.tmp();
        self.line(&format!("{} = load double, ptr {}", entry_val, entry_val_ptr));
        self.line(&format!("store double {}, ptr {}", entry_val, result_slot));
        self.branch(&end_label);

        self.start_block(&notfound_label);
        let message = format!(
            "Runtime Error: Dictionary key not found at line {}\n",
            bracket.line
        );
        let msg = self.string_constant(&message);
        self.line(&format!("call i32 (ptr, ...) @printf(ptr {})", msg));
        self.line("call void @exit(i32 1)");
        self.line("unreachable");
        self.block_terminated = true;

        self.start_block(&end_label);
        let result = self.tmp();
        self.line(&format!("{} = load double, ptr {}", result, result_slot));
        Ok(BoxValue::new(result, BoxType::Number))
    }

    fn dict_set(
        &mut self,
        dict: &BoxValue,
        index: &Expr,
        value: &Expr,
        bracket: &Token,
    ) -> CResult<BoxValue> {
        let key = self.visit_expr(index)?;
        let value = self.visit_expr(value)?;

        if key.ty != BoxType::Number {
            let hint = format!(
                "Dictionary keys must be numbers.\n\
                 \x20      The key has type '{}'.",
                key.ty
            );
            return Err(CodegenError::new(
                "Dictionary key must be a number",
                Some(bracket.clone()),
                Some(hint),
            ));
        }
        if value.ty != BoxType::Number {
            let hint = format!(
                "Dictionary values must be numbers.\n\
                 \x20      The value has type '{}'.",
                value.ty
            );
            return Err(CodegenError::new(
                "Dictionary value must be a number",
                Some(bracket.clone()),
                Some(hint),
            ));
        }

        let (length, entries) = self.dict_header(dict);

        let idx_slot = self.tmp();
        self.line(&format!("{} = alloca i64", idx_slot));
        self.line(&format!("store i64 0, ptr {}", idx_slot));

        let cond_label = self.label("dict_set_cond");
        let body_label = self.label("dict_set_body");
        let found_label = self.label("dict_set_found");
        let end_label = self.label("dict_set_end");
        let next_label = self.label("dict_set_next");

        self.branch(&cond_label);

        self.start_block(&cond_label);
        let i = self.tmp();
        self.line(&format!("{} = load i64, ptr {}", i, idx_slot));
        let in_range = self.tmp();
        self.line(&format!("{} = icmp slt i64 {}, {}", in_range, i, length));
        self.cond_branch(&in_range, &body_label, &end_label);

        self.start_block(&body_label);
        let i2 = self.tmp();
        self.line(&format!("{} = load i64, ptr {}", i2, idx_slot));
        let entry_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %DictEntry, ptr {}, i64 {}",
            entry_ptr, entries, i2
        ));
        let entry_key_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %DictEntry, ptr {}, i32 0, i32 0",
            entry_key_ptr, entry_ptr
        ));
        let entry_key = self.tmp();
        self.line(&format!("{} = load double, ptr {}", entry_key, entry_key_ptr));
        let matched = self.tmp();
        self.line(&format!(
            "{} = fcmp oeq double {}, {}",
            matched, entry_key, key.ir
        ));
        self.cond_branch(&matched, &found_label, &next_label);

        self.start_block(&next_label);
        let i_next = self.tmp();
        self.line(&format!("{} = add i64 {}, 1", i_next, i2));
        self.line(&format!("store i64 {}, ptr {}", i_next, idx_slot));
        self.branch(&cond_label);

        self.start_block(&found_label);
        let entry_val_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %DictEntry, ptr {}, i32 0, i32 1",
            entry_val_ptr, entry_ptr
        ));
        self.line(&format!("store double {}, ptr {}", value.ir, entry_val_ptr));
        self.branch(&end_label);

        self.start_block(&end_label);
        Ok(value)
    }

    // ── Container built-ins ──────────────────────────────────────

    pub(super) fn builtin_len(&mut self, arg: &BoxValue, paren: &Token) -> CResult<BoxValue> {
        let struct_ty = match arg.ty {
            BoxType::Array => "%Array",
            BoxType::Dict => "%Dict",
            other => {
                let hint = format!(
                    "The 'len' function works with arrays and dictionaries.\n\
                     \x20      Argument type: {}",
                    other
                );
                return Err(CodegenError::new(
                    "len() requires an array or dict argument",
                    Some(paren.clone()),
                    Some(hint),
                ));
            }
        };

        let length_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds {}, ptr {}, i32 0, i32 0",
            length_ptr, struct_ty, arg.ir
        ));
        let length = self.tmp();
        self.line(&format!("{} = load i64, ptr {}", length, length_ptr));
        let as_double = self.tmp();
        self.line(&format!("{} = sitofp i64 {} to double", as_double, length));
        Ok(BoxValue::new(as_double, BoxType::Number))
    }

    pub(super) fn builtin_has(
        &mut self,
        dict: &BoxValue,
        key: &BoxValue,
        paren: &Token,
    ) -> CResult<BoxValue> {
        if dict.ty != BoxType::Dict {
            let hint = format!(
                "The 'has' function requires a dictionary as first argument.\n\
                 \x20      Argument type: {}",
                dict.ty
            );
            return Err(CodegenError::new(
                "has() requires a dict as first argument",
                Some(paren.clone()),
                Some(hint),
            ));
        }
        if key.ty != BoxType::Number {
            let hint = format!(
                "Dictionary keys must be numbers.\n\
                 \x20      Key type: {}",
                key.ty
            );
            return Err(CodegenError::new(
                "has() requires a number key",
                Some(paren.clone()),
                Some(hint),
            ));
        }

        let (length, entries) = self.dict_header(dict);

        let result_slot = self.tmp();
        self.line(&format!("{} = alloca i1", result_slot));
        self.line(&format!("store i1 false, ptr {}", result_slot));

        let idx_slot = self.tmp();
        self.line(&format!("{} = alloca i64", idx_slot));
        self.line(&format!("store i64 0, ptr {}", idx_slot));

        let cond_label = self.label("has_cond");
        let body_label = self.label("has_body");
        let found_label = self.label("has_found");
        let end_label = self.label("has_end");
        let next_label = self.label("has_next");

        self.branch(&cond_label);

        self.start_block(&cond_label);
        let i = self.tmp();
        self.line(&format!("{} = load i64, ptr {}", i, idx_slot));
        let in_range = self.tmp();
        self.line(&format!("{} = icmp slt i64 {}, {}", in_range, i, length));
        self.cond_branch(&in_range, &body_label, &end_label);

        self.start_block(&body_label);
        let entry_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %DictEntry, ptr {}, i64 {}",
            entry_ptr, entries, i
        ));
        let entry_key_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %DictEntry, ptr {}, i32 0, i32 0",
            entry_key_ptr, entry_ptr
        ));
        let entry_key = self.tmp();
        self.line(&format!("{} = load double, ptr {}", entry_key, entry_key_ptr));
        let matched = self.tmp();
        self.line(&format!(
            "{} = fcmp oeq double {}, {}",
            matched, entry_key, key.ir
        ));
        self.cond_branch(&matched, &found_label, &next_label);

        self.start_block(&next_label);
        let i_next = self.tmp();
        self.line(&format!("{} = add i64 {}, 1", i_next, i));
        self.line(&format!("store i64 {}, ptr {}", i_next, idx_slot));
        self.branch(&cond_label);

        self.start_block(&found_label);
        self.line(&format!("store i1 true, ptr {}", result_slot));
        self.branch(&end_label);

        self.start_block(&end_label);
        let result = self.tmp();
        self.line(&format!("{} = load i1, ptr {}", result, result_slot));
        Ok(BoxValue::new(result, BoxType::Bool))
    }

    /// `keys(dict)` and `values(dict)` both copy one entry field into a
    /// fresh array; `field_index` selects which (0 = key, 1 = value).
    pub(super) fn dict_field_array(&mut self, dict: &BoxValue, field_index: u32) -> BoxValue {
        let (length, entries) = self.dict_header(dict);

        let array = self.tmp();
        self.line(&format!("{} = alloca %Array", array));
        let array_length_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %Array, ptr {}, i32 0, i32 0",
            array_length_ptr, array
        ));
        self.line(&format!("store i64 {}, ptr {}", length, array_length_ptr));

        let data_size = self.tmp();
        self.line(&format!("{} = mul i64 {}, 8", data_size, length));
        let data = self.tmp();
        self.line(&format!("{} = call ptr @malloc(i64 {})", data, data_size));

        let idx_slot = self.tmp();
        self.line(&format!("{} = alloca i64", idx_slot));
        self.line(&format!("store i64 0, ptr {}", idx_slot));

        let base = if field_index == 0 { "keys" } else { "values" };
        let cond_label = self.label(&format!("{}_cond", base));
        let body_label = self.label(&format!("{}_body", base));
        let end_label = self.label(&format!("{}_end", base));

        self.branch(&cond_label);

        self.start_block(&cond_label);
        let i = self.tmp();
        self.line(&format!("{} = load i64, ptr {}", i, idx_slot));
        let in_range = self.tmp();
        self.line(&format!("{} = icmp slt i64 {}, {}", in_range, i, length));
        self.cond_branch(&in_range, &body_label, &end_label);

        self.start_block(&body_label);
        let entry_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %DictEntry, ptr {}, i64 {}",
            entry_ptr, entries, i
        ));
        let field_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %DictEntry, ptr {}, i32 0, i32 {}",
            field_ptr, entry_ptr, field_index
        ));
        let field = self.tmp();
        self.line(&format!("{} = load double, ptr {}", field, field_ptr));
        let dest_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds double, ptr {}, i64 {}",
            dest_ptr, data, i
        ));
        self.line(&format!("store double {}, ptr {}", field, dest_ptr));
        let i_next = self.tmp();
        self.line(&format!("{} = add i64 {}, 1", i_next, i));
        self.line(&format!("store i64 {}, ptr {}", i_next, idx_slot));
        self.branch(&cond_label);

        self.start_block(&end_label);
        let data_ptr_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %Array, ptr {}, i32 0, i32 1",
            data_ptr_ptr, array
        ));
        self.line(&format!("store ptr {}, ptr {}", data, data_ptr_ptr));

        BoxValue::new(array, BoxType::Array).with_element_type(BoxType::Number)
    }

    // ── Print walkers ────────────────────────────────────────────

    pub(super) fn print_array(&mut self, array: &BoxValue) {
        let open = self.string_constant("[");
        self.line(&format!("call i32 (ptr, ...) @printf(ptr {})", open));

        let length_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %Array, ptr {}, i32 0, i32 0",
            length_ptr, array.ir
        ));
        let length = self.tmp();
        self.line(&format!("{} = load i64, ptr {}", length, length_ptr));
        let data_ptr_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %Array, ptr {}, i32 0, i32 1",
            data_ptr_ptr, array.ir
        ));
        let data = self.tmp();
        self.line(&format!("{} = load ptr, ptr {}", data, data_ptr_ptr));

        let idx_slot = self.tmp();
        self.line(&format!("{} = alloca i64", idx_slot));
        self.line(&format!("store i64 0, ptr {}", idx_slot));

        let cond_label = self.label("print_array_cond");
        let body_label = self.label("print_array_body");
        let end_label = self.label("print_array_end");
        let comma_label = self.label("print_comma");
        let elem_label = self.label("print_elem");

        self.branch(&cond_label);

        self.start_block(&cond_label);
        let i = self.tmp();
        self.line(&format!("{} = load i64, ptr {}", i, idx_slot));
        let in_range = self.tmp();
        self.line(&format!("{} = icmp slt i64 {}, {}", in_range, i, length));
        self.cond_branch(&in_range, &body_label, &end_label);

        self.start_block(&body_label);
        let not_first = self.tmp();
        self.line(&format!("{} = icmp sgt i64 {}, 0", not_first, i));
        self.cond_branch(&not_first, &comma_label, &elem_label);

        self.start_block(&comma_label);
        let comma = self.string_constant(", ");
        self.line(&format!("call i32 (ptr, ...) @printf(ptr {})", comma));
        self.branch(&elem_label);

        self.start_block(&elem_label);
        let elem_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds double, ptr {}, i64 {}",
            elem_ptr, data, i
        ));
        let elem = self.tmp();
        self.line(&format!("{} = load double, ptr {}", elem, elem_ptr));
        let elem_fmt = self.string_constant("%g");
        self.line(&format!(
            "call i32 (ptr, ...) @printf(ptr {}, double {})",
            elem_fmt, elem
        ));
        let i_next = self.tmp();
        self.line(&format!("{} = add i64 {}, 1", i_next, i));
        self.line(&format!("store i64 {}, ptr {}", i_next, idx_slot));
        self.branch(&cond_label);

        self.start_block(&end_label);
        let close = self.string_constant("]\n");
        self.line(&format!("call i32 (ptr, ...) @printf(ptr {})", close));
    }

    pub(super) fn print_dict(&mut self, dict: &BoxValue) {
        let open = self.string_constant("{");
        self.line(&format!("call i32 (ptr, ...) @printf(ptr {})", open));

        let (length, entries) = self.dict_header(dict);

        let idx_slot = self.tmp();
        self.line(&format!("{} = alloca i64", idx_slot));
        self.line(&format!("store i64 0, ptr {}", idx_slot));

        let first_slot = self.tmp();
        self.line(&format!("{} = alloca i1", first_slot));
        self.line(&format!("store i1 true, ptr {}", first_slot));

        let cond_label = self.label("print_dict_cond");
        let body_label = self.label("print_dict_body");
        let end_label = self.label("print_dict_end");
        let entry_label = self.label("print_entry");
        let skip_label = self.label("skip_entry");
        let comma_label = self.label("print_comma");
        let pair_label = self.label("print_pair");

        self.branch(&cond_label);

        self.start_block(&cond_label);
        let i = self.tmp();
        self.line(&format!("{} = load i64, ptr {}", i, idx_slot));
        let in_range = self.tmp();
        self.line(&format!("{} = icmp slt i64 {}, {}", in_range, i, length));
        self.cond_branch(&in_range, &body_label, &end_label);

        self.start_block(&body_label);
        let entry_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %DictEntry, ptr {}, i64 {}",
            entry_ptr, entries, i
        ));
        let used_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %DictEntry, ptr {}, i32 0, i32 2",
            used_ptr, entry_ptr
        ));
        let used = self.tmp();
        self.line(&format!("{} = load i1, ptr {}", used, used_ptr));
        self.cond_branch(&used, &entry_label, &skip_label);

        self.start_block(&entry_label);
        let is_first = self.tmp();
        self.line(&format!("{} = load i1, ptr {}", is_first, first_slot));
        self.cond_branch(&is_first, &pair_label, &comma_label);

        self.start_block(&comma_label);
        let comma = self.string_constant(", ");
        self.line(&format!("call i32 (ptr, ...) @printf(ptr {})", comma));
        self.branch(&pair_label);

        self.start_block(&pair_label);
        self.line(&format!("store i1 false, ptr {}", first_slot));
        let key_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %DictEntry, ptr {}, i32 0, i32 0",
            key_ptr, entry_ptr
        ));
        let key = self.tmp();
        self.line(&format!("{} = load double, ptr {}", key, key_ptr));
        let value_ptr = self.tmp();
        self.line(&format!(
            "{} = getelementptr inbounds %DictEntry, ptr {}, i32 0, i32 1",
            value_ptr, entry_ptr
        ));
        let value = self.tmp();
        self.line(&format!("{} = load double, ptr {}", value, value_ptr));
        let pair_fmt = self.string_constant("%g: %g");
        self.line(&format!(
            "call i32 (ptr, ...) @printf(ptr {}, double {}, double {})",
            pair_fmt, key, value
        ));
        self.branch(&skip_label);

        self.start_block(&skip_label);
        let i_next = self.tmp();
        self.line(&format!("{} = add i64 {}, 1", i_next, i));
        self.line(&format!("store i64 {}, ptr {}", i_next, idx_slot));
        self.branch(&cond_label);

        self.start_block(&end_label);
        let close = self.string_constant("}\n");
        self.line(&format!("call i32 (ptr, ...) @printf(ptr {})", close));
    }
}
