// ═══════════════════════════════════════════════════════════════
//  Helpers
// ═══════════════════════════════════════════════════════════════

fn compile(source: &str) -> String {
    boxc::compile_to_ir(source).expect("compilation failed")
}

fn compile_err(source: &str) -> String {
    boxc::compile_to_ir(source).expect_err("compilation unexpectedly succeeded")
}

fn analyze(source: &str) -> Vec<String> {
    boxc::analyze_source(source).expect("analysis failed")
}

/// The exact IR text of a double constant, as the code generator writes it.
fn dbl(value: f64) -> String {
    format!("0x{:016X}", value.to_bits())
}

// ═══════════════════════════════════════════════════════════════
//  End-to-end scenarios
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_hello_number() {
    // print 21 + 21; folds to a single printf of 42
    let ir = compile("print 21 + 21;");
    assert!(ir.contains("define i32 @main()"));
    assert!(ir.contains(&dbl(42.0)));
    assert!(ir.contains("@printf"));
}

#[test]
fn test_factorial() {
    let ir = compile(
        "fun f(n){ if(n<=1){ return 1; } return n*f(n-1); }\n\
         print f(6);",
    );
    assert!(ir.contains("define double @f(double %n)"));
    assert!(ir.contains("call double @f(double"));
    assert!(ir.contains("fcmp ole double"));
    assert!(ir.contains("fmul double"));
}

#[test]
fn test_array_sum() {
    let ir = compile(
        "var a = [1,2,3,4,5]; var s = 0; var i = 0;\n\
         while(i<len(a)){ s = s+a[i]; i = i+1; } print s;",
    );
    assert!(ir.contains("%Array = type { i64, ptr }"));
    assert!(ir.contains("call ptr @malloc(i64 40)"));
    assert!(ir.contains("while_cond"));
    // len() loads the length field and converts to double
    assert!(ir.contains("sitofp i64"));
    // indexing is bounds-checked
    assert!(ir.contains("Array index out of bounds"));
}

#[test]
fn test_memory_leak_is_fatal_under_strict() {
    let err = compile_err("var p = malloc(16);");
    assert!(err.contains("MEMORY LEAK"));
    assert!(err.contains("'p'"));
}

#[test]
fn test_double_free_is_fatal() {
    let err = compile_err("var p = malloc(8); free(p); free(p);");
    assert!(err.contains("DOUBLE-FREE"));
    assert!(err.contains("Previously freed at line 1"));
}

#[test]
fn test_unsafe_demotes_strictness() {
    let ir = boxc::compile_to_ir("unsafe { var p = malloc(8); }");
    assert!(ir.is_ok());

    let warnings = analyze("unsafe { var p = malloc(8); }");
    assert!(warnings
        .iter()
        .any(|w| w.contains("memory leak") && w.contains('p')));
}

// ═══════════════════════════════════════════════════════════════
//  Boundary behaviors
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_whitespace_and_comments_compile_to_empty_main() {
    let ir = compile("  \n// only comments\n/* and /* nested */ blocks */\n");
    assert!(ir.contains("define i32 @main()"));
    assert!(ir.contains("ret i32 0"));
}

#[test]
fn test_block_comment_deficit_is_reported() {
    let err = compile_err("/* one /* two /* three */");
    assert!(err.contains("missing 2 closing '*/'"));
}

#[test]
fn test_identifier_length_boundary() {
    let ok_name = "a".repeat(255);
    assert!(boxc::compile_to_ir(&format!("var {} = 1; print {};", ok_name, ok_name)).is_ok());

    let bad_name = "a".repeat(256);
    let err = compile_err(&format!("var {} = 1;", bad_name));
    assert!(err.contains("Identifier too long"));
}

#[test]
fn test_while_false_is_gone_from_ir() {
    let ir = compile("var a = 1; print a; while (false) { a = 2; }");
    assert!(!ir.contains("while_cond"));
}

#[test]
fn test_if_constant_conditions_fold() {
    let ir = compile("var a = 0; if (true) { a = 1; } else { a = 2; } print a;");
    // no conditional branch survives for the folded if
    assert!(!ir.contains("if_then"));
    assert!(ir.contains(&dbl(1.0)));
    assert!(!ir.contains(&dbl(2.0)));
}

#[test]
fn test_algebraic_identities() {
    // x * 0 → 0 feeds the initializer; x itself is then dead and dropped
    let ir = compile("fun f(x) { return x * 0; } print f(3);");
    assert!(ir.contains(&format!("ret double {}", dbl(0.0))));
}

#[test]
fn test_division_by_literal_zero_survives_to_runtime_trap() {
    let ir = compile("var a = 1; print a / 0;");
    assert!(ir.contains("Division by zero at line 1"));
    assert!(ir.contains("fdiv double"));
}

// ═══════════════════════════════════════════════════════════════
//  IR module shape
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_module_declares_runtime_externals() {
    let ir = compile("print 1;");
    for external in [
        "printf", "scanf", "malloc", "free", "memset", "exit", "strcmp", "fopen", "fclose",
        "fgets", "fputs", "fread", "fwrite", "fseek", "ftell", "rewind", "feof", "remove",
        "strlen", "strcpy", "strcat", "access",
    ] {
        assert!(
            ir.contains(&format!("@{}", external)),
            "missing declaration for {}",
            external
        );
    }
    assert!(ir.contains("@stdin = external global ptr"));
    assert!(ir.contains("@stdout = external global ptr"));
}

#[test]
fn test_emitted_ir_is_deterministic() {
    let source = "fun fib(n) { if (n <= 1) { return n; } return fib(n-1) + fib(n-2); }\n\
                  var a = [1, 2, 3];\n\
                  print fib(10); print a[0];";
    let first = compile(source);
    let second = compile(source);
    assert_eq!(first, second);
}

#[test]
fn test_dict_operations_lower_to_linear_scan() {
    let ir = compile(
        "var d = {1: 10, 2: 20}; print d[1]; print has(d, 2); print keys(d); print values(d); \
         print len(d);",
    );
    assert!(ir.contains("%Dict = type { i64, ptr }"));
    assert!(ir.contains("call ptr @malloc(i64 48)"));
    assert!(ir.contains("Dictionary key not found"));
    assert!(ir.contains("has_cond"));
    assert!(ir.contains("keys_cond"));
    assert!(ir.contains("values_cond"));
}

#[test]
fn test_io_builtins_lower_to_c_calls() {
    let ir = compile(
        "var line = input(); var n = input_num(); \
         var ok = write_file(\"out.txt\", line); \
         print file_exists(\"out.txt\"); print n; print ok;",
    );
    assert!(ir.contains("@fgets"));
    assert!(ir.contains("@scanf"));
    assert!(ir.contains("@fopen"));
    assert!(ir.contains("@access"));
    assert!(ir.contains("Invalid number input"));
}

#[test]
fn test_switch_lowers_to_chained_checks() {
    let ir = compile(
        "var x = 2; switch (x) { case 1: print 1; break; case 2: print 2; break; \
         default: print 0; }",
    );
    assert!(ir.contains("case_check"));
    assert!(ir.contains("switch_end"));
}

#[test]
fn test_pointer_roundtrip_compiles() {
    let ir = compile(
        "var x = 5; var p = addr_of(x); var y = deref(p); print y; print x;",
    );
    assert!(ir.contains("Null pointer dereference"));
    assert!(ir.contains("load double"));
}

#[test]
fn test_for_loop_compiles_as_while() {
    let ir = compile("for (var i = 0; i < 3; i = i + 1) { print i; }");
    assert!(ir.contains("while_cond"));
    assert!(ir.contains("while_body"));
}

// ═══════════════════════════════════════════════════════════════
//  Failure propagation
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_lexer_errors_bundle() {
    let err = compile_err("var a = 1; @ #");
    assert!(err.contains("COMPILATION FAILED: Found 2 lexical error(s)"));
    assert!(err.contains("LEXER ERROR"));
}

#[test]
fn test_parser_errors_bundle() {
    let err = compile_err("var = 1; print ;");
    assert!(err.contains("parsing error(s)"));
    assert!(err.contains("PARSER ERROR"));
}

#[test]
fn test_codegen_fails_fast_on_type_error() {
    let err = compile_err("print \"a\" - 1;");
    assert!(err.contains("CODEGEN ERROR"));
    assert!(err.contains("Operands must be numbers for '-' operator"));
}

#[test]
fn test_use_after_free_stops_compilation() {
    let err = compile_err("var p = malloc(8); free(p); print p;");
    assert!(err.contains("USE-AFTER-FREE"));
}

#[test]
fn test_ast_json_export() {
    let json = boxc::source_to_ast_json("var x = 1;").unwrap();
    assert!(json.contains("\"Var\""));
    assert!(json.contains("\"x\""));
}
