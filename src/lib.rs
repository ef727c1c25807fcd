pub mod compiler;

use compiler::analyzer::MemorySafetyAnalyzer;
use compiler::codegen::Codegen;
use compiler::lexer::Lexer;
use compiler::parser::Parser;

/// Compile Box source code to LLVM IR at the default optimization level.
pub fn compile_to_ir(source: &str) -> Result<String, String> {
    compile_to_ir_with_options(source, true, 3)
}

/// Compile Box source code to LLVM IR with explicit optimizer settings.
pub fn compile_to_ir_with_options(
    source: &str,
    optimize: bool,
    optimize_level: u8,
) -> Result<String, String> {
    // Phase 1: Lex
    let tokens = Lexer::new(source).scan_tokens().map_err(|e| e.to_string())?;

    // Phase 2: Parse
    let statements = Parser::new(tokens, source)
        .parse()
        .map_err(|e| e.to_string())?;

    // Phase 3: Memory safety analysis
    let mut analyzer = MemorySafetyAnalyzer::new();
    if !analyzer.analyze(&statements) {
        return Err(analyzer.report());
    }

    // Phase 4: Optimization + code generation
    let mut codegen = Codegen::new(optimize, if optimize { optimize_level } else { 0 });
    codegen.generate(statements).map_err(|e| e.to_string())
}

/// Run the analyzer alone; returns its warnings on success.
pub fn analyze_source(source: &str) -> Result<Vec<String>, String> {
    let tokens = Lexer::new(source).scan_tokens().map_err(|e| e.to_string())?;
    let statements = Parser::new(tokens, source)
        .parse()
        .map_err(|e| e.to_string())?;

    let mut analyzer = MemorySafetyAnalyzer::new();
    if !analyzer.analyze(&statements) {
        return Err(analyzer.report());
    }
    Ok(analyzer.warnings().to_vec())
}

/// Parse Box source code and return the AST as a pretty JSON string.
pub fn source_to_ast_json(source: &str) -> Result<String, String> {
    let tokens = Lexer::new(source).scan_tokens().map_err(|e| e.to_string())?;
    let statements = Parser::new(tokens, source)
        .parse()
        .map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&statements).map_err(|e| e.to_string())
}
