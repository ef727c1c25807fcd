//! Compilation driver: orchestrates the pipeline front to back.
//!
//! Reads the source, splices transitive imports, runs the memory-safety
//! analyzer (fail → terminate), lowers to IR, hands the IR to the external
//! backend (`llc`) for assembly/object emission, links with the system
//! linker, and optionally runs the produced executable. Each phase reports
//! the first failure and no later phase runs.

use crate::compiler::analyzer::MemorySafetyAnalyzer;
use crate::compiler::ast::Stmt;
use crate::compiler::codegen::Codegen;
use crate::compiler::lexer::Lexer;
use crate::compiler::parser::Parser;
use crate::compiler::resolver::FileResolver;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const BOX_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub input_file: String,
    pub output_file: Option<String>,
    pub emit_llvm: bool,
    pub emit_assembly: bool,
    pub emit_ast: bool,
    pub run_after_compile: bool,
    pub optimize: bool,
    pub optimization_level: u8,
    pub backend_optimization_level: u8,
    pub show_memory_warnings: bool,
    pub verbose: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            input_file: String::new(),
            output_file: None,
            emit_llvm: false,
            emit_assembly: false,
            emit_ast: false,
            run_after_compile: false,
            optimize: true,
            optimization_level: 3,
            backend_optimization_level: 3,
            show_memory_warnings: true,
            verbose: false,
        }
    }
}

#[derive(Debug)]
pub struct CompilationResult {
    pub success: bool,
    pub message: String,
    pub exit_code: i32,
}

impl CompilationResult {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            exit_code: 1,
        }
    }
}

pub struct Compiler {
    options: CompileOptions,
    resolver: FileResolver,
    processed_files: HashSet<PathBuf>,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        let base_dir = Path::new(&options.input_file)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            options,
            resolver: FileResolver::new(base_dir),
            processed_files: HashSet::new(),
        }
    }

    pub fn compile(&mut self) -> CompilationResult {
        if self.options.verbose {
            print_banner();
        }

        let input_file = self.options.input_file.clone();
        let source = match fs::read_to_string(&input_file) {
            Ok(source) => source,
            Err(e) => {
                print_error("File Error", &format!("Cannot read file '{}': {}", input_file, e));
                return CompilationResult::failure("File not found");
            }
        };

        if self.options.verbose {
            println!("\x1b[1;34m[1/5]\x1b[0m Lexical Analysis & Import Resolution...");
        }

        let mut statements = Vec::new();
        if let Err(message) = self.process_imports(Path::new(&input_file), &source, &mut statements)
        {
            print_error("Import Error", &message);
            return CompilationResult::failure("Import processing failed");
        }

        if self.options.verbose {
            println!("\x1b[1;32m  ✓\x1b[0m Parsed {} statements\n", statements.len());
            println!("\x1b[1;34m[2/5]\x1b[0m Memory Safety Analysis...");
        }

        if self.options.emit_ast {
            match serde_json::to_string_pretty(&statements) {
                Ok(json) => {
                    let ast_path = stem_with_extension(&input_file, "ast.json");
                    if fs::write(&ast_path, json).is_ok() {
                        println!("\x1b[1;36m→ AST written to: {}\x1b[0m", ast_path);
                    } else {
                        print_error("File Error", "Failed to write AST file");
                    }
                }
                Err(e) => print_error("File Error", &format!("Cannot serialize AST: {}", e)),
            }
        }

        let mut analyzer = MemorySafetyAnalyzer::new();
        if !analyzer.analyze(&statements) {
            let report = analyzer.report();
            if !report.is_empty() {
                println!("\n{}", report);
            }
            print_error("Memory Safety Error", "Code failed memory safety analysis");
            return CompilationResult::failure("Memory safety violation");
        }

        if self.options.verbose && !analyzer.warnings().is_empty() {
            println!("\x1b[1;33m  ⚠\x1b[0m {} warnings", analyzer.warnings().len());
        }
        if self.options.show_memory_warnings && !analyzer.warnings().is_empty() {
            println!("\n\x1b[1;33m⚠ Memory Safety Warnings:\x1b[0m");
            for warning in analyzer.warnings() {
                println!("\x1b[0;33m  • {}\x1b[0m", warning);
            }
        }

        if self.options.verbose {
            println!("\n\x1b[1;34m[3/5]\x1b[0m Code Generation...");
        }

        let mut codegen = Codegen::new(
            self.options.optimize,
            if self.options.optimize {
                self.options.optimization_level
            } else {
                0
            },
        );
        let ir = match codegen.generate(statements) {
            Ok(ir) => ir,
            Err(e) => {
                print_error("Code Generation Error", &e.to_string());
                return CompilationResult::failure(e.to_string());
            }
        };

        if self.options.verbose {
            println!("\x1b[1;32m  ✓\x1b[0m LLVM IR generated");
        }

        if self.options.emit_llvm {
            let ll_path = stem_with_extension(&input_file, "ll");
            if fs::write(&ll_path, &ir).is_ok() {
                println!("\x1b[1;36m→ LLVM IR written to: {}\x1b[0m", ll_path);
            } else {
                print_error("File Error", "Failed to write LLVM IR file");
            }
        }

        if self.options.verbose {
            println!("\n\x1b[1;34m[4/5]\x1b[0m Backend Code Generation...");
        }

        // The textual IR goes through a temp .ll file to the external
        // backend for assembly/object emission.
        let ll_temp = stem_with_extension(&input_file, "tmp.ll");
        if let Err(e) = fs::write(&ll_temp, &ir) {
            print_error("File Error", &format!("Cannot write temp IR: {}", e));
            return CompilationResult::failure("Failed to write temp IR");
        }

        if self.options.emit_assembly {
            let asm_path = stem_with_extension(&input_file, "s");
            if let Err(message) = self.run_backend(&ll_temp, &asm_path, "asm") {
                let _ = fs::remove_file(&ll_temp);
                print_error("Backend Error", &message);
                return CompilationResult::failure("Failed to generate assembly file");
            }
            println!("\x1b[1;36m→ Assembly written to: {}\x1b[0m", asm_path);
        }

        let obj_path = stem_with_extension(&input_file, "o");
        if let Err(message) = self.run_backend(&ll_temp, &obj_path, "obj") {
            let _ = fs::remove_file(&ll_temp);
            print_error("Backend Error", &message);
            return CompilationResult::failure("Failed to generate object file");
        }

        if self.options.verbose {
            println!("\n\x1b[1;34m[5/5]\x1b[0m Linking...");
        }

        let exe_path = self
            .options
            .output_file
            .clone()
            .unwrap_or_else(|| stem_of(&input_file));

        let link_result = link_executable(&obj_path, &exe_path);
        self.cleanup_intermediate(&obj_path);
        self.cleanup_intermediate(&ll_temp);

        if let Err(message) = link_result {
            print_error("Linker Error", &message);
            return CompilationResult::failure("Linking failed");
        }

        if self.options.verbose {
            println!("\x1b[1;32m  ✓\x1b[0m Executable created\n");
        }

        println!("\x1b[1;32m✓ Compilation successful!\x1b[0m");
        println!("\x1b[1;37m→ Output: \x1b[1;36m{}\x1b[0m", exe_path);

        if self.options.run_after_compile {
            let exit_code = run_executable(&exe_path);
            return CompilationResult {
                success: true,
                message: "Compilation and execution completed".to_string(),
                exit_code,
            };
        }

        CompilationResult {
            success: true,
            message: "Compilation completed successfully".to_string(),
            exit_code: 0,
        }
    }

    /// Depth-first import splicing with cycle detection. Non-import
    /// statements accumulate in dependency order.
    fn process_imports(
        &mut self,
        file_path: &Path,
        source: &str,
        all_statements: &mut Vec<Stmt>,
    ) -> Result<(), String> {
        let normalized = self.resolver.normalize(file_path);

        if self.processed_files.contains(&normalized) {
            return Ok(());
        }

        if self.resolver.is_processing(&normalized) {
            let mut message = String::from("Circular import detected:\n");
            for file in self.resolver.processing_stack() {
                message.push_str(&format!("  → {}\n", file.display()));
            }
            message.push_str(&format!("  → {}", normalized.display()));
            return Err(message);
        }

        self.resolver.begin_processing(&normalized);

        let result = (|| -> Result<(), String> {
            let tokens = Lexer::new(source)
                .scan_tokens()
                .map_err(|e| format!("Syntax Error in {}: {}", file_path.display(), e))?;
            let statements = Parser::new(tokens, source)
                .parse()
                .map_err(|e| format!("Parse Error in {}: {}", file_path.display(), e))?;

            for stmt in statements {
                if let Stmt::Import { file_path: import_path, .. } = &stmt {
                    let resolved = self
                        .resolver
                        .resolve_import(import_path, &normalized)
                        .ok_or_else(|| {
                            format!("Cannot find imported file: {}", import_path)
                        })?;

                    let imported_source = fs::read_to_string(&resolved).map_err(|e| {
                        format!("Cannot read imported file: {}: {}", resolved.display(), e)
                    })?;

                    self.process_imports(&resolved, &imported_source, all_statements)?;
                } else {
                    all_statements.push(stmt);
                }
            }
            Ok(())
        })();

        self.resolver.end_processing(&normalized);
        result?;

        self.resolver.mark_resolved(&normalized);
        self.processed_files.insert(normalized);
        Ok(())
    }

    /// Invoke the external backend (`llc`) on the IR file.
    fn run_backend(&self, ll_path: &str, out_path: &str, filetype: &str) -> Result<(), String> {
        let output = Command::new("llc")
            .arg(format!("-O{}", self.options.backend_optimization_level))
            .arg(format!("-filetype={}", filetype))
            .arg(ll_path)
            .arg("-o")
            .arg(out_path)
            .output()
            .map_err(|e| format!("Failed to execute llc: {}", e))?;

        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).into_owned());
        }
        Ok(())
    }

    fn cleanup_intermediate(&self, path: &str) {
        if let Err(e) = fs::remove_file(path) {
            if self.options.verbose && Path::new(path).exists() {
                eprintln!("Warning: Failed to clean up intermediate file: {}", e);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Process plumbing
// ═══════════════════════════════════════════════════════════════

fn link_executable(obj_path: &str, exe_path: &str) -> Result<(), String> {
    let output = Command::new("gcc")
        .arg(obj_path)
        .arg("-o")
        .arg(exe_path)
        .arg("-lm")
        .arg("-no-pie")
        .output()
        .map_err(|e| format!("Failed to execute linker: {}", e))?;

    if !output.status.success() {
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(combined);
    }
    Ok(())
}

fn run_executable(exe_path: &str) -> i32 {
    let rule = "═".repeat(60);
    println!("\n\x1b[1;36m{}\x1b[0m", rule);
    println!("\x1b[1;37mRunning: {}\x1b[0m", exe_path);
    println!("\x1b[1;36m{}\x1b[0m\n", rule);

    let invocation = if Path::new(exe_path).is_absolute() {
        exe_path.to_string()
    } else {
        format!("./{}", exe_path)
    };

    let exit_code = match Command::new(&invocation).status() {
        Ok(status) => status.code().unwrap_or(1),
        Err(e) => {
            print_error("Execution Error", &format!("{}", e));
            1
        }
    };

    println!("\n\x1b[1;36m{}\x1b[0m", rule);
    println!("\x1b[1;37mProgram exited with code: {}\x1b[0m", exit_code);
    println!("\x1b[1;36m{}\x1b[0m", rule);

    exit_code
}

fn print_banner() {
    println!("\x1b[1;36m╔══════════════════════════════════════╗");
    println!("║          Box Compiler v{}          ║", BOX_VERSION);
    println!("╚══════════════════════════════════════╝\x1b[0m\n");
}

fn print_error(error_type: &str, message: &str) {
    eprintln!("\x1b[1;31m✗ {}:\x1b[0m {}", error_type, message);
}

fn stem_of(input_file: &str) -> String {
    Path::new(input_file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "a.out".to_string())
}

fn stem_with_extension(input_file: &str, extension: &str) -> String {
    let path = Path::new(input_file);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent
            .join(format!("{}.{}", stem, extension))
            .to_string_lossy()
            .into_owned(),
        None => format!("{}.{}", stem, extension),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stem_helpers() {
        assert_eq!(stem_of("dir/prog.box"), "prog");
        assert_eq!(stem_with_extension("prog.box", "ll"), "prog.ll");
        assert_eq!(stem_with_extension("dir/prog.box", "s"), "dir/prog.s");
    }

    #[test]
    fn test_default_options() {
        let options = CompileOptions::default();
        assert!(options.optimize);
        assert_eq!(options.optimization_level, 3);
        assert_eq!(options.backend_optimization_level, 3);
        assert!(options.show_memory_warnings);
    }
}
