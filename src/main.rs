use boxc::compiler::driver::{CompileOptions, Compiler, BOX_VERSION};
use std::env;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage(&args[0]);
        process::exit(1);
    }

    let options = parse_arguments(&args);
    let mut compiler = Compiler::new(options);
    let result = compiler.compile();

    process::exit(result.exit_code);
}

fn parse_arguments(args: &[String]) -> CompileOptions {
    let mut options = CompileOptions::default();

    let mut i = 1;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "-h" | "--help" => {
                print_help();
                process::exit(0);
            }
            "--version" => {
                println!("Box Compiler v{}", BOX_VERSION);
                process::exit(0);
            }
            "-o" | "--output" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: -o requires an argument");
                    process::exit(1);
                }
                options.output_file = Some(args[i].clone());
            }
            "--emit-llvm" => options.emit_llvm = true,
            "--emit-ast" => options.emit_ast = true,
            "-S" => options.emit_assembly = true,
            "-r" | "--run" => options.run_after_compile = true,
            "--no-optimize" => options.optimize = false,
            "--no-warnings" => options.show_memory_warnings = false,
            "-v" | "--verbose" => options.verbose = true,
            _ if arg.starts_with("-Oasm") => {
                options.backend_optimization_level = parse_level(&arg[5..], "LLVM codegen");
            }
            _ if arg.starts_with("-O") => {
                options.optimization_level = parse_level(&arg[2..], "IR");
            }
            _ if !arg.starts_with('-') => {
                options.input_file = arg.to_string();
            }
            other => {
                eprintln!("Error: Unknown option: {}", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
        i += 1;
    }

    if options.input_file.is_empty() {
        eprintln!("Error: No input file specified");
        print_usage(&args[0]);
        process::exit(1);
    }

    options
}

fn parse_level(text: &str, what: &str) -> u8 {
    match text.parse::<u8>() {
        Ok(level) if level <= 3 => level,
        _ => {
            eprintln!("Error: {} optimization level must be 0-3", what);
            process::exit(1);
        }
    }
}

fn print_usage(program_name: &str) {
    eprintln!("Usage: {} [options] <input-file>", program_name);
    eprintln!("Try '{} --help' for more information.", program_name);
}

fn print_help() {
    println!("Usage: boxc [options] <input-file>\n");
    println!("Options:");
    println!("  -o, --output <file>     Specify output executable file");
    println!("  --emit-llvm             Emit LLVM IR to .ll file");
    println!("  --emit-ast              Emit the parsed AST as JSON");
    println!("  -S                      Emit assembly to .s file");
    println!("  -r, --run               Run the compiled program immediately");
    println!("  --no-optimize           Disable optimizations");
    println!("  -O<level>               Set IR optimization level (0-3, default: 3)");
    println!("  -Oasm<level>            Set LLVM codegen optimization level (0-3, default: 3)");
    println!("  --no-warnings           Suppress memory safety warnings");
    println!("  -v, --verbose           Enable verbose output");
    println!("  --version               Show version information");
    println!("  -h, --help              Show this help message");
    println!("\nExamples:");
    println!("  boxc program.box                  # Compile to executable");
    println!("  boxc -o myapp program.box         # Compile with custom output name");
    println!("  boxc --emit-llvm program.box      # Generate LLVM IR");
    println!("  boxc -S program.box               # Generate assembly");
    println!("  boxc -r program.box               # Compile and run");
    println!("  boxc -O2 -Oasm3 program.box       # IR opt level 2, LLVM opt level 3");
    println!("  boxc --no-optimize program.box    # Compile without optimizations");
}
