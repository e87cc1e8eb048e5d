/// Flatline - command-line driver
use flatline::backend::target::{RunOutcome, TargetVm};
use flatline::ir::Program;
use flatline::{compile, CompiledProgram, CompilerConfig};
use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process;
use tracing::Level;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("Flatline v{}", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    flatline [OPTIONS] <INPUT>");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -h, --help             Print this help message");
    eprintln!("    -v, --version          Print version information");
    eprintln!("    -c, --config <FILE>    Read settings from FILE (default: flatline.toml next to INPUT)");
    eprintln!("    -o, --output <FILE>    Write output to FILE (default: stdout)");
    eprintln!("    --run                  Execute every rule on the reference executor");
    eprintln!("    --verbose              Log generation and execution details");
    eprintln!();
    eprintln!("ARGUMENTS:");
    eprintln!("    <INPUT>                Program tree in TOML (use '-' for stdin)");
    eprintln!();
    eprintln!("EXAMPLES:");
    eprintln!("    flatline program.toml");
    eprintln!("    flatline --run -c flatline.toml program.toml");
    eprintln!("    cat program.toml | flatline -");
}

fn print_version() {
    println!("Flatline {}", VERSION);
}

struct Options {
    input: Option<String>,
    output: Option<String>,
    config: Option<String>,
    run: bool,
    verbose: bool,
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();

    let mut input = None;
    let mut output = None;
    let mut config = None;
    let mut run = false;
    let mut verbose = false;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                process::exit(0);
            }
            "-o" | "--output" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing output file after -o".to_string());
                }
                output = Some(args[i].clone());
            }
            "-c" | "--config" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing config file after -c".to_string());
                }
                config = Some(args[i].clone());
            }
            "--run" => {
                run = true;
            }
            "--verbose" => {
                verbose = true;
            }
            arg if arg.starts_with('-') && arg != "-" => {
                return Err(format!("Unknown option: {}", arg));
            }
            arg => {
                if input.is_some() {
                    return Err("Multiple input files specified".to_string());
                }
                input = Some(arg.to_string());
            }
        }
        i += 1;
    }

    Ok(Options {
        input,
        output,
        config,
        run,
        verbose,
    })
}

fn read_input(input: &str) -> Result<String, String> {
    if input == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| format!("Failed to read from stdin: {}", e))?;
        Ok(buffer)
    } else {
        let path = Path::new(input);
        if !path.exists() {
            return Err(format!("Input file not found: {}", input));
        }
        fs::read_to_string(path).map_err(|e| format!("Failed to read file '{}': {}", input, e))
    }
}

fn load_config(options: &Options, input: &str) -> Result<CompilerConfig, String> {
    let loaded = match &options.config {
        Some(path) => CompilerConfig::load(Path::new(path)),
        None if input == "-" => Ok(CompilerConfig::default()),
        None => {
            let dir = Path::new(input).parent().unwrap_or(Path::new("."));
            CompilerConfig::load_or_default(dir)
        }
    };
    loaded.map_err(|e| e.to_string())
}

fn write_output(output: Option<&str>, content: &str) -> Result<(), String> {
    match output {
        Some(path) => {
            let mut file = fs::File::create(path)
                .map_err(|e| format!("Failed to create output file '{}': {}", path, e))?;
            file.write_all(content.as_bytes())
                .map_err(|e| format!("Failed to write to output file '{}': {}", path, e))?;
            Ok(())
        }
        None => {
            print!("{}", content);
            Ok(())
        }
    }
}

/// Run every rule in order on one executor and report the globals
fn run_rules(compiled: &CompiledProgram, config: &CompilerConfig) -> Result<String, String> {
    let mut vm = TargetVm::new(config.vm.clone());
    let mut output = String::new();
    for rule in &compiled.rules {
        let outcome = vm
            .run(&rule.actions)
            .map_err(|e| format!("Rule '{}' failed: {}", rule.name, e))?;
        let stats = vm.stats();
        let status = match outcome {
            RunOutcome::Completed => "completed",
            RunOutcome::Aborted => "aborted",
        };
        output.push_str(&format!(
            "rule {} {} ({} actions, {} waits)\n",
            rule.name, status, stats.executed, stats.waits
        ));
    }
    for info in compiled.variables.iter().filter(|v| !v.recursive) {
        if compiled.global(&info.name) == Some(info.slot) {
            output.push_str(&format!("{} = {}\n", info.name, vm.value(info.slot)));
        }
    }
    Ok(output)
}

fn compile_program(input: &str, options: &Options, config: &CompilerConfig) -> Result<String, String> {
    let program: Program = toml::from_str(input).map_err(|e| format!("Invalid program: {}", e))?;
    let compilation = compile(&program, config).map_err(|e| format!("Generation failed: {}", e))?;

    for diagnostic in &compilation.diagnostics {
        eprintln!("{}", diagnostic);
    }
    let compiled = match compilation.output {
        Some(compiled) => compiled,
        None => return Err("Program has errors".to_string()),
    };

    let mut output = compiled.disassemble();
    if options.run {
        output.push('\n');
        output.push_str(&run_rules(&compiled, config)?);
    }
    Ok(output)
}

fn main() {
    let options = match parse_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(if options.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(io::stderr)
        .init();

    let input = match options.input.as_deref() {
        Some(input) => input,
        None => {
            eprintln!("Error: Missing input file");
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    let result = load_config(&options, input).and_then(|config| {
        let content = read_input(input)?;
        compile_program(&content, &options, &config)
    });
    let output = match result {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_output(options.output.as_deref(), &output) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
