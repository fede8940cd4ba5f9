use clap::Parser as ClapParser;
use std::{
    fs,
    io::{self, Write},
    process,
    rc::Rc,
};

use courier::{bootstrap, compile_source, run_source, Interpreter, Program};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input source files to execute in order
    #[arg(required = false, help = "The .cour files to execute")]
    files: Vec<String>,

    /// Module sources importable by key
    #[arg(
        short = 'm',
        long = "module",
        value_name = "KEY=PATH",
        value_parser = parse_module,
        help = "Register a module source, e.g. -m util=lib/util.cour"
    )]
    modules: Vec<(String, String)>,

    /// Start REPL after executing files (default if no files)
    #[arg(long, help = "Force REPL mode after file execution")]
    repl: bool,

    /// Print IR instead of executing
    #[arg(long, help = "Dump compiled IR for inputs")]
    dump_ir: bool,
}

fn parse_module(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, path)) if !key.is_empty() && !path.is_empty() => {
            Ok((key.to_string(), path.to_string()))
        }
        _ => Err(format!("expected KEY=PATH, got '{arg}'")),
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let vm = Rc::new(bootstrap());
    let mut interp = Interpreter::new(vm.clone());

    for (key, path) in &cli.modules {
        let source_code = read_source(path);
        match compile_source(&vm, &source_code) {
            Ok(program) => {
                if cli.dump_ir {
                    println!("== module {} ({}) ==", key, path);
                    dump_program(&program);
                }
                interp.add_module(key.clone(), program);
            }
            Err(err) => {
                eprintln!("Error compiling module {}: {}", path, err);
                process::exit(1);
            }
        }
    }

    for filename in &cli.files {
        let source_code = read_source(filename);

        if cli.dump_ir {
            match compile_source(&vm, &source_code) {
                Ok(program) => {
                    println!("== {} ==", filename);
                    dump_program(&program);
                }
                Err(err) => {
                    eprintln!("Error compiling {}: {}", filename, err);
                    process::exit(1);
                }
            }
        } else {
            match execute_source(&mut interp, &source_code) {
                Ok(text) => println!("{}", text),
                Err(err) => {
                    eprintln!("Error executing {}: {}", filename, err);
                    process::exit(1);
                }
            }
        }
    }

    if cli.dump_ir {
        return;
    }

    if cli.repl || cli.files.is_empty() {
        run_repl(&mut interp);
    }
}

fn read_source(path: &str) -> String {
    match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            eprintln!("Error reading file '{}': {}", path, err);
            process::exit(1);
        }
    }
}

fn run_repl(interp: &mut Interpreter) {
    println!("Courier REPL");
    println!("Type 'exit' to quit.");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut input_buffer = String::new();

    loop {
        print!("> ");
        if let Err(err) = stdout.flush() {
            eprintln!("Error flushing stdout: {}", err);
            break;
        }

        input_buffer.clear();
        match stdin.read_line(&mut input_buffer) {
            Ok(0) => break,
            Ok(_) => {
                let input = input_buffer.trim();
                if input == "exit" {
                    break;
                }
                if input.is_empty() {
                    continue;
                }

                match execute_source(interp, input) {
                    Ok(text) => println!("{}", text),
                    Err(err) => eprintln!("Error: {}", err),
                }
            }
            Err(err) => {
                eprintln!("Error reading input: {}", err);
                break;
            }
        }
    }
}

fn execute_source(interp: &mut Interpreter, source: &str) -> Result<String, courier::Error> {
    let value = run_source(interp, source)?;
    interp.describe(value)
}

fn dump_program(program: &Program) {
    println!("-- locals: {} --", program.locals);
    println!("{:#?}", program.body);
}
