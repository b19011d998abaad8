//! kesh CLI: run scripts, evaluate one-liners, or drop into a REPL.

use clap::Parser as ClapParser;
use kesh::diagnostics::Diagnostics;
use kesh::{Interp, KeshError, TokenKind, VERSION};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(ClapParser, Debug)]
#[command(name = "kesh")]
#[command(author = "Kipp")]
#[command(version = VERSION)]
#[command(about = "The kesh scripting language", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Script to run (legacy positional argument)
    input: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run a script file
    Run { input: PathBuf },

    /// Evaluate a one-off expression
    Eval {
        #[arg(short = 'e', long = "expr")]
        source: String,
    },

    /// Start an interactive session
    Repl,
}

const EXIT_FAILURE: i32 = 1;
const EXIT_SCRIPT_FAULT: i32 = 70;

fn main() {
    // Deep recursion in scripts rides the interpreter's call stack.
    let builder = std::thread::Builder::new()
        .name("kesh-main".into())
        .stack_size(8 * 1024 * 1024); // 8MB

    let handler = builder.spawn(real_main).unwrap();
    std::process::exit(handler.join().unwrap_or(EXIT_FAILURE));
}

fn real_main() -> i32 {
    let args = Args::parse();

    match args.command {
        Some(Commands::Run { input }) => run_file(&input),
        Some(Commands::Eval { source }) => run_source(&source, "<eval>", true),
        Some(Commands::Repl) => repl(),
        None => match args.input {
            Some(input) => run_file(&input),
            None => repl(),
        },
    }
}

fn run_file(input: &PathBuf) -> i32 {
    let source = match fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("kesh: couldn't read {}: {}", input.display(), e);
            return EXIT_FAILURE;
        }
    };
    let filename = input
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("input.kesh");
    run_source(&source, filename, false)
}

fn run_source(source: &str, filename: &str, echo: bool) -> i32 {
    let interp = Interp::new();
    let code = match interp.run(source) {
        Ok(value) => {
            if echo && !value.is_nil() {
                println!("{}", value);
            }
            0
        }
        Err(e) => {
            let diag = Diagnostics::new(source, filename);
            eprint!("{}", diag.render(&e));
            exit_code_for(&e)
        }
    };
    drain_task_faults(&interp);
    code
}

fn exit_code_for(error: &KeshError) -> i32 {
    match error {
        KeshError::Thrown { .. } => EXIT_SCRIPT_FAULT,
        _ => EXIT_FAILURE,
    }
}

fn drain_task_faults(interp: &Interp) {
    for fault in interp.task_faults() {
        eprintln!("kesh: warning: task fault: {}", fault.message);
    }
}

fn repl() -> i32 {
    println!("kesh v{} (ctrl-d to exit)", VERSION);

    let interp = Interp::new();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut buffer = String::new();

    loop {
        let prompt = if buffer.is_empty() { "> " } else { "... " };
        print!("{}", prompt);
        let _ = io::stdout().flush();

        match lines.next() {
            Some(Ok(line)) => {
                buffer.push_str(&line);
                buffer.push('\n');
            }
            Some(Err(e)) => {
                eprintln!("kesh: {}", e);
                return EXIT_FAILURE;
            }
            None => {
                println!();
                break;
            }
        }

        if needs_more(&buffer) {
            continue;
        }

        let chunk = std::mem::take(&mut buffer);
        if chunk.trim().is_empty() {
            continue;
        }

        match interp.run(&chunk) {
            Ok(value) => {
                if !value.is_nil() {
                    println!("{}", value);
                }
            }
            Err(e) => {
                let diag = Diagnostics::new(&chunk, "<repl>");
                eprint!("{}", diag.render(&e));
            }
        }
        drain_task_faults(&interp);
    }
    0
}

/// An unbalanced open bracket means the statement continues on the
/// next line. Lex errors fall through so the parser reports them.
fn needs_more(buffer: &str) -> bool {
    let tokens = match kesh::Lexer::new(buffer).tokenize() {
        Ok(tokens) => tokens,
        Err(_) => return false,
    };
    let mut depth: i64 = 0;
    for token in &tokens {
        match token.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => depth -= 1,
            _ => {}
        }
    }
    depth > 0
}
