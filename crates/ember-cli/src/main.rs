//! `ember` binary: run a script file, or start a REPL when given no path.
//!
//! Exit codes follow sysexits: 64 for usage, 65 for a compile error, 70 for
//! a runtime error, 74 for an unreadable script.

use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use ember_session::Session;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    match args.len() {
        1 => repl(),
        2 => run_file(&args[1]),
        _ => {
            eprintln!("Usage: ember [script]");
            ExitCode::from(64)
        }
    }
}

fn run_file(path: &str) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Could not read \"{}\": {}", path, err);
            return ExitCode::from(74);
        }
    };

    let mut session = Session::new();
    match session.interpret(&source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err);
            if err.is_compile_error() {
                ExitCode::from(65)
            } else {
                ExitCode::from(70)
            }
        }
    }
}

/// Line-at-a-time REPL. One session lives for the whole loop, so globals and
/// functions defined on earlier lines stay usable.
fn repl() -> ExitCode {
    let mut session = Session::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    let mut line = String::new();
    loop {
        print!("> ");
        if stdout.flush().is_err() {
            return ExitCode::FAILURE;
        }

        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break, // end of input
            Ok(_) => {}
        }
        if line.trim().is_empty() {
            continue;
        }

        // Errors are reported and the loop keeps going; the session state
        // survives failed lines.
        if let Err(err) = session.interpret(&line) {
            eprintln!("{}", err);
        }
    }

    println!();
    ExitCode::SUCCESS
}
