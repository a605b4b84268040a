use std::io::{self, IsTerminal};

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::error::{LispError, LispResult};
use crate::eval::Interpreter;
use crate::stream::{MemoryStream, StreamTable};
use crate::reader::Reader;

/// Run the REPL on stdin: line-edited when it is a terminal, form by form
/// otherwise.
pub fn run(interp: &mut Interpreter) -> anyhow::Result<()> {
    if io::stdin().is_terminal() {
        run_interactive(interp)
    } else {
        run_piped(interp);
        Ok(())
    }
}

/// Net parenthesis depth of a chunk of source, ignoring parentheses inside
/// strings and `;` comments.
pub fn paren_depth(src: &str) -> i32 {
    let mut depth = 0;
    let mut in_string = false;
    let mut in_comment = false;
    let mut escaped = false;
    for ch in src.chars() {
        if in_comment {
            in_comment = ch != '\n';
            continue;
        }
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            '"' => in_string = true,
            ';' => in_comment = true,
            _ => {}
        }
    }
    depth
}

/// Read, expand, evaluate and print every form in `src`. Each entry is the
/// printed value or the error of one form. A read error ends the batch.
pub fn eval_source(interp: &mut Interpreter, src: &str) -> Vec<LispResult<String>> {
    let mut stream = MemoryStream::new(src);
    let mut results = Vec::new();
    loop {
        let form = Reader::new(&mut interp.heap, &mut interp.symbols, &mut interp.readtable)
            .read(&mut stream);
        match form {
            Ok(Some(form)) => {
                results.push(interp.eval_toplevel(form).map(|val| interp.print(val)));
                interp.maybe_collect_garbage();
            }
            Ok(None) => break,
            Err(e) => {
                results.push(Err(e));
                break;
            }
        }
    }
    results
}

fn report(results: Vec<LispResult<String>>) {
    for result in results {
        match result {
            Ok(printed) => println!("{}", printed),
            Err(e) => eprintln!("{}", e),
        }
    }
}

/// Interactive REPL: accumulate lines until parens are balanced.
fn run_interactive(interp: &mut Interpreter) -> anyhow::Result<()> {
    println!("lips {}", env!("CARGO_PKG_VERSION"));
    println!("Ctrl-C clears the current input, Ctrl-D exits.");
    println!("A running form cannot be interrupted.\n");

    let mut rl = DefaultEditor::new()?;
    let prompt = interp.config().prompt.clone();
    let continuation = " ".repeat(prompt.len());
    let mut buf = String::new();
    let mut depth = 0;

    loop {
        let line = if depth == 0 { &prompt } else { &continuation };
        match rl.readline(line) {
            Ok(line) => {
                depth += paren_depth(&line);
                buf.push_str(&line);
                buf.push('\n');

                if depth > 0 {
                    continue;
                }
                depth = 0;
                let input = std::mem::take(&mut buf);
                let input = input.trim();
                if input.is_empty() {
                    continue;
                }
                rl.add_history_entry(input)?;
                report(eval_source(interp, input));
            }
            Err(ReadlineError::Interrupted) => {
                buf.clear();
                depth = 0;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Piped mode: read and evaluate one form at a time straight from stdin, so
/// a program can READ the input that follows it.
fn run_piped(interp: &mut Interpreter) {
    loop {
        match interp.read(StreamTable::stdin_id()) {
            Ok(Some(form)) => {
                match interp.eval_toplevel(form) {
                    Ok(val) => println!("{}", interp.print(val)),
                    Err(LispError::EndOfInput) => break,
                    Err(e) => eprintln!("{}", e),
                }
                interp.maybe_collect_garbage();
            }
            Ok(None) => break,
            Err(e) => {
                eprintln!("{}", e);
                break;
            }
        }
    }
}
