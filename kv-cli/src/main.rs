//! A small interactive shell over the `kv` engine: open a database
//! directory and issue string/hash/set/list commands line by line, with
//! `begin`/`commit`/`rollback` for ad-hoc transactions. Grounded on the
//! shape of a Redis-style line REPL rather than the old networked client
//! this crate used to ship — `kv` is an embedded library, so the CLI talks
//! to it in-process instead of over a wire protocol.

mod commands;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use kv::{Database, Options};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

#[derive(Debug, Parser)]
#[command(author, version, about = "Interactive shell for the kv embeddable storage engine")]
struct Args {
    /// Directory the database lives in (created if it doesn't exist).
    #[arg(short = 'd', long = "dir", default_value = "kvdata")]
    dir_path: PathBuf,

    #[arg(short = 'l', long = "log-level", default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level)?;

    let mut options = Options::default();
    options.dir_path = args.dir_path.clone();
    let db = Database::open(options)?;

    eprintln!("kv-cli: opened {}", args.dir_path.display());
    eprintln!("type 'help' for a list of commands, 'exit' to quit");

    let result = run_repl(db.clone());

    db.close()?;
    result
}

fn run_repl(db: Arc<Database>) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    let mut session = commands::Session::new(db);

    loop {
        let prompt = if session.in_transaction() { "kv(txn)> " } else { "kv> " };
        match editor.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
                    break;
                }
                match session.dispatch(line) {
                    Ok(output) => {
                        if !output.is_empty() {
                            println!("{}", output);
                        }
                    }
                    Err(e) => eprintln!("(error) {}", e),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline error: {}", e);
                break;
            }
        }
    }
    Ok(())
}
