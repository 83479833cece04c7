//! LemonDB command-line driver
//!
//! Usage:
//!   lemondb [script.lql] --load t1.tbl --load t2.tbl --workers 4
//!
//! Reads statements line by line from the script file or stdin.
//! Management statements (LOAD, DUMP, DROP, TRUNCATE, LIST, QUIT) are
//! handled here; everything else is parsed as a query and executed by
//! the engine.

use clap::Parser;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use lemondb::table::load_table_from_path;
use lemondb::{Database, EngineConfig};

#[derive(Parser, Debug)]
#[command(name = "lemondb")]
#[command(about = "In-memory relational table engine with parallel query evaluation")]
#[command(version)]
struct Args {
    /// Query script to execute; reads stdin when omitted
    script: Option<PathBuf>,

    /// Table dump files to load before executing statements
    #[arg(short, long)]
    load: Vec<PathBuf>,

    /// Worker thread count (default: WORKER_COUNT env or detected parallelism)
    #[arg(short, long)]
    workers: Option<usize>,
}

fn main() {
    env_logger::init();

    let args = Args::parse();
    let config = match args.workers {
        Some(n) => EngineConfig::with_workers(n),
        None => EngineConfig::from_env(),
    };

    let db = Database::global();
    db.start(config);

    for path in &args.load {
        match load_table_from_path(path).and_then(|table| db.register(table)) {
            Ok(cell) => {
                let table = cell.read();
                log::info!("loaded \"{}\" ({} rows)", table.name(), table.len());
            }
            Err(err) => {
                eprintln!("ERROR loading {}: {}", path.display(), err);
                std::process::exit(1);
            }
        }
    }

    let reader: Box<dyn BufRead> = match &args.script {
        Some(path) => match File::open(path) {
            Ok(file) => Box::new(BufReader::new(file)),
            Err(err) => {
                eprintln!("ERROR opening {}: {}", path.display(), err);
                std::process::exit(1);
            }
        },
        None => Box::new(BufReader::new(io::stdin())),
    };

    for line in reader.lines() {
        match line {
            Ok(line) => {
                if !run_statement(db, &line) {
                    break;
                }
            }
            Err(err) => {
                eprintln!("ERROR reading input: {}", err);
                break;
            }
        }
    }

    db.stop();
}

/// Execute one statement; returns false on QUIT
fn run_statement(db: &Database, line: &str) -> bool {
    let statement = line.trim();
    if statement.is_empty() || statement.starts_with('#') {
        return true;
    }

    let mut words = statement.split_whitespace();
    let head = words.next().unwrap_or_default().to_ascii_uppercase();
    let arg = |word: Option<&str>| word.map(|w| w.trim_end_matches(';').to_string());

    match head.as_str() {
        "QUIT" | "EXIT" => return false,
        "LIST" => {
            for name in db.table_names() {
                println!("{}", name);
            }
        }
        "LOAD" => match arg(words.next()) {
            Some(path) => {
                match load_table_from_path(&path).and_then(|table| db.register(table)) {
                    Ok(cell) => {
                        let table = cell.read();
                        println!("loaded \"{}\" ({} rows)", table.name(), table.len());
                    }
                    Err(err) => eprintln!("ERROR: {}", err),
                }
            }
            None => eprintln!("ERROR: usage: LOAD <file>"),
        },
        "DUMP" => match arg(words.next()) {
            Some(name) => match db.get(&name) {
                Ok(cell) => {
                    let table = cell.read();
                    match arg(words.next()) {
                        Some(path) => {
                            if let Err(err) = fs::write(&path, table.to_string()) {
                                eprintln!("ERROR: {}", err);
                            }
                        }
                        None => print!("{}", table),
                    }
                }
                Err(err) => eprintln!("ERROR: {}", err),
            },
            None => eprintln!("ERROR: usage: DUMP <table> [file]"),
        },
        "DROP" => match arg(words.next()) {
            Some(name) => match db.drop_table(&name) {
                Ok(()) => println!("OK"),
                Err(err) => eprintln!("ERROR: {}", err),
            },
            None => eprintln!("ERROR: usage: DROP <table>"),
        },
        "TRUNCATE" => match arg(words.next()) {
            Some(name) => match db.truncate(&name) {
                Ok(count) => println!("{}", count),
                Err(err) => eprintln!("ERROR: {}", err),
            },
            None => eprintln!("ERROR: usage: TRUNCATE <table>"),
        },
        _ => match lemondb::query::parse_query(statement) {
            Ok(query) => println!("{}", db.run(query)),
            Err(err) => eprintln!("ERROR: {}", err),
        },
    }
    true
}
