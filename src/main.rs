use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::process;

use sqleval::{evaluate, Error, Query, Result, Table};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        eprintln!(
            "Usage: {} <table-folder> <query-json-file> <output-file>",
            args[0]
        );
        process::exit(1);
    }

    if let Err(e) = run(&args[1], &args[2], &args[3]) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(table_folder: &str, query_file: &str, output_file: &str) -> Result<()> {
    let query_json = fs::read_to_string(query_file)?;
    let query = Query::from_json(&query_json)?;

    // Evaluation errors, including a table file missing from the folder, are
    // the query's result and go into the output file. I/O failures and
    // malformed documents abort to stderr instead.
    match load_tables(&query, table_folder).and_then(|tables| evaluate(&query, &tables)) {
        Ok(result) => fs::write(output_file, result.to_json())?,
        Err(e) if e.is_evaluation_error() => fs::write(output_file, format!("{e}\n"))?,
        Err(e) => return Err(e),
    }
    Ok(())
}

/// Load every table the FROM list names, from `<folder>/<source>.table.json`.
fn load_tables(query: &Query, table_folder: &str) -> Result<HashMap<String, Table>> {
    let mut tables = HashMap::new();
    for table_ref in &query.from {
        let name = &table_ref.source;
        if tables.contains_key(name) {
            continue;
        }
        let path = Path::new(table_folder).join(format!("{name}.table.json"));
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::TableNotFound(name.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        tables.insert(name.clone(), Table::from_json(&json)?);
    }
    Ok(tables)
}
