use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use rustyline::{error::ReadlineError, Editor};
use serde_json::Value;
use structopt::StructOpt;

use tablerules::lower::{lower, Fragment};
use tablerules::registry::{read_table, table_to_json};
use tablerules::{
    parse_buffer, parse_statement, Bindings, Context, DirectoryConnector, Document, Rule,
};

#[derive(Debug, StructOpt)]
#[structopt(name = "tablerules", about = "Parse, list and run table rules")]
struct Opt {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[structopt(short, long, global = true)]
    verbose: bool,

    #[structopt(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Print the canonical document of a rule file as JSON.
    Parse {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
    },
    /// Print a canonical JSON document as statements.
    Unparse {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
    },
    /// Run a rule file (statements, or a JSON document if it ends in .json).
    Run {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
        /// JSON object mapping table names to files holding their records.
        #[structopt(long, parse(from_os_str))]
        bindings: Option<PathBuf>,
    },
    /// Read statements interactively.
    Repl,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn load_document(path: &Path) -> Result<Document> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    let document = if path.extension().map_or(false, |ext| ext == "json") {
        Document::from_json(&content)?
    } else {
        parse_buffer(&content)?
    };
    Ok(document)
}

/// Bindings files map names to record files, relative to the bindings file.
fn load_bindings(path: &Path) -> Result<Bindings> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let entries = match serde_json::from_str::<Value>(&content)? {
        Value::Object(entries) => entries,
        _ => bail!("{}: bindings must be a JSON object", path.display()),
    };

    let mut bindings = Bindings::new();
    for (name, file) in entries {
        let file = match file {
            Value::String(file) => base.join(file),
            _ => bail!("{}: binding `{}` must name a file", path.display(), name),
        };
        bindings.insert(name, read_table(&file)?);
    }
    Ok(bindings)
}

fn run(file: &Path, bindings: Option<&Path>) -> Result<()> {
    let document = load_document(file)?;
    let rule = Rule::from(&document);
    let bindings = match bindings {
        Some(path) => load_bindings(path)?,
        None => Bindings::new(),
    };
    let base = file.parent().unwrap_or_else(|| Path::new("."));
    let mut context = Context::new(DirectoryConnector::new(base));
    let output = context.execute_with(&rule, bindings)?;

    let commits = output
        .commits
        .iter()
        .map(|commit| {
            serde_json::json!({
                "table": commit.table,
                "records": table_to_json(&commit.records),
            })
        })
        .collect::<Vec<_>>();
    println!("{}", serde_json::to_string_pretty(&commits)?);
    Ok(())
}

fn handle_input(line: &str) -> Result<String> {
    let statement = parse_statement(line)?;
    let json = match lower(&statement) {
        Fragment::Meta(tree) => Value::from(tree),
        Fragment::Action(node) => Value::from(node),
    };
    Ok(serde_json::to_string(&json)?)
}

fn repl() -> Result<()> {
    let mut editor = Editor::<()>::new();
    loop {
        let readline = editor.readline("> ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                editor.add_history_entry(line);

                match handle_input(line) {
                    Ok(json) => {
                        println!("{}", json);
                    }
                    Err(e) => {
                        println!("Error: {}", e);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {}", err);
                break;
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let opt = Opt::from_args();
    init_logging(opt.verbose);

    match opt.command.unwrap_or(Command::Repl) {
        Command::Parse { file } => {
            let document = load_document(&file)?;
            println!("{}", document.to_json_pretty()?);
        }
        Command::Unparse { file } => {
            for line in load_document(&file)?.unparse()? {
                println!("{}", line);
            }
        }
        Command::Run { file, bindings } => run(&file, bindings.as_deref())?,
        Command::Repl => repl()?,
    }
    Ok(())
}
