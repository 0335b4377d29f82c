//! Purpose: `fixtab` CLI entry point: argument parsing, logging bootstrap, output envelopes.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Command results are JSON on stdout, pretty-printed only on a TTY.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Read-only commands open tables read-only; mutations close explicitly to surface flush errors.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use clap::{Args, CommandFactory, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use fixtab::api::{
    Error, ErrorKind, ExprSearchOptions, OpenOptions, RegexSearchOptions, RowSnapshot, SeekResult,
    Table, to_exit_code,
};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `fixtab --help`, or `fixtab <command> --help`."));
            }
        },
    };

    let options = OpenOptions::new().with_verify_record_count(!cli.no_verify);
    command_dispatch::dispatch_command(cli.command, options).map_err(add_not_found_hint)
}

fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let replacement = arg.to_str().and_then(|value| match value {
                "---help" => Some("--help"),
                "---version" => Some("--version"),
                _ => None,
            });
            replacement.map(OsString::from).unwrap_or(arg)
        })
        .collect()
}

fn add_not_found_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::NotFound || err.hint().is_some() {
        return err;
    }
    match err.path() {
        Some(_) => err.with_hint("Check the table path; fixtab reads JSON table fixtures."),
        None => err.with_hint("Run `fixtab info <table>` to list the table's fields and tags."),
    }
}

#[derive(Parser)]
#[command(
    name = "fixtab",
    version,
    about = "Typed cursor, seek, deletion, and search access to fixed-width tables",
    long_about = None,
    after_help = r#"EXAMPLES
  $ fixtab info people.json
  $ fixtab rows people.json --tag NAME_IDX --limit 10
  $ fixtab seek people.json Smith --all
  $ fixtab where people.json "AGE >= 21 .AND. .NOT. DELETED()"
  $ fixtab grep people.json NAME '^Smi'
  $ fixtab delete people.json 3 && fixtab pack people.json

Set RUST_LOG=debug to see seek and search decisions on stderr."#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Open tables even when the header record count disagrees with the rows present"
    )]
    no_verify: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct TableArg {
    #[arg(help = "Table fixture path", value_hint = ValueHint::FilePath)]
    table: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Show header, columns, tags, and deletion counts")]
    Info {
        #[command(flatten)]
        target: TableArg,
    },
    #[command(about = "List rows in physical or index order")]
    Rows {
        #[command(flatten)]
        target: TableArg,
        #[arg(long, help = "Walk in this index's order instead of physical order")]
        tag: Option<String>,
        #[arg(long, help = "Start at this 1-based record number")]
        start: Option<i64>,
        #[arg(long, default_value_t = 0, help = "Maximum rows to print (0 = all)")]
        limit: usize,
        #[arg(long, help = "Walk from the last row backwards")]
        reverse: bool,
        #[arg(long, help = "Leave out rows flagged for deletion")]
        skip_deleted: bool,
    },
    #[command(about = "Seek a key through an index")]
    Seek {
        #[command(flatten)]
        target: TableArg,
        #[arg(help = "Key to look for; character keys match by prefix")]
        key: String,
        #[arg(long, help = "Index to seek through (default: the first tag)")]
        tag: Option<String>,
        #[arg(long, help = "Treat the key as a number")]
        numeric: bool,
        #[arg(long, help = "Return every row whose key matches, not just the first")]
        all: bool,
    },
    #[command(about = "Search rows with an xBase filter expression")]
    Where {
        #[command(flatten)]
        target: TableArg,
        #[arg(help = "Logical expression, e.g. \"AGE > 30 .AND. CITY = 'Paris'\"")]
        expression: String,
        #[arg(long, default_value_t = 0, help = "Stop after this many matches (0 = all)")]
        limit: usize,
        #[arg(long, help = "Print only the number of matches")]
        count: bool,
    },
    #[command(about = "Search a text field with a regular expression")]
    Grep {
        #[command(flatten)]
        target: TableArg,
        #[arg(help = "Character, varchar, or memo field")]
        field: String,
        #[arg(help = "Regular expression")]
        pattern: String,
        #[arg(short = 'i', long, help = "Match case-insensitively")]
        ignore_case: bool,
        #[arg(long, default_value_t = 0, help = "Stop after this many matches (0 = all)")]
        limit: usize,
        #[arg(long, help = "Always scan the whole table")]
        no_index: bool,
        #[arg(long, help = "Field name used to look for an index")]
        index_field: Option<String>,
        #[arg(long, conflicts_with = "exists", help = "Print only the number of matches")]
        count: bool,
        #[arg(long, help = "Print only whether anything matches")]
        exists: bool,
    },
    #[command(subcommand, about = "Inspect or recall rows flagged for deletion")]
    Deleted(DeletedCommand),
    #[command(about = "Flag rows for deletion")]
    Delete {
        #[command(flatten)]
        target: TableArg,
        #[arg(required = true, help = "1-based record numbers")]
        recnos: Vec<i64>,
    },
    #[command(about = "Clear deletion flags on rows")]
    Recall {
        #[command(flatten)]
        target: TableArg,
        #[arg(required = true, help = "1-based record numbers")]
        recnos: Vec<i64>,
    },
    #[command(about = "Remove flagged rows and rebuild indexes")]
    Pack {
        #[command(flatten)]
        target: TableArg,
    },
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        after_help = r#"EXAMPLES
  $ fixtab completion bash > ~/.local/share/bash-completion/completions/fixtab
  $ fixtab completion zsh > ~/.zfunc/_fixtab"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum DeletedCommand {
    #[command(about = "List record numbers flagged for deletion")]
    List {
        #[command(flatten)]
        target: TableArg,
    },
    #[command(about = "Count flagged and active rows")]
    Count {
        #[command(flatten)]
        target: TableArg,
    },
    #[command(about = "Clear every deletion flag")]
    Recall {
        #[command(flatten)]
        target: TableArg,
    },
}

fn open_table(path: &Path, options: OpenOptions, read_only: bool) -> Result<Table, Error> {
    let mut table = Table::with_options(path, options.with_read_only(read_only));
    table.open()?;
    Ok(table)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, Error> {
    serde_json::to_value(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode output")
            .with_source(err)
    })
}

fn seek_json(result: SeekResult, table: &Table) -> Result<Value, Error> {
    let row = if result.is_positioned() {
        Some(table.current_row()?)
    } else {
        None
    };
    Ok(json!({
        "result": result.as_str(),
        "found": result.is_found(),
        "recno": table.recno(),
        "row": to_json(&row)?,
    }))
}

fn rows_json(rows: &[RowSnapshot]) -> Result<Value, Error> {
    Ok(json!({ "rows": to_json(&rows)?, "count": rows.len() }))
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error",
        ErrorKind::Usage => "usage error",
        ErrorKind::NotOpen => "table not open",
        ErrorKind::AlreadyOpen => "table already open",
        ErrorKind::NotPositioned => "cursor is not on a row",
        ErrorKind::InvalidArgument => "invalid argument",
        ErrorKind::NotFound => "not found",
        ErrorKind::AlreadyExists => "already exists",
        ErrorKind::Busy => "table is locked",
        ErrorKind::Conversion => "conversion failed",
        ErrorKind::Parse => "parse error",
        ErrorKind::Evaluation => "evaluation failed",
        ErrorKind::Consistency => "table is inconsistent",
        ErrorKind::Io => "i/o error",
    }
    .to_string()
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(recno) = err.recno() {
        inner.insert("recno".to_string(), json!(recno));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(recno) = err.recno() {
        lines.push(format!("recno: {recno}"));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
