//! Purpose: Hold top-level CLI command dispatch for `fixtab`.
//! Role: Translate parsed commands into table operations and JSON results.
//! Invariants: Read commands never open the table writable.
//! Invariants: Mutating commands close the table themselves so flush failures reach the exit code.
use super::*;

pub(super) fn dispatch_command(command: Command, options: OpenOptions) -> Result<RunOutcome, Error> {
    match command {
        Command::Info { target } => {
            let mut table = open_table(&target.table, options, true)?;
            emit_json(info_json(&mut table)?);
            Ok(RunOutcome::ok())
        }
        Command::Rows {
            target,
            tag,
            start,
            limit,
            reverse,
            skip_deleted,
        } => {
            let mut table = open_table(&target.table, options, true)?;
            if let Some(name) = tag.as_deref() {
                let tag = lookup_tag(&table, name)?;
                table.select_tag(Some(&tag))?;
            }
            let rows = walk_rows(&mut table, start, limit, reverse, skip_deleted)?;
            emit_json(rows_json(&rows)?);
            Ok(RunOutcome::ok())
        }
        Command::Seek {
            target,
            key,
            tag,
            numeric,
            all,
        } => {
            let mut table = open_table(&target.table, options, true)?;
            let tag = match tag.as_deref() {
                Some(name) => Some(lookup_tag(&table, name)?),
                None => table.default_tag(),
            };
            let number = if numeric { Some(parse_numeric_key(&key)?) } else { None };
            if let Some(tag) = tag.as_ref() {
                table.select_tag(Some(tag))?;
            }
            let result = match number {
                Some(value) => table.seek_numeric(value)?,
                None => table.seek(&key)?,
            };
            if !all {
                emit_json(seek_json(result, &table)?);
                return Ok(RunOutcome::ok());
            }

            let mut rows = Vec::new();
            let mut last = result;
            while last.is_found() {
                rows.push(table.current_row()?);
                last = match number {
                    Some(value) => table.seek_next_numeric(value)?,
                    None => table.seek_next(&key)?,
                };
            }
            emit_json(json!({
                "result": result.as_str(),
                "tag": tag.as_ref().map(|tag| tag.name()),
                "rows": to_json(&rows)?,
                "count": rows.len(),
            }));
            Ok(RunOutcome::ok())
        }
        Command::Where {
            target,
            expression,
            limit,
            count,
        } => {
            let mut table = open_table(&target.table, options, true)?;
            if count {
                let matched = table.count_by_expression(&expression)?;
                emit_json(json!({ "expression": expression, "count": matched }));
            } else {
                let options = ExprSearchOptions::default().with_max_results(limit);
                let result = table.search_by_expression(&expression, &options)?;
                emit_json(to_json(&result)?);
            }
            Ok(RunOutcome::ok())
        }
        Command::Grep {
            target,
            field,
            pattern,
            ignore_case,
            limit,
            no_index,
            index_field,
            count,
            exists,
        } => {
            let mut table = open_table(&target.table, options, true)?;
            let mut search = RegexSearchOptions::default()
                .with_case_insensitive(ignore_case)
                .with_max_results(limit)
                .with_use_index(!no_index);
            if let Some(index_field) = index_field {
                search = search.with_index_field(index_field);
            }
            if count {
                let matched = table.regex_count(&field, &pattern, &search)?;
                emit_json(json!({ "pattern": pattern, "count": matched }));
            } else if exists {
                let found = table.regex_exists(&field, &pattern, &search)?;
                emit_json(json!({ "pattern": pattern, "exists": found }));
            } else {
                let result = table.regex_search(&field, &pattern, &search)?;
                emit_json(to_json(&result)?);
            }
            Ok(RunOutcome::ok())
        }
        Command::Deleted(DeletedCommand::List { target }) => {
            let mut table = open_table(&target.table, options, true)?;
            let recnos = table.list_deleted()?;
            emit_json(json!({ "deleted": recnos, "count": recnos.len() }));
            Ok(RunOutcome::ok())
        }
        Command::Deleted(DeletedCommand::Count { target }) => {
            let mut table = open_table(&target.table, options, true)?;
            let deleted = table.count_deleted()?;
            let active = table.count_active()?;
            emit_json(json!({
                "records": table.record_count()?,
                "deleted": deleted,
                "active": active,
            }));
            Ok(RunOutcome::ok())
        }
        Command::Deleted(DeletedCommand::Recall { target }) => {
            let mut table = open_table(&target.table, options, false)?;
            let recalled = table.recall_all_deleted()?;
            table.close()?;
            emit_json(json!({ "recalled": recalled }));
            Ok(RunOutcome::ok())
        }
        Command::Delete { target, recnos } => {
            let mut table = open_table(&target.table, options, false)?;
            let changed = flag_rows(&mut table, &recnos, true)?;
            table.close()?;
            emit_json(json!({ "deleted": changed }));
            Ok(RunOutcome::ok())
        }
        Command::Recall { target, recnos } => {
            let mut table = open_table(&target.table, options, false)?;
            let changed = flag_rows(&mut table, &recnos, false)?;
            table.close()?;
            emit_json(json!({ "recalled": changed }));
            Ok(RunOutcome::ok())
        }
        Command::Pack { target } => {
            let mut table = open_table(&target.table, options, false)?;
            let removed = table.pack()?;
            let remaining = table.record_count()?;
            table.close()?;
            emit_json(json!({ "removed": removed, "records": remaining }));
            Ok(RunOutcome::ok())
        }
        Command::Completion { shell } => {
            let mut command = Cli::command();
            clap_complete::aot::generate(shell, &mut command, "fixtab", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
    }
}

fn info_json(table: &mut Table) -> Result<Value, Error> {
    let deleted = table.count_deleted()?;
    let header = table.header()?;
    let tags: Vec<Value> = table
        .list_tags()
        .iter()
        .map(|tag| {
            json!({
                "name": tag.name(),
                "column": tag.column(),
                "unique": tag.is_unique(),
                "filtered": tag.is_filtered(),
            })
        })
        .collect();
    Ok(json!({
        "path": table.path().map(|path| path.display().to_string()),
        "records": header.record_count,
        "deleted": deleted,
        "last_updated": header.last_updated.map(|date| date.to_string()),
        "codepage": {
            "id": header.codepage.vfp_id(),
            "name": header.codepage.name(),
            "ms_codepage": header.codepage.ms_codepage(),
            "supported": header.codepage.is_supported(),
        },
        "has_index": header.has_index,
        "has_memo": header.has_memo,
        "columns": to_json(&table.columns()?.iter().collect::<Vec<_>>())?,
        "tags": tags,
    }))
}

fn lookup_tag(table: &Table, name: &str) -> Result<fixtab::api::Tag, Error> {
    table.tag_by_name(name).ok_or_else(|| {
        let known = table.tag_names();
        let hint = if known.is_empty() {
            "This table has no indexes.".to_string()
        } else {
            format!("Available tags: {}.", known.join(", "))
        };
        Error::new(ErrorKind::NotFound)
            .with_message(format!("no tag named {name:?}"))
            .with_hint(hint)
    })
}

fn parse_numeric_key(key: &str) -> Result<f64, Error> {
    key.trim().parse::<f64>().map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("--numeric key {key:?} is not a number"))
            .with_source(err)
    })
}

fn walk_rows(
    table: &mut Table,
    start: Option<i64>,
    limit: usize,
    reverse: bool,
    skip_deleted: bool,
) -> Result<Vec<RowSnapshot>, Error> {
    match (start, reverse) {
        (Some(recno), _) => table.goto(recno)?,
        (None, false) => table.first()?,
        (None, true) => table.last()?,
    }

    let mut rows = Vec::new();
    while table.recno().is_some() {
        if limit > 0 && rows.len() >= limit {
            break;
        }
        if !(skip_deleted && table.is_deleted()) {
            rows.push(table.current_row()?);
        }
        if reverse {
            table.previous()?;
        } else {
            table.next()?;
        }
    }
    Ok(rows)
}

/// Checks every record number before touching any flag, so a bad one leaves the table unchanged.
fn flag_rows(table: &mut Table, recnos: &[i64], delete: bool) -> Result<Vec<i64>, Error> {
    let count = i64::from(table.record_count()?);
    if let Some(&bad) = recnos.iter().find(|&&recno| recno < 1 || recno > count) {
        return Err(Error::new(ErrorKind::InvalidArgument)
            .with_message(format!("record {bad} is out of range (table has {count} records)"))
            .with_hint("Record numbers start at 1; `fixtab info` shows the record count."));
    }
    for &recno in recnos {
        table.goto(recno)?;
        if delete {
            table.delete()?;
        } else {
            table.recall()?;
        }
    }
    Ok(recnos.to_vec())
}
