use std::borrow::Cow;
use std::io::{self, BufRead, Write};

use anyhow::{Context, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::cli::Invocation;
use crate::config::Config;
use crate::filter::Filter;
use crate::locale::{Catalog, Locale};
use crate::render::Renderer;
use crate::storage::Storage;
use crate::store::{Persist, StoreError, TaskStore};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add", "toggle", "delete", "list", "stats", "export", "shell", "show", "help", "version",
    ]
}

fn shell_command_names() -> Vec<&'static str> {
    vec![
        "add", "toggle", "delete", "filter", "lang", "list", "stats", "help", "quit", "exit",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// What the terminal front end needs besides the store itself.
#[derive(Debug, Clone, Copy)]
pub struct View<'a> {
    pub cfg: &'a Config,
    pub renderer: &'a Renderer,
    pub catalog: &'a Catalog,
}

#[instrument(skip(store, view, inv))]
pub fn dispatch<S: Storage>(
    store: &mut TaskStore<S>,
    view: View<'_>,
    inv: Invocation,
) -> anyhow::Result<()> {
    debug!(
        command = %inv.command,
        args = ?inv.command_args,
        filter = %store.filter(),
        locale = %store.locale(),
        "dispatching command"
    );

    let mut out = io::stdout().lock();
    if inv.command == "shell" {
        let input = io::stdin().lock();
        return run_shell(store, view, input, &mut out);
    }
    execute(store, view, &inv, &mut out)
}

/// Runs one non-interactive command against the store.
pub fn execute<S: Storage, W: Write>(
    store: &mut TaskStore<S>,
    view: View<'_>,
    inv: &Invocation,
    out: &mut W,
) -> anyhow::Result<()> {
    let args = &inv.command_args;
    match inv.command.as_str() {
        "add" => cmd_add(store, view, &args.join(" "), out),
        "toggle" => cmd_toggle(store, view, args, out),
        "delete" => cmd_delete(store, view, args, out),
        "list" => cmd_list(store, view, out),
        "stats" => cmd_stats(store, view, out),
        "export" => cmd_export(store, out),
        "show" => cmd_show(view.cfg, out),
        "help" => cmd_help(out),
        "version" => {
            writeln!(out, "{}", env!("CARGO_PKG_VERSION"))?;
            Ok(())
        }
        "shell" => Err(anyhow!("shell cannot be nested")),
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[instrument(skip(store, view, out))]
fn cmd_add<S: Storage, W: Write>(
    store: &mut TaskStore<S>,
    view: View<'_>,
    text: &str,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command add");
    let persist = mutate(store, view, out, |store| Ok(store.add(text)))?;

    let strings = view.catalog.strings(store.locale());
    if matches!(persist, Persist::Skipped) {
        writeln!(out, "{}", strings.nothing_added)?;
    } else {
        writeln!(out, "{}", strings.format_added(store.tasks().len()))?;
    }
    Ok(())
}

#[instrument(skip(store, view, args, out))]
fn cmd_toggle<S: Storage, W: Write>(
    store: &mut TaskStore<S>,
    view: View<'_>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command toggle");
    let index = parse_task_number(args)?;
    let _ = mutate(store, view, out, |store| store.toggle(index))?;

    let task = &store.tasks()[index];
    let strings = view.catalog.strings(store.locale());
    writeln!(
        out,
        "{}",
        strings.format_toggled(index + 1, &task.text, task.completed)
    )?;
    Ok(())
}

#[instrument(skip(store, view, args, out))]
fn cmd_delete<S: Storage, W: Write>(
    store: &mut TaskStore<S>,
    view: View<'_>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command delete");
    let index = parse_task_number(args)?;
    let text = store
        .tasks()
        .get(index)
        .map(|t| t.text.clone())
        .unwrap_or_default();
    let _ = mutate(store, view, out, |store| store.delete(index))?;

    let strings = view.catalog.strings(store.locale());
    writeln!(out, "{}", strings.format_deleted(index + 1, &text))?;
    Ok(())
}

fn cmd_list<S: Storage, W: Write>(
    store: &TaskStore<S>,
    view: View<'_>,
    out: &mut W,
) -> anyhow::Result<()> {
    view.renderer
        .print_list(out, view.catalog.strings(store.locale()), store)
}

fn cmd_stats<S: Storage, W: Write>(
    store: &TaskStore<S>,
    view: View<'_>,
    out: &mut W,
) -> anyhow::Result<()> {
    view.renderer
        .print_stats(out, view.catalog.strings(store.locale()), store)
}

fn cmd_export<S: Storage, W: Write>(store: &TaskStore<S>, out: &mut W) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(store.tasks()).context("failed to serialize tasks")?;
    writeln!(out, "{json}")?;
    Ok(())
}

fn cmd_show<W: Write>(cfg: &Config, out: &mut W) -> anyhow::Result<()> {
    for file in &cfg.loaded_files {
        writeln!(out, "# {}", file.display())?;
    }
    for (key, value) in cfg.iter() {
        writeln!(out, "{key} = {value}")?;
    }
    Ok(())
}

fn cmd_help<W: Write>(out: &mut W) -> anyhow::Result<()> {
    writeln!(
        out,
        "usage: protask [--filter all|active|completed] [--lang en|ar] <command> [args]\n\
         \n\
         commands:\n\
         \x20 add <text>       add a task\n\
         \x20 toggle <n>       flip task n between active and completed\n\
         \x20 delete <n>       remove task n (later numbers shift down)\n\
         \x20 list             show tasks passing the filter\n\
         \x20 stats            show totals and progress\n\
         \x20 export           print all tasks as JSON\n\
         \x20 shell            interactive session\n\
         \x20 show             print effective configuration\n\
         \x20 version          print version"
    )?;
    Ok(())
}

fn shell_help<W: Write>(out: &mut W) -> anyhow::Result<()> {
    writeln!(
        out,
        "add <text> | toggle <n> | delete <n> | filter all|active|completed | \
         lang [en|ar] | list | stats | quit"
    )?;
    Ok(())
}

/// Reads one command per line until end of input or `quit`. Filter and
/// language live only as long as the session.
#[instrument(skip_all)]
pub fn run_shell<S: Storage, R: BufRead, W: Write>(
    store: &mut TaskStore<S>,
    view: View<'_>,
    mut input: R,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("starting shell session");
    cmd_list(store, view, out)?;

    let known = shell_command_names();
    let mut buf = Vec::new();
    loop {
        write!(out, "> ")?;
        out.flush()?;

        buf.clear();
        let read = input
            .read_until(b'\n', &mut buf)
            .context("failed reading shell input")?;
        if read == 0 {
            writeln!(out)?;
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        if matches!(line, Cow::Owned(_)) {
            warn!("shell input was not valid UTF-8; replaced bad bytes");
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map(|(w, r)| (w, r.trim()))
            .unwrap_or((line, ""));
        let Some(command) = expand_command_abbrev(word, &known) else {
            writeln!(out, "error: unknown or ambiguous command: {word}")?;
            continue;
        };
        debug!(command, rest, "shell command");

        let args: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
        let result = match command {
            "quit" | "exit" => break,
            "help" => shell_help(out),
            "list" => cmd_list(store, view, out),
            "stats" => cmd_stats(store, view, out),
            "add" => cmd_add(store, view, rest, out).and_then(|()| cmd_list(store, view, out)),
            "toggle" => {
                cmd_toggle(store, view, &args, out).and_then(|()| cmd_list(store, view, out))
            }
            "delete" => {
                cmd_delete(store, view, &args, out).and_then(|()| cmd_list(store, view, out))
            }
            "filter" => rest
                .parse::<Filter>()
                .map(|filter| store.set_filter(filter))
                .and_then(|()| cmd_list(store, view, out)),
            "lang" => {
                let changed = if rest.is_empty() {
                    store.toggle_locale();
                    Ok(())
                } else {
                    rest.parse::<Locale>().map(|locale| store.set_locale(locale))
                };
                changed.and_then(|()| cmd_list(store, view, out))
            }
            other => Err(anyhow!("unhandled shell command: {other}")),
        };

        if let Err(err) = result {
            writeln!(out, "error: {err:#}")?;
        }
    }

    info!("shell session ended");
    Ok(())
}

/// Applies one mutation, surfaces a failed write as a warning and prints the
/// celebration when it completes the last open task.
fn mutate<S, W, F>(
    store: &mut TaskStore<S>,
    view: View<'_>,
    out: &mut W,
    op: F,
) -> anyhow::Result<Persist>
where
    S: Storage,
    W: Write,
    F: FnOnce(&mut TaskStore<S>) -> Result<Persist, StoreError>,
{
    let was_done = store.is_all_completed();
    let persist = op(store).map_err(|err| match err {
        StoreError::OutOfRange { index, len } => {
            anyhow!("no task number {} (there are {len})", index + 1)
        }
    })?;

    if let Some(err) = persist.warning() {
        warn!(error = %err, "change kept in memory but not saved");
        eprintln!("warning: change not saved: {err}");
    }

    if !was_done && store.is_all_completed() {
        info!("all tasks completed");
        let locale = store.locale();
        view.renderer
            .print_celebration(out, view.catalog.strings(locale), locale.direction())?;
    }

    Ok(persist)
}

fn parse_task_number(args: &[String]) -> anyhow::Result<usize> {
    let [raw] = args else {
        return Err(anyhow!("expected exactly one task number"));
    };
    match raw.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(anyhow!("task number must be a positive integer, got: {raw}")),
    }
}
