use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::filter::Filter;
use crate::locale::{Direction, Strings};
use crate::storage::Storage;
use crate::store::{Stats, TaskStore};

const PROGRESS_CELLS: usize = 20;
const RLM: char = '\u{200F}';

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    /// Title, filter bar, visible tasks, stats and progress.
    #[tracing::instrument(skip_all)]
    pub fn print_list<W: Write, S: Storage>(
        &self,
        out: &mut W,
        strings: &Strings,
        store: &TaskStore<S>,
    ) -> anyhow::Result<()> {
        let dir = store.locale().direction();

        writeln!(out, "{}", self.line(dir, &self.paint(&strings.title, "1")))?;
        writeln!(out, "{}", self.line(dir, &self.filter_bar(strings, store.filter())))?;
        writeln!(out)?;

        let mut rows = Vec::new();
        for (index, task) in store.visible_tasks() {
            let number = self.paint(&(index + 1).to_string(), "33");
            let mark = if task.completed { "[x]" } else { "[ ]" };
            let text = if task.completed {
                self.paint(&task.text, "9;2")
            } else {
                task.text.clone()
            };
            rows.push(vec![number, mark.to_string(), text]);
        }

        if rows.is_empty() {
            writeln!(out, "{}", self.line(dir, &strings.empty))?;
        } else {
            for row in layout_rows(rows) {
                writeln!(out, "{}", self.line(dir, &row))?;
            }
        }

        writeln!(out)?;
        self.print_stats(out, strings, store)
    }

    pub fn print_stats<W: Write, S: Storage>(
        &self,
        out: &mut W,
        strings: &Strings,
        store: &TaskStore<S>,
    ) -> anyhow::Result<()> {
        let dir = store.locale().direction();
        let stats: Stats = store.stats();
        writeln!(out, "{}", self.line(dir, &strings.format_stats(stats)))?;
        writeln!(
            out,
            "{}",
            self.line(
                dir,
                &format!(
                    "{} {}",
                    strings.progress,
                    progress_bar(store.completion_ratio())
                )
            )
        )?;
        Ok(())
    }

    pub fn print_celebration<W: Write>(
        &self,
        out: &mut W,
        strings: &Strings,
        direction: Direction,
    ) -> anyhow::Result<()> {
        let title = format!("*** {} ***", strings.celebration_title);
        writeln!(out)?;
        writeln!(out, "{}", self.line(direction, &self.paint(&title, "1;32")))?;
        writeln!(out, "{}", self.line(direction, &strings.celebration_subtext))?;
        Ok(())
    }

    fn filter_bar(&self, strings: &Strings, active: Filter) -> String {
        Filter::ALL
            .iter()
            .map(|&filter| {
                let label = strings.filter_label(filter);
                if filter == active {
                    self.paint(&format!("[{label}]"), "7")
                } else {
                    format!(" {label} ")
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn line(&self, direction: Direction, text: &str) -> String {
        match direction {
            Direction::Ltr => text.to_string(),
            Direction::Rtl => format!("{RLM}{text}"),
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

/// Pads every column but the last to its widest visible cell.
fn layout_rows(rows: Vec<Vec<String>>) -> Vec<String> {
    let column_count = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0usize; column_count];

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    rows.into_iter()
        .map(|row| {
            let last = row.len().saturating_sub(1);
            let mut line = String::new();
            for (idx, cell) in row.iter().enumerate() {
                line.push_str(cell);
                if idx < last {
                    let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
                    let padding = widths[idx].saturating_sub(visible_width);
                    line.push_str(&" ".repeat(padding + 1));
                }
            }
            line
        })
        .collect()
}

fn progress_bar(ratio: f64) -> String {
    let ratio = ratio.clamp(0.0, 1.0);
    let filled = (ratio * PROGRESS_CELLS as f64).round() as usize;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(PROGRESS_CELLS - filled),
        (ratio * 100.0).round() as u32
    )
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::{Renderer, layout_rows, progress_bar, strip_ansi};
    use crate::config::Config;
    use crate::filter::Filter;
    use crate::locale::{Catalog, Locale};
    use crate::storage::MemoryStorage;
    use crate::store::TaskStore;

    fn plain_renderer() -> Renderer {
        let mut cfg = Config::defaults();
        cfg.apply_overrides(vec![("color".to_string(), "off".to_string())]);
        Renderer::new(&cfg).expect("renderer")
    }

    fn render(store: &TaskStore<MemoryStorage>) -> String {
        let catalog = Catalog::builtin().expect("catalog");
        let mut out = Vec::new();
        plain_renderer()
            .print_list(&mut out, catalog.strings(store.locale()), store)
            .expect("render");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn rejects_unknown_color_setting() {
        let mut cfg = Config::defaults();
        cfg.apply_overrides(vec![("color".to_string(), "sometimes".to_string())]);
        assert!(Renderer::new(&cfg).is_err());
    }

    #[test]
    fn list_shows_original_numbers_under_filter() {
        let mut store = TaskStore::load(MemoryStorage::new());
        for text in ["write report", "call mom", "pay rent"] {
            let _ = store.add(text);
        }
        let _ = store.toggle(1).expect("toggle");
        store.set_filter(Filter::Active);

        let text = render(&store);
        assert!(text.contains("ProTask Manager"));
        assert!(text.contains("[Active]"));
        assert!(text.contains("1 [ ] write report"));
        assert!(text.contains("3 [ ] pay rent"));
        assert!(!text.contains("call mom"));
        assert!(text.contains("Total: 3 | Active: 2 | Completed: 1"));
        assert!(text.contains("[#######-------------]  33%"));
    }

    #[test]
    fn arabic_lines_carry_rtl_mark() {
        let mut store = TaskStore::load(MemoryStorage::new());
        store.set_locale(Locale::Arabic);

        let text = render(&store);
        for line in text.lines().filter(|l| !l.is_empty()) {
            assert!(line.starts_with('\u{200F}'), "line {line:?} lacks RLM");
        }
        assert!(text.contains("لا توجد مهام لعرضها."));
        assert!(text.contains("الإجمالي: 0 | النشطة: 0 | المكتملة: 0"));
    }

    #[test]
    fn celebration_uses_locale_strings() {
        let catalog = Catalog::builtin().expect("catalog");
        let mut out = Vec::new();
        plain_renderer()
            .print_celebration(
                &mut out,
                catalog.strings(Locale::English),
                Locale::English.direction(),
            )
            .expect("render");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("*** Congratulations! ***"));
        assert!(text.contains("You've completed all tasks!"));
    }

    #[test]
    fn rows_pad_by_display_width() {
        let rows = layout_rows(vec![
            vec!["9".to_string(), "[ ]".to_string(), "a".to_string()],
            vec!["10".to_string(), "[x]".to_string(), "b".to_string()],
        ]);
        assert_eq!(rows, ["9  [ ] a", "10 [x] b"]);
    }

    #[test]
    fn progress_bar_bounds() {
        assert_eq!(progress_bar(0.0), "[--------------------]   0%");
        assert_eq!(progress_bar(1.0), "[####################] 100%");
        assert_eq!(strip_ansi("\x1b[33m7\x1b[0m"), "7");
    }
}
