//! Display languages and their translation strings.
//!
//! The catalog ships embedded as TOML. A user file may replace individual
//! strings per language; it is merged key by key over the built-in table.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use clap::ValueEnum;
use serde::Deserialize;
use tracing::{debug, info};

use crate::filter::Filter;
use crate::store::Stats;

const BUILTIN_CATALOG: &str = include_str!("locales.toml");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Locale {
    #[default]
    #[value(name = "en", alias = "english")]
    English,
    #[value(name = "ar", alias = "arabic")]
    Arabic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ltr,
    Rtl,
}

impl Locale {
    pub fn tag(self) -> &'static str {
        match self {
            Locale::English => "en",
            Locale::Arabic => "ar",
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            Locale::English => Direction::Ltr,
            Locale::Arabic => Direction::Rtl,
        }
    }

    /// The other language; mirrors the single language button of the page.
    pub fn toggled(self) -> Self {
        match self {
            Locale::English => Locale::Arabic,
            Locale::Arabic => Locale::English,
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Locale {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Locale::English),
            "ar" | "arabic" => Ok(Locale::Arabic),
            other => Err(anyhow!("unknown language: {other} (expected en or ar)")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Strings {
    pub title: String,
    pub add_placeholder: String,
    pub add_button: String,
    pub all: String,
    pub active: String,
    pub completed: String,
    pub stats: String,
    pub lang_button: String,
    pub celebration_title: String,
    pub celebration_subtext: String,
    pub empty: String,
    pub progress: String,
    pub added: String,
    pub nothing_added: String,
    pub now_completed: String,
    pub now_active: String,
    pub deleted: String,
}

impl Strings {
    pub fn format_stats(&self, stats: Stats) -> String {
        fill_slots(
            &self.stats,
            &[
                &stats.total.to_string(),
                &stats.active.to_string(),
                &stats.completed.to_string(),
            ],
        )
    }

    pub fn format_added(&self, number: usize) -> String {
        fill_slots(&self.added, &[&number.to_string()])
    }

    pub fn format_toggled(&self, number: usize, text: &str, completed: bool) -> String {
        let template = if completed {
            &self.now_completed
        } else {
            &self.now_active
        };
        fill_slots(template, &[&number.to_string(), text])
    }

    pub fn format_deleted(&self, number: usize, text: &str) -> String {
        fill_slots(&self.deleted, &[&number.to_string(), text])
    }

    pub fn filter_label(&self, filter: Filter) -> &str {
        match filter {
            Filter::All => &self.all,
            Filter::Active => &self.active,
            Filter::Completed => &self.completed,
        }
    }
}

/// Replaces `{n}` with `values[n]` in one pass, so braces inside a value are
/// left alone. Unknown slots stay as written.
fn fill_slots(template: &str, values: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let slot = after.find('}').and_then(|end| {
            let n: usize = after[..end].parse().ok()?;
            values.get(n).map(|value| (value, end))
        });
        match slot {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    en: Strings,
    ar: Strings,
}

impl Catalog {
    pub fn builtin() -> anyhow::Result<Self> {
        toml::from_str(BUILTIN_CATALOG).context("built-in translation catalog is invalid")
    }

    /// Built-in table with the strings from `path` laid over it.
    #[tracing::instrument]
    pub fn with_overrides(path: &Path) -> anyhow::Result<Self> {
        let mut base: toml::Table =
            toml::from_str(BUILTIN_CATALOG).context("built-in translation catalog is invalid")?;

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let overrides: toml::Table = toml::from_str(&raw)
            .with_context(|| format!("failed parsing {}", path.display()))?;

        for (lang, section) in overrides {
            let toml::Value::Table(section) = section else {
                return Err(anyhow!(
                    "{}: [{lang}] must be a table of strings",
                    path.display()
                ));
            };
            let Some(toml::Value::Table(target)) = base.get_mut(&lang) else {
                return Err(anyhow!("{}: unknown language [{lang}]", path.display()));
            };
            for (key, value) in section {
                debug!(lang = %lang, key = %key, "overriding translation");
                target.insert(key, value);
            }
        }

        let catalog: Catalog = toml::Value::Table(base)
            .try_into()
            .with_context(|| format!("invalid translations in {}", path.display()))?;
        info!(file = %path.display(), "loaded translation overrides");
        Ok(catalog)
    }

    pub fn strings(&self, locale: Locale) -> &Strings {
        match locale {
            Locale::English => &self.en,
            Locale::Arabic => &self.ar,
        }
    }
}
