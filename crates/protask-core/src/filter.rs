use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use clap::ValueEnum;
use tracing::trace;

use crate::task::Task;

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  ValueEnum
)]
pub enum Filter {
  #[default]
  All,
  Active,
  Completed
}

impl Filter {
  pub const ALL: [Filter; 3] = [
    Filter::All,
    Filter::Active,
    Filter::Completed
  ];

  pub fn matches(
    self,
    task: &Task
  ) -> bool {
    let keep = match self {
      | Filter::All => true,
      | Filter::Active => {
        !task.completed
      }
      | Filter::Completed => {
        task.completed
      }
    };
    trace!(
      filter = %self,
      completed = task.completed,
      keep,
      "evaluated filter"
    );
    keep
  }

  pub fn as_str(self) -> &'static str {
    match self {
      | Filter::All => "all",
      | Filter::Active => "active",
      | Filter::Completed => {
        "completed"
      }
    }
  }
}

impl fmt::Display for Filter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Filter {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let wanted =
      s.trim().to_ascii_lowercase();
    Filter::ALL
      .into_iter()
      .find(|f| f.as_str() == wanted)
      .ok_or_else(|| {
        anyhow!(
          "unknown filter: {s} \
           (expected all, active or \
           completed)"
        )
      })
  }
}
