use std::str::FromStr;

use chrono::NaiveDate;
use serde::{
  Deserialize,
  Serialize
};
use tracing::trace;

use crate::datetime::DayFrame;
use crate::error::{
  Error,
  Result
};
use crate::task::{
  Task,
  TaskStatus
};

/// Named, predefined view filters.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
  Today,
  Upcoming,
  Expired
}

impl Scope {
  pub fn as_str(self) -> &'static str {
    match self {
      | Self::Today => "today",
      | Self::Upcoming => "upcoming",
      | Self::Expired => "expired"
    }
  }

  /// Empty strings mean "no scope".
  pub fn parse_optional(
    raw: Option<&str>
  ) -> Result<Option<Self>> {
    match raw.map(str::trim) {
      | None | Some("") => Ok(None),
      | Some(value) => {
        value.parse().map(Some)
      }
    }
  }
}

impl FromStr for Scope {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "today" => Ok(Self::Today),
      | "upcoming" => Ok(Self::Upcoming),
      | "expired" => Ok(Self::Expired),
      | other => {
        Err(Error::validation(format!(
          "unknown scope: {other}"
        )))
      }
    }
  }
}

/// AND-combined view criteria. Every
/// field is optional.
#[derive(Debug, Clone, Default)]
pub struct Criteria {
  pub category:  Option<String>,
  pub completed: Option<bool>,
  pub status:    Option<TaskStatus>,
  pub scope:     Option<Scope>,
  pub search:    Option<String>,
  pub day:       Option<NaiveDate>
}

impl Criteria {
  pub fn is_empty(&self) -> bool {
    self.category.is_none()
      && self.completed.is_none()
      && self.status.is_none()
      && self.scope.is_none()
      && self
        .search
        .as_deref()
        .is_none_or(|q| q.trim().is_empty())
      && self.day.is_none()
  }

  pub fn matches(
    &self,
    task: &Task,
    frame: &DayFrame
  ) -> bool {
    if let Some(category) =
      self.category.as_deref()
      && !category_eq(
        &task.category,
        category
      )
    {
      return false;
    }

    if let Some(completed) =
      self.completed
      && task.completed != completed
    {
      return false;
    }

    if let Some(status) = self.status
      && task.status != status
    {
      return false;
    }

    if let Some(query) =
      self.search.as_deref()
      && !matches_search(task, query)
    {
      return false;
    }

    if let Some(scope) = self.scope
      && !matches_scope(
        task, scope, frame
      )
    {
      return false;
    }

    if let Some(day) = self.day {
      let on_day = task
        .due_date
        .is_some_and(|due| {
          frame.local_date(due) == day
        });
      if !on_day {
        return false;
      }
    }

    true
  }
}

/// Keeps the tasks matching `criteria`,
/// preserving input order.
#[tracing::instrument(skip_all, fields(input = tasks.len()))]
pub fn filter(
  tasks: Vec<Task>,
  criteria: &Criteria,
  frame: &DayFrame
) -> Vec<Task> {
  if criteria.is_empty() {
    return tasks;
  }

  let kept: Vec<Task> = tasks
    .into_iter()
    .filter(|task| {
      criteria.matches(task, frame)
    })
    .collect();
  trace!(
    kept = kept.len(),
    "filtered tasks"
  );
  kept
}

/// Category identity is
/// case-insensitive everywhere.
pub fn category_eq(
  a: &str,
  b: &str
) -> bool {
  a.trim().to_lowercase()
    == b.trim().to_lowercase()
}

pub fn matches_scope(
  task: &Task,
  scope: Scope,
  frame: &DayFrame
) -> bool {
  match scope {
    | Scope::Today => {
      task.due_date.is_some_and(|due| {
        frame.is_today(due)
      })
    }
    | Scope::Upcoming => {
      task.due_date.is_none_or(|due| {
        !frame.is_before_today(due)
      })
    }
    | Scope::Expired => {
      task.is_expired(frame)
    }
  }
}

fn matches_search(
  task: &Task,
  query: &str
) -> bool {
  let needle =
    query.trim().to_lowercase();
  if needle.is_empty() {
    return true;
  }
  format!(
    "{} {}",
    task.title, task.description
  )
  .to_lowercase()
  .contains(&needle)
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    Criteria,
    Scope,
    filter
  };
  use crate::datetime::DayFrame;
  use crate::task::{
    Task,
    TaskStatus
  };

  fn frame() -> DayFrame {
    let now = Utc
      .with_ymd_and_hms(
        2026, 4, 15, 14, 0, 0
      )
      .unwrap();
    DayFrame::new(now, chrono_tz::UTC)
  }

  fn task(title: &str) -> Task {
    Task::new(
      "u1",
      title.to_string(),
      frame().start_of_today
    )
  }

  #[test]
  fn empty_criteria_is_identity() {
    let tasks = vec![
      task("c"),
      task("a"),
      task("b"),
    ];
    let ids: Vec<_> = tasks
      .iter()
      .map(|t| t.id)
      .collect();

    let out = filter(
      tasks,
      &Criteria::default(),
      &frame()
    );
    let out_ids: Vec<_> =
      out.iter().map(|t| t.id).collect();
    assert_eq!(ids, out_ids);
  }

  #[test]
  fn search_spans_title_and_description()
  {
    let mut a = task("Quarterly");
    a.description =
      "Revenue REPORT".to_string();
    let b = task("groceries");

    let criteria = Criteria {
      search: Some(
        "report".to_string()
      ),
      ..Criteria::default()
    };
    let out =
      filter(vec![a, b], &criteria, &frame());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].title, "Quarterly");
  }

  #[test]
  fn category_match_ignores_case() {
    let mut work = task("w");
    work.category = "Work".to_string();
    let home = task("h");

    let criteria = Criteria {
      category: Some(
        "work".to_string()
      ),
      ..Criteria::default()
    };
    let out = filter(
      vec![work, home],
      &criteria,
      &frame()
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].title, "w");
  }

  #[test]
  fn today_is_calendar_day_not_rolling_window()
   {
    let f = frame();
    let mut late_tonight = task("late");
    late_tonight.due_date = Some(
      f.start_of_today
        + Duration::hours(23)
    );
    let mut early_tomorrow =
      task("tomorrow");
    early_tomorrow.due_date = Some(
      f.start_of_today
        + Duration::hours(25)
    );
    let mut last_night = task("last");
    last_night.due_date = Some(
      f.start_of_today
        - Duration::minutes(1)
    );

    let criteria = Criteria {
      scope: Some(Scope::Today),
      ..Criteria::default()
    };
    let out = filter(
      vec![
        late_tonight,
        early_tomorrow,
        last_night,
      ],
      &criteria,
      &f
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].title, "late");
  }

  #[test]
  fn upcoming_includes_completed_and_undated()
   {
    let f = frame();
    let undated = task("undated");
    let mut done_future =
      task("done-future");
    done_future.completed = true;
    done_future.due_date = Some(
      f.start_of_today
        + Duration::days(2)
    );
    let mut overdue = task("overdue");
    overdue.due_date = Some(
      f.start_of_today
        - Duration::days(2)
    );

    let criteria = Criteria {
      scope: Some(Scope::Upcoming),
      ..Criteria::default()
    };
    let out = filter(
      vec![undated, done_future, overdue],
      &criteria,
      &f
    );
    let titles: Vec<_> = out
      .iter()
      .map(|t| t.title.as_str())
      .collect();
    assert_eq!(
      titles,
      vec!["undated", "done-future"]
    );
  }

  #[test]
  fn expired_excludes_completed() {
    let f = frame();
    let mut open = task("open");
    open.due_date = Some(
      f.start_of_today
        - Duration::days(1)
    );
    let mut closed = open.clone();
    closed.title = "closed".to_string();
    closed.completed = true;

    let criteria = Criteria {
      scope: Some(Scope::Expired),
      ..Criteria::default()
    };
    let out = filter(
      vec![open, closed],
      &criteria,
      &f
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].title, "open");
  }

  #[test]
  fn status_completed_and_day_combine()
  {
    let f = frame();
    let day = NaiveDate::from_ymd_opt(
      2026, 4, 20
    )
    .unwrap();
    let mut hit = task("hit");
    hit.status = TaskStatus::Doing;
    hit.due_date = Some(
      Utc
        .with_ymd_and_hms(
          2026, 4, 20, 18, 0, 0
        )
        .unwrap()
    );
    let mut wrong_status = hit.clone();
    wrong_status.status =
      TaskStatus::Todo;
    let mut wrong_day = hit.clone();
    wrong_day.due_date = None;

    let criteria = Criteria {
      status: Some(TaskStatus::Doing),
      completed: Some(false),
      day: Some(day),
      ..Criteria::default()
    };
    let out = filter(
      vec![hit, wrong_status, wrong_day],
      &criteria,
      &f
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].title, "hit");
  }

  #[test]
  fn unknown_scope_is_rejected() {
    assert!(
      "someday"
        .parse::<Scope>()
        .is_err()
    );
    assert_eq!(
      Scope::parse_optional(Some(""))
        .unwrap(),
      None
    );
    assert_eq!(
      Scope::parse_optional(Some(
        "Upcoming"
      ))
      .unwrap(),
      Some(Scope::Upcoming)
    );
  }
}
