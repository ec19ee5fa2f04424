use std::fmt::Debug;

use chrono::{
  DateTime,
  Datelike,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveTime,
  TimeZone,
  Utc
};
use chrono_tz::Tz;

use crate::error::{
  Error,
  Result
};

pub const TIMEZONE_ENV_VAR: &str =
  "DOCKET_TIMEZONE";
pub const MIN_DUE_YEAR: i32 = 1000;
pub const MAX_DUE_YEAR: i32 = 9999;

/// Source of "now" for every service
/// operation.
pub trait Clock:
  Debug + Send + Sync
{
  fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> {
    self.0
  }
}

/// Resolves the zone used for "local"
/// calendar days. The environment wins
/// over the configured value; UTC is the
/// fallback.
pub fn resolve_timezone(
  configured: Option<&str>
) -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return tz;
  }

  if let Some(raw) = configured
    && let Some(tz) =
      parse_timezone(raw, "config")
  {
    return tz;
  }

  chrono_tz::UTC
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// The local calendar context a view is
/// computed against.
#[derive(Debug, Clone, Copy)]
pub struct DayFrame {
  pub tz:             Tz,
  pub today:          NaiveDate,
  pub start_of_today: DateTime<Utc>
}

impl DayFrame {
  pub fn new(
    now: DateTime<Utc>,
    tz: Tz
  ) -> Self {
    let today =
      now.with_timezone(&tz).date_naive();
    Self {
      tz,
      today,
      start_of_today: local_midnight(
        today, tz
      )
    }
  }

  #[must_use]
  pub fn local_date(
    &self,
    dt: DateTime<Utc>
  ) -> NaiveDate {
    dt.with_timezone(&self.tz)
      .date_naive()
  }

  pub fn is_today(
    &self,
    dt: DateTime<Utc>
  ) -> bool {
    self.local_date(dt) == self.today
  }

  pub fn is_before_today(
    &self,
    dt: DateTime<Utc>
  ) -> bool {
    dt < self.start_of_today
  }
}

/// Start of `date` in `tz`, expressed in
/// UTC. A midnight skipped by a DST jump
/// resolves to the first instant of the
/// day.
pub fn local_midnight(
  date: NaiveDate,
  tz: Tz
) -> DateTime<Utc> {
  let midnight =
    date.and_time(NaiveTime::MIN);
  match tz.from_local_datetime(&midnight)
  {
    | LocalResult::Single(local) => {
      local.with_timezone(&Utc)
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      let chosen = if first <= second {
        first
      } else {
        second
      };
      chosen.with_timezone(&Utc)
    }
    | LocalResult::None => {
      tracing::warn!(
        %date,
        timezone = %tz,
        "local midnight does not exist; shifting forward"
      );
      let shifted =
        midnight + Duration::hours(1);
      tz.from_local_datetime(&shifted)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| {
          shifted.and_utc()
        })
    }
  }
}

/// Parses a due date given either as an
/// RFC 3339 instant or as a plain
/// `YYYY-MM-DD` calendar date (local
/// midnight in `tz`).
#[tracing::instrument(skip(tz), fields(input = input))]
pub fn parse_due_date(
  input: &str,
  tz: Tz
) -> Result<DateTime<Utc>> {
  let token = input.trim();
  if token.is_empty() {
    return Err(Error::validation(
      "dueDate cannot be empty"
    ));
  }

  let parsed = if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    dt.with_timezone(&Utc)
  } else {
    let date = parse_plain_date(token)
      .ok_or_else(|| {
        Error::validation(format!(
          "invalid dueDate: {token}"
        ))
      })?;
    local_midnight(date, tz)
  };

  validate_due_date(parsed)?;
  Ok(parsed)
}

/// Rejects due dates whose UTC year is
/// outside the four-digit range.
pub fn validate_due_date(
  due: DateTime<Utc>
) -> Result<()> {
  let year = due.year();
  if (MIN_DUE_YEAR..=MAX_DUE_YEAR)
    .contains(&year)
  {
    Ok(())
  } else {
    Err(Error::validation(format!(
      "dueDate year must be 4 digits \
       ({MIN_DUE_YEAR}-{MAX_DUE_YEAR}), \
       got {year}"
    )))
  }
}

// Split by hand so that years with more
// than four digits reach the range check
// instead of failing as a format error.
fn parse_plain_date(
  token: &str
) -> Option<NaiveDate> {
  let date_part = token
    .split_once('T')
    .map_or(token, |(date, _)| date);
  let mut parts = date_part.split('-');
  let year = parts.next()?;
  let month = parts.next()?;
  let day = parts.next()?;
  if parts.next().is_some()
    || year.is_empty()
    || !year
      .chars()
      .all(|c| c.is_ascii_digit())
  {
    return None;
  }
  NaiveDate::from_ymd_opt(
    year.parse().ok()?,
    month.parse().ok()?,
    day.parse().ok()?
  )
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    DayFrame,
    parse_due_date,
    validate_due_date
  };

  #[test]
  fn due_year_bounds() {
    let tz = chrono_tz::UTC;
    assert!(
      parse_due_date("1000-01-01", tz)
        .is_ok()
    );
    assert!(
      parse_due_date("9999-12-31", tz)
        .is_ok()
    );
    assert!(
      parse_due_date("10000-01-01", tz)
        .is_err()
    );
    assert!(
      parse_due_date("0000-06-01", tz)
        .is_err()
    );

    let year_zero = Utc
      .with_ymd_and_hms(0, 6, 1, 0, 0, 0)
      .single()
      .expect("valid year zero");
    assert!(
      validate_due_date(year_zero)
        .is_err()
    );
  }

  #[test]
  fn due_year_bound_is_checked_in_utc() {
    let taipei = chrono_tz::Asia::Taipei;
    assert!(
      parse_due_date(
        "1000-01-01T05:00:00+08:00",
        taipei
      )
      .is_err()
    );
    assert!(
      parse_due_date(
        "0999-12-31T20:00:00-05:00",
        taipei
      )
      .is_ok()
    );
    assert!(
      parse_due_date(
        "9999-12-31T20:00:00-05:00",
        chrono_tz::UTC
      )
      .is_err()
    );
  }

  #[test]
  fn plain_date_is_local_midnight() {
    let tz: chrono_tz::Tz =
      "Asia/Taipei".parse().expect("tz");
    let parsed =
      parse_due_date("2026-03-05", tz)
        .expect("parse plain date");
    assert_eq!(
      parsed,
      Utc
        .with_ymd_and_hms(
          2026, 3, 4, 16, 0, 0
        )
        .single()
        .expect("valid utc")
    );
  }

  #[test]
  fn rfc3339_is_accepted() {
    let parsed = parse_due_date(
      "2026-03-05T10:30:00Z",
      chrono_tz::UTC
    )
    .expect("parse instant");
    assert_eq!(
      parsed.to_rfc3339(),
      "2026-03-05T10:30:00+00:00"
    );
  }

  #[test]
  fn garbage_is_rejected() {
    assert!(
      parse_due_date(
        "next tuesday",
        chrono_tz::UTC
      )
      .is_err()
    );
    assert!(
      parse_due_date("", chrono_tz::UTC)
        .is_err()
    );
  }

  #[test]
  fn frame_uses_local_calendar_day() {
    let tz: chrono_tz::Tz =
      "America/New_York"
        .parse()
        .expect("tz");
    let now = Utc
      .with_ymd_and_hms(
        2026, 1, 10, 3, 0, 0
      )
      .single()
      .expect("valid now");
    let frame = DayFrame::new(now, tz);
    assert_eq!(
      frame.today,
      NaiveDate::from_ymd_opt(2026, 1, 9)
        .expect("date")
    );
    assert_eq!(
      frame.start_of_today,
      Utc
        .with_ymd_and_hms(
          2026, 1, 9, 5, 0, 0
        )
        .single()
        .expect("valid utc")
    );
  }
}
