// Schedule pattern construction and next firing calculation
//
// Patterns are validated before anything is sent to the scheduler. Firing
// times are computed in the pattern's time zone and returned in UTC.

use crate::errors::ScheduleError;
use crate::models::{Frequency, RelativeDay, RelativeTime, RepeatPattern, SchedulePattern};
use chrono::{
    DateTime, Datelike, Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike,
    Utc, Weekday,
};
use chrono_tz::Tz;

/// Scheduled dates skipped for exception days before giving up
const MAX_SKIPPED_DATES: usize = 1000;

/// ScheduleTrigger trait defines the interface for calculating next execution times
pub trait ScheduleTrigger {
    /// Calculate the next execution time based on the schedule and last execution time
    fn next_execution_time(
        &self,
        last_execution: Option<DateTime<Utc>>,
    ) -> Result<Option<DateTime<Utc>>, ScheduleError>;

    /// Check if the schedule has completed (for one-time jobs or jobs with end dates)
    fn is_complete(&self, last_execution: Option<DateTime<Utc>>) -> bool;
}

/// Frequency-specific inputs to `build_pattern`
#[derive(Debug, Clone, Default)]
pub struct PatternFields {
    /// Overrides the time of day taken from the start reference
    pub start_time: Option<NaiveTime>,
    /// Defaults to UTC
    pub time_zone: Option<Tz>,
    pub on_day: Option<u32>,
    pub on_month: Option<u32>,
    pub weekdays: Vec<Weekday>,
    /// Interval in days, weeks, months or years depending on the frequency
    pub repeat_every: Option<u32>,
    /// Minutes between continuous runs
    pub job_interval: Option<u32>,
    pub relative_time: Option<RelativeTime>,
    pub relative_weekday: Option<RelativeDay>,
    /// Intra-day repetition on every scheduled date
    pub repeat_pattern: Option<RepeatPattern>,
    /// Days of the month to skip
    pub exception_dates: Vec<u32>,
    pub end_after: Option<u32>,
    pub active_end_date: Option<NaiveDate>,
}

/// Window in which the next firing is expected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireWindow {
    pub expected: DateTime<Utc>,
    pub earliest: DateTime<Utc>,
    pub latest: DateTime<Utc>,
}

impl FireWindow {
    /// `expected` plus or minus `tolerance`, saturating at the calendar's range
    pub fn around(expected: DateTime<Utc>, tolerance: Duration) -> Self {
        Self {
            expected,
            earliest: expected
                .checked_sub_signed(tolerance)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            latest: expected
                .checked_add_signed(tolerance)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.earliest && instant <= self.latest
    }
}

fn out_of_range(what: impl std::fmt::Display) -> ScheduleError {
    ScheduleError::CalculationFailed(format!("{} is out of range", what))
}

/// "Now" plus a buffer, truncated to the minute
pub fn start_reference(
    now: DateTime<Utc>,
    buffer_minutes: i64,
) -> Result<DateTime<Utc>, ScheduleError> {
    let reference = Duration::try_minutes(buffer_minutes)
        .and_then(|buffer| now.checked_add_signed(buffer))
        .ok_or_else(|| out_of_range(format!("{} plus {} minutes", now, buffer_minutes)))?;
    Ok(reference
        .with_second(0)
        .and_then(|r| r.with_nanosecond(0))
        .unwrap_or(reference))
}

/// Render a start reference as the scheduler's `(MM/DD/YYYY, HH:MM)` pair
pub fn format_start(reference: DateTime<Utc>, tz: Tz) -> (String, String) {
    let local = reference.with_timezone(&tz);
    (
        local.format("%m/%d/%Y").to_string(),
        local.format("%H:%M").to_string(),
    )
}

/// Build and validate a schedule pattern.
///
/// The start date and time come from `start_reference` in the pattern's
/// time zone; `fields.start_time` replaces the time of day.
pub fn build_pattern(
    frequency: Frequency,
    start_reference: DateTime<Utc>,
    fields: PatternFields,
) -> Result<SchedulePattern, ScheduleError> {
    validate_fields(frequency, &fields)?;

    let time_zone = fields.time_zone.unwrap_or(Tz::UTC);
    let local = start_reference.with_timezone(&time_zone);
    let active_start_date = local.date_naive();

    let active_start_time = match frequency {
        Frequency::Continuous => None,
        _ => Some(match fields.start_time {
            Some(time) => time,
            None => NaiveTime::from_hms_opt(local.hour(), local.minute(), 0)
                .ok_or_else(|| ScheduleError::CalculationFailed("invalid start time".into()))?,
        }),
    };

    if let Some(end) = fields.active_end_date {
        if end < active_start_date {
            return Err(ScheduleError::invalid(
                frequency,
                format!(
                    "active_end_date {} is before the start date {}",
                    end, active_start_date
                ),
            ));
        }
    }

    if let (Some(repeat), Some(start)) = (fields.repeat_pattern, active_start_time) {
        if repeat.repeat_end <= start {
            return Err(ScheduleError::invalid(
                frequency,
                format!(
                    "repeat_end {} is not after the start time {}",
                    repeat.repeat_end.format("%H:%M"),
                    start.format("%H:%M")
                ),
            ));
        }
    }

    let mut exception_dates = fields.exception_dates.clone();
    exception_dates.sort_unstable();
    exception_dates.dedup();

    let repeat = fields.repeat_every.unwrap_or(1);
    let mut pattern = SchedulePattern {
        freq_type: frequency,
        active_start_date,
        active_start_time,
        time_zone,
        repeat_days: None,
        repeat_weeks: None,
        repeat_months: None,
        repeat_years: None,
        weekdays: Vec::new(),
        on_day: None,
        on_month: None,
        relative_time: None,
        relative_weekday: None,
        repeat_pattern: fields.repeat_pattern,
        exception_dates,
        job_interval: None,
        end_after: fields.end_after,
        active_end_date: fields.active_end_date,
    };

    match frequency {
        Frequency::OneTime => {}
        Frequency::Daily => pattern.repeat_days = Some(repeat),
        Frequency::Weekly => {
            pattern.repeat_weeks = Some(repeat);
            pattern.weekdays = normalize_weekdays(&fields.weekdays);
        }
        Frequency::Monthly => {
            pattern.repeat_months = Some(repeat);
            pattern.on_day = fields.on_day;
        }
        Frequency::Yearly => {
            pattern.repeat_years = Some(repeat);
            pattern.on_day = fields.on_day;
            pattern.on_month = fields.on_month;
        }
        Frequency::MonthlyRelative => {
            pattern.repeat_months = Some(repeat);
            pattern.relative_time = fields.relative_time;
            pattern.relative_weekday = fields.relative_weekday;
        }
        Frequency::YearlyRelative => {
            pattern.repeat_years = Some(repeat);
            pattern.on_month = fields.on_month;
            pattern.relative_time = fields.relative_time;
            pattern.relative_weekday = fields.relative_weekday;
        }
        Frequency::Continuous => pattern.job_interval = fields.job_interval,
    }

    tracing::debug!(
        freq_type = %frequency,
        start_date = %pattern.active_start_date,
        time_zone = %pattern.time_zone,
        "Schedule pattern built"
    );

    Ok(pattern)
}

fn validate_fields(frequency: Frequency, fields: &PatternFields) -> Result<(), ScheduleError> {
    if fields.repeat_every == Some(0) {
        return Err(ScheduleError::invalid(frequency, "repeat_every must be at least 1"));
    }
    if fields.job_interval == Some(0) {
        return Err(ScheduleError::invalid(frequency, "job_interval must be at least 1 minute"));
    }
    if fields.end_after == Some(0) {
        return Err(ScheduleError::invalid(frequency, "end_after must be at least 1"));
    }
    if let Some(day) = fields.on_day {
        if !(1..=31).contains(&day) {
            return Err(ScheduleError::invalid(
                frequency,
                format!("on_day {} is outside 1-31", day),
            ));
        }
    }
    if let Some(month) = fields.on_month {
        if !(1..=12).contains(&month) {
            return Err(ScheduleError::invalid(
                frequency,
                format!("on_month {} is outside 1-12", month),
            ));
        }
    }
    if let Some(day) = fields.exception_dates.iter().find(|d| !(1..=31).contains(*d)) {
        return Err(ScheduleError::invalid(
            frequency,
            format!("exception date {} is outside 1-31", day),
        ));
    }
    if fields.repeat_pattern.is_some_and(|repeat| repeat.repeat_every == 0) {
        return Err(ScheduleError::invalid(
            frequency,
            "repeat_pattern interval must be at least 1 minute",
        ));
    }

    if frequency != Frequency::Continuous && fields.job_interval.is_some() {
        return Err(ScheduleError::invalid(
            frequency,
            "job_interval only applies to continuous schedules",
        ));
    }
    if !frequency.is_relative()
        && (fields.relative_time.is_some() || fields.relative_weekday.is_some())
    {
        return Err(ScheduleError::invalid(
            frequency,
            "relative_time and relative_weekday only apply to relative schedules",
        ));
    }

    match frequency {
        Frequency::OneTime | Frequency::Continuous if fields.repeat_every.is_some() => {
            Err(ScheduleError::invalid(frequency, "repeat_every does not apply"))
        }
        Frequency::OneTime | Frequency::Continuous if fields.repeat_pattern.is_some() => {
            Err(ScheduleError::invalid(frequency, "repeat_pattern does not apply"))
        }
        Frequency::Continuous if fields.job_interval.is_none() => {
            Err(ScheduleError::invalid(frequency, "job_interval is required"))
        }
        Frequency::Continuous if fields.start_time.is_some() => Err(ScheduleError::invalid(
            frequency,
            "start_time and job_interval are mutually exclusive",
        )),
        Frequency::Continuous if !fields.exception_dates.is_empty() => Err(
            ScheduleError::invalid(frequency, "exception_dates do not apply"),
        ),
        Frequency::Weekly if fields.weekdays.is_empty() => {
            Err(ScheduleError::invalid(frequency, "at least one weekday is required"))
        }
        Frequency::Monthly if fields.on_day.is_none() => {
            Err(ScheduleError::invalid(frequency, "on_day is required"))
        }
        Frequency::Yearly if fields.on_day.is_none() || fields.on_month.is_none() => Err(
            ScheduleError::invalid(frequency, "on_day and on_month are required"),
        ),
        Frequency::MonthlyRelative | Frequency::YearlyRelative
            if fields.relative_time.is_none() || fields.relative_weekday.is_none() =>
        {
            Err(ScheduleError::invalid(
                frequency,
                "relative_time and relative_weekday are required",
            ))
        }
        Frequency::MonthlyRelative | Frequency::YearlyRelative if fields.on_day.is_some() => Err(
            ScheduleError::invalid(frequency, "on_day does not apply to relative schedules"),
        ),
        Frequency::YearlyRelative if fields.on_month.is_none() => {
            Err(ScheduleError::invalid(frequency, "on_month is required"))
        }
        _ => Ok(()),
    }
}

/// Deduplicate and order weekdays Monday first
fn normalize_weekdays(days: &[Weekday]) -> Vec<Weekday> {
    let mut days = days.to_vec();
    days.sort_by_key(|d| d.num_days_from_monday());
    days.dedup();
    days
}

/// Number of days in `month` of `year`.
///
/// Falls back to 28 when the month is not a calendar month or lies outside
/// the supported date range; building a date from it then fails.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first_of_next = match month {
        12 => year
            .checked_add(1)
            .and_then(|next| NaiveDate::from_ymd_opt(next, 1, 1)),
        1..=11 => NaiveDate::from_ymd_opt(year, month + 1, 1),
        _ => None,
    };
    first_of_next
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// Date in the given month with `day` clamped to the month's length
fn clamped_date(year: i32, month: u32, day: u32) -> Result<NaiveDate, ScheduleError> {
    let day = day.clamp(1, days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        ScheduleError::CalculationFailed(format!("invalid date {}-{}-{}", year, month, day))
    })
}

fn days_after(date: NaiveDate, days: u64) -> Result<NaiveDate, ScheduleError> {
    date.checked_add_days(Days::new(days))
        .ok_or_else(|| out_of_range(format!("{} plus {} days", date, days)))
}

fn years_after(date: NaiveDate, years: u32) -> Result<i32, ScheduleError> {
    i32::try_from(years)
        .ok()
        .and_then(|years| date.year().checked_add(years))
        .ok_or_else(|| out_of_range(format!("{} plus {} years", date, years)))
}

/// Year and month `months` after the month containing `date`
fn month_after(date: NaiveDate, months: u32) -> Result<(i32, u32), ScheduleError> {
    let total = i64::from(date.year()) * 12 + i64::from(date.month0()) + i64::from(months);
    let year = i32::try_from(total.div_euclid(12))
        .map_err(|_| out_of_range(format!("{} plus {} months", date, months)))?;
    Ok((year, total.rem_euclid(12) as u32 + 1))
}

/// Shift `date` by `months`, landing on `day` clamped to the target month
pub fn add_months(date: NaiveDate, months: u32, day: u32) -> Result<NaiveDate, ScheduleError> {
    let (year, month) = month_after(date, months)?;
    clamped_date(year, month, day)
}

/// The `which` occurrence of `day` in a month, e.g. the last weekend day of
/// November 2024
pub fn relative_date(
    year: i32,
    month: u32,
    which: RelativeTime,
    day: RelativeDay,
) -> Result<NaiveDate, ScheduleError> {
    let mut matching = (1..=days_in_month(year, month))
        .filter_map(|d| NaiveDate::from_ymd_opt(year, month, d))
        .filter(|date| day.matches(date.weekday()));
    let found = match which.index() {
        Some(n) => matching.nth(n),
        None => matching.last(),
    };
    found.ok_or_else(|| {
        ScheduleError::CalculationFailed(format!(
            "no {:?} {} in {}-{:02}",
            which, day, year, month
        ))
    })
}

impl SchedulePattern {
    fn start_time(&self) -> NaiveTime {
        self.active_start_time.unwrap_or(NaiveTime::MIN)
    }

    fn start_local(&self) -> NaiveDateTime {
        self.active_start_date.and_time(self.start_time())
    }

    fn required_on_day(&self) -> Result<u32, ScheduleError> {
        self.on_day
            .ok_or_else(|| ScheduleError::invalid(self.freq_type, "on_day is required"))
    }

    fn required_on_month(&self) -> Result<u32, ScheduleError> {
        self.on_month
            .ok_or_else(|| ScheduleError::invalid(self.freq_type, "on_month is required"))
    }

    fn required_relative(&self) -> Result<(RelativeTime, RelativeDay), ScheduleError> {
        self.relative_time.zip(self.relative_weekday).ok_or_else(|| {
            ScheduleError::invalid(
                self.freq_type,
                "relative_time and relative_weekday are required",
            )
        })
    }

    /// Local time to UTC; a time skipped by a DST jump moves forward one hour
    fn to_utc(&self, local: NaiveDateTime) -> Result<DateTime<Utc>, ScheduleError> {
        self.time_zone
            .from_local_datetime(&local)
            .earliest()
            .or_else(|| {
                let shifted = local.checked_add_signed(Duration::hours(1))?;
                self.time_zone.from_local_datetime(&shifted).earliest()
            })
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| {
                ScheduleError::CalculationFailed(format!(
                    "{} does not exist in {}",
                    local, self.time_zone
                ))
            })
    }

    fn first_local(&self) -> Result<NaiveDateTime, ScheduleError> {
        let start = self.start_local();
        let time = self.start_time();

        let candidate = match self.freq_type {
            Frequency::OneTime | Frequency::Daily | Frequency::Continuous => return Ok(start),
            Frequency::Weekly => {
                for offset in 0..7 {
                    let date = days_after(start.date(), offset)?;
                    if self.weekdays.contains(&date.weekday()) {
                        return Ok(date.and_time(time));
                    }
                }
                return Err(ScheduleError::invalid(self.freq_type, "no weekdays listed"));
            }
            Frequency::Monthly => {
                clamped_date(start.year(), start.month(), self.required_on_day()?)?
            }
            Frequency::Yearly => clamped_date(
                start.year(),
                self.required_on_month()?,
                self.required_on_day()?,
            )?,
            Frequency::MonthlyRelative => {
                let (which, day) = self.required_relative()?;
                relative_date(start.year(), start.month(), which, day)?
            }
            Frequency::YearlyRelative => {
                let (which, day) = self.required_relative()?;
                relative_date(start.year(), self.required_on_month()?, which, day)?
            }
        };

        let candidate = candidate.and_time(time);
        if candidate >= start {
            return Ok(candidate);
        }

        // This period's date has passed; take the next period's
        let next = match self.freq_type {
            Frequency::Monthly => add_months(start.date(), 1, self.required_on_day()?)?,
            Frequency::Yearly => clamped_date(
                years_after(start.date(), 1)?,
                self.required_on_month()?,
                self.required_on_day()?,
            )?,
            Frequency::MonthlyRelative => {
                let (which, day) = self.required_relative()?;
                let (year, month) = month_after(start.date(), 1)?;
                relative_date(year, month, which, day)?
            }
            Frequency::YearlyRelative => {
                let (which, day) = self.required_relative()?;
                let year = years_after(start.date(), 1)?;
                relative_date(year, self.required_on_month()?, which, day)?
            }
            Frequency::OneTime | Frequency::Daily | Frequency::Weekly | Frequency::Continuous => {
                return Ok(candidate)
            }
        };
        Ok(next.and_time(time))
    }

    /// Next scheduled date after the one containing `last`, at the start time
    fn next_local_after(&self, last: NaiveDateTime) -> Result<Option<NaiveDateTime>, ScheduleError> {
        let time = self.start_time();
        let date = last.date();

        let next = match self.freq_type {
            Frequency::OneTime | Frequency::Continuous => return Ok(None),
            Frequency::Daily => {
                let days = self.repeat_days.unwrap_or(1).max(1);
                days_after(date, u64::from(days))?
            }
            Frequency::Weekly => {
                let days = normalize_weekdays(&self.weekdays);
                let first = days
                    .first()
                    .ok_or_else(|| ScheduleError::invalid(self.freq_type, "no weekdays listed"))?;
                let current = date.weekday().num_days_from_monday();
                let week_start = date
                    .checked_sub_days(Days::new(u64::from(current)))
                    .ok_or_else(|| out_of_range(format!("week of {}", date)))?;
                match days.iter().find(|d| d.num_days_from_monday() > current) {
                    Some(later) => days_after(week_start, u64::from(later.num_days_from_monday()))?,
                    None => {
                        let weeks = self.repeat_weeks.unwrap_or(1).max(1);
                        let offset = u64::from(weeks) * 7 + u64::from(first.num_days_from_monday());
                        days_after(week_start, offset)?
                    }
                }
            }
            Frequency::Monthly => {
                let months = self.repeat_months.unwrap_or(1).max(1);
                add_months(date, months, self.required_on_day()?)?
            }
            Frequency::Yearly => {
                let years = self.repeat_years.unwrap_or(1).max(1);
                clamped_date(
                    years_after(date, years)?,
                    self.required_on_month()?,
                    self.required_on_day()?,
                )?
            }
            Frequency::MonthlyRelative => {
                let (which, day) = self.required_relative()?;
                let months = self.repeat_months.unwrap_or(1).max(1);
                let (year, month) = month_after(date, months)?;
                relative_date(year, month, which, day)?
            }
            Frequency::YearlyRelative => {
                let (which, day) = self.required_relative()?;
                let years = self.repeat_years.unwrap_or(1).max(1);
                relative_date(
                    years_after(date, years)?,
                    self.required_on_month()?,
                    which,
                    day,
                )?
            }
        };

        Ok(Some(next.and_time(time)))
    }

    /// Next intra-day repetition after `last`, if it stays within the day's window
    fn repeat_after(&self, last: NaiveDateTime) -> Option<NaiveDateTime> {
        let repeat = self.repeat_pattern?;
        let every = Duration::try_minutes(i64::from(repeat.repeat_every))?;
        let next = last.checked_add_signed(every)?;
        (next.date() == last.date() && next.time() <= repeat.repeat_end).then_some(next)
    }

    pub fn is_exception(&self, date: NaiveDate) -> bool {
        self.exception_dates.contains(&date.day())
    }

    /// Move `candidate` past scheduled dates that fall on an exception day
    fn skip_exceptions(
        &self,
        mut candidate: NaiveDateTime,
    ) -> Result<Option<NaiveDateTime>, ScheduleError> {
        for _ in 0..MAX_SKIPPED_DATES {
            if !self.is_exception(candidate.date()) {
                return Ok(Some(candidate));
            }
            tracing::debug!(date = %candidate.date(), "Skipping exception date");
            match self.next_local_after(candidate)? {
                Some(next) => candidate = next,
                None => return Ok(None),
            }
        }
        Err(ScheduleError::CalculationFailed(format!(
            "no date outside the exception days before {}",
            candidate.date()
        )))
    }

    fn past_end(&self, instant: DateTime<Utc>) -> bool {
        match self.active_end_date {
            Some(end) => instant.with_timezone(&self.time_zone).date_naive() > end,
            None => false,
        }
    }

    /// Expected window of the firing after `last_execution`
    pub fn fire_window(
        &self,
        last_execution: Option<DateTime<Utc>>,
        tolerance: Duration,
    ) -> Result<Option<FireWindow>, ScheduleError> {
        Ok(self
            .next_execution_time(last_execution)?
            .map(|expected| FireWindow::around(expected, tolerance)))
    }

    /// True once `fired` runs have used up `end_after`
    pub fn occurrences_exhausted(&self, fired: usize) -> bool {
        self.end_after
            .is_some_and(|limit| fired >= limit as usize)
    }

    /// Runs left after `fired`; None when `end_after` is not set
    pub fn remaining_occurrences(&self, fired: usize) -> Option<usize> {
        self.end_after
            .map(|limit| (limit as usize).saturating_sub(fired))
    }

    /// Expected firings from the first one, at most `limit`.
    ///
    /// Stops early at `end_after` runs or at the end date.
    pub fn firings(&self, limit: usize) -> Result<Vec<DateTime<Utc>>, ScheduleError> {
        let cap = self
            .remaining_occurrences(0)
            .map_or(limit, |remaining| remaining.min(limit));
        let mut firings = Vec::with_capacity(cap);
        let mut last = None;
        while firings.len() < cap {
            match self.next_execution_time(last)? {
                Some(next) => {
                    firings.push(next);
                    last = Some(next);
                }
                None => break,
            }
        }
        Ok(firings)
    }
}

impl ScheduleTrigger for SchedulePattern {
    fn next_execution_time(
        &self,
        last_execution: Option<DateTime<Utc>>,
    ) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        let first = match self.skip_exceptions(self.first_local()?)? {
            Some(local) => self.to_utc(local)?,
            None => return Ok(None),
        };

        let next = match last_execution {
            None => Some(first),
            Some(last) if last < first => Some(first),
            Some(last) => match self.freq_type {
                Frequency::Continuous => {
                    let interval = self.job_interval.ok_or_else(|| {
                        ScheduleError::invalid(self.freq_type, "job_interval is required")
                    })?;
                    let next = Duration::try_minutes(i64::from(interval))
                        .and_then(|interval| last.checked_add_signed(interval))
                        .ok_or_else(|| {
                            out_of_range(format!("{} plus {} minutes", last, interval))
                        })?;
                    Some(next)
                }
                _ => {
                    let last_local = last.with_timezone(&self.time_zone).naive_local();
                    let local = match self.repeat_after(last_local) {
                        Some(repeat) => Some(repeat),
                        None => match self.next_local_after(last_local)? {
                            Some(scheduled) => self.skip_exceptions(scheduled)?,
                            None => None,
                        },
                    };
                    local.map(|local| self.to_utc(local)).transpose()?
                }
            },
        };

        Ok(next.filter(|instant| !self.past_end(*instant)))
    }

    fn is_complete(&self, last_execution: Option<DateTime<Utc>>) -> bool {
        match last_execution {
            None => false,
            Some(_) if self.freq_type == Frequency::OneTime => true,
            Some(_) => matches!(self.next_execution_time(last_execution), Ok(None)),
        }
    }
}
