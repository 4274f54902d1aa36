use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use cron::Schedule;

use crate::error::{Result, SchedulerError};
use crate::job::{JobKey, TriggerKey};

pub const DEFAULT_PRIORITY: i32 = 5;

/// A parsed recurrence rule.
///
/// Expressions use the Quartz format: `sec min hour day-of-month month
/// day-of-week [year]`, with `?` accepted in the day fields and days of the
/// week numbered `1` (Sunday) to `7` (Saturday). On top of the plain field
/// grammar the Quartz day rules are understood:
///
/// - day-of-month `L`, `L-n`, `LW` and `nW`
/// - day-of-week `L` (Saturday), `dL` (last `d` of the month) and `d#k`
///   (`k`-th `d` of the month)
///
/// A day rule occupies its whole field and the other day field must be `?`
/// or `*`.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: Schedule,
    day_rule: Option<DayRule>,
}

/// Candidate days inspected before a day rule is considered exhausted.
const DAY_SCAN_LIMIT: usize = 366 * 30;

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let invalid = |reason: String| SchedulerError::InvalidCronExpression {
            expression: expression.to_string(),
            reason,
        };
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(invalid("expression is empty".to_string()));
        }
        let (base, day_rule) = split_day_rule(trimmed).map_err(invalid)?;
        let schedule = Schedule::from_str(&base).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            expression: trimmed.to_string(),
            schedule,
            day_rule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Next fire time strictly after `after`, if the rule ever fires again.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let Some(rule) = self.day_rule else {
            return self.schedule.after(&after).next();
        };
        let mut cursor = after;
        for _ in 0..DAY_SCAN_LIMIT {
            let candidate = self.schedule.after(&cursor).next()?;
            let date = candidate.date_naive();
            if rule.matches(date) {
                return Some(candidate);
            }
            let midnight = date.succ_opt()?.and_hms_opt(0, 0, 0)?;
            cursor = Utc.from_utc_datetime(&midnight) - Duration::seconds(1);
        }
        None
    }
}

/// Quartz day rules the `cron` grammar has no syntax for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DayRule {
    /// `L` or `L-n`: `offset` days before the last day of the month.
    LastDay { offset: u32 },
    /// `LW`: last weekday of the month.
    LastWeekday,
    /// `nW`: weekday nearest to day `n` without leaving the month.
    NearestWeekday(u32),
    /// `dL`: last occurrence of a weekday in the month.
    LastOf(Weekday),
    /// `d#k`: `k`-th occurrence of a weekday in the month.
    Nth(Weekday, u32),
}

impl DayRule {
    fn matches(self, date: NaiveDate) -> bool {
        let day = date.day();
        let last = last_day_of_month(date);
        match self {
            DayRule::LastDay { offset } => last.checked_sub(offset) == Some(day),
            DayRule::LastWeekday => nearest_weekday(date, last) == Some(day),
            DayRule::NearestWeekday(target) => nearest_weekday(date, target) == Some(day),
            DayRule::LastOf(weekday) => date.weekday() == weekday && day + 7 > last,
            DayRule::Nth(weekday, k) => date.weekday() == weekday && (day - 1) / 7 + 1 == k,
        }
    }
}

/// Split the Quartz day rule out of `expression`, returning an expression
/// the `cron` crate accepts for the remaining fields.
fn split_day_rule(expression: &str) -> std::result::Result<(String, Option<DayRule>), String> {
    let mut fields: Vec<String> = expression
        .split_whitespace()
        .map(str::to_ascii_uppercase)
        .collect();
    if !(6..=7).contains(&fields.len()) {
        return Ok((expression.to_string(), None));
    }
    let saturday = fields[5] == "L";
    if saturday {
        fields[5] = "SAT".to_string();
    }

    let dom_rule = parse_day_of_month_rule(&fields[3])?;
    let dow_rule = parse_day_of_week_rule(&fields[5])?;
    let rule = match (dom_rule, dow_rule) {
        (Some(_), Some(_)) => {
            return Err("day-of-month and day-of-week rules cannot be combined".to_string())
        }
        (Some(rule), None) => {
            require_unrestricted(&fields[5], "day-of-week")?;
            fields[3] = "*".to_string();
            Some(rule)
        }
        (None, Some(rule)) => {
            require_unrestricted(&fields[3], "day-of-month")?;
            fields[5] = "*".to_string();
            Some(rule)
        }
        (None, None) if !saturday => return Ok((expression.to_string(), None)),
        (None, None) => None,
    };
    Ok((fields.join(" "), rule))
}

fn require_unrestricted(field: &str, name: &str) -> std::result::Result<(), String> {
    if field == "?" || field == "*" {
        Ok(())
    } else {
        Err(format!("{} must be '?' when the other day field uses a day rule", name))
    }
}

fn parse_day_of_month_rule(field: &str) -> std::result::Result<Option<DayRule>, String> {
    if field == "L" {
        return Ok(Some(DayRule::LastDay { offset: 0 }));
    }
    if field == "LW" {
        return Ok(Some(DayRule::LastWeekday));
    }
    if let Some(offset) = field.strip_prefix("L-") {
        return match offset.parse::<u32>() {
            Ok(offset) if offset <= 30 => Ok(Some(DayRule::LastDay { offset })),
            _ => Err(format!("invalid last-day offset '{}'", field)),
        };
    }
    if let Some(day) = field.strip_suffix('W') {
        return match day.parse::<u32>() {
            Ok(day) if (1..=31).contains(&day) => Ok(Some(DayRule::NearestWeekday(day))),
            _ => Err(format!("invalid nearest-weekday day '{}'", field)),
        };
    }
    Ok(None)
}

fn parse_day_of_week_rule(field: &str) -> std::result::Result<Option<DayRule>, String> {
    if let Some((weekday, nth)) = field.split_once('#') {
        let weekday = parse_weekday(weekday)?;
        return match nth.parse::<u32>() {
            Ok(nth) if (1..=5).contains(&nth) => Ok(Some(DayRule::Nth(weekday, nth))),
            _ => Err(format!("invalid weekday occurrence '{}'", field)),
        };
    }
    match field.strip_suffix('L') {
        Some(weekday) if !weekday.is_empty() => Ok(Some(DayRule::LastOf(parse_weekday(weekday)?))),
        _ => Ok(None),
    }
}

fn parse_weekday(value: &str) -> std::result::Result<Weekday, String> {
    let weekday = match value {
        "1" | "SUN" => Weekday::Sun,
        "2" | "MON" => Weekday::Mon,
        "3" | "TUE" => Weekday::Tue,
        "4" | "WED" => Weekday::Wed,
        "5" | "THU" => Weekday::Thu,
        "6" | "FRI" => Weekday::Fri,
        "7" | "SAT" => Weekday::Sat,
        other => return Err(format!("invalid day of week '{}'", other)),
    };
    Ok(weekday)
}

fn last_day_of_month(date: NaiveDate) -> u32 {
    let (year, month) = match date.month() {
        12 => (date.year() + 1, 1),
        m => (date.year(), m + 1),
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(31, |last| last.day())
}

/// Weekday closest to day `target` of `date`'s month, staying inside the month.
fn nearest_weekday(date: NaiveDate, target: u32) -> Option<u32> {
    let last = last_day_of_month(date);
    let day = match date.with_day(target)?.weekday() {
        Weekday::Sat if target == 1 => 3,
        Weekday::Sat => target - 1,
        Weekday::Sun if target == last => target - 2,
        Weekday::Sun => target + 1,
        _ => target,
    };
    Some(day)
}

impl PartialEq for CronSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl Eq for CronSchedule {}

/// Cron trigger bound to exactly one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub key: TriggerKey,
    pub job_key: JobKey,
    pub description: Option<String>,
    pub priority: i32,
    pub schedule: CronSchedule,
}

impl Trigger {
    /// Start a builder for a trigger firing `job_key`, keyed like the job.
    pub fn builder(job_key: &JobKey) -> TriggerBuilder {
        TriggerBuilder {
            key: job_key.trigger_key(),
            job_key: job_key.clone(),
            description: None,
            priority: DEFAULT_PRIORITY,
        }
    }

    /// A builder carrying this trigger's identity, for building its replacement.
    pub fn trigger_builder(&self) -> TriggerBuilder {
        TriggerBuilder {
            key: self.key.clone(),
            job_key: self.job_key.clone(),
            description: self.description.clone(),
            priority: self.priority,
        }
    }

    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.next_fire_after(after)
    }
}

#[derive(Debug, Clone)]
pub struct TriggerBuilder {
    key: TriggerKey,
    job_key: JobKey,
    description: Option<String>,
    priority: i32,
}

impl TriggerBuilder {
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn build(self, schedule: CronSchedule) -> Trigger {
        Trigger {
            key: self.key,
            job_key: self.job_key,
            description: self.description,
            priority: self.priority,
            schedule,
        }
    }
}
