use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone};
use std::collections::BTreeMap;

use crate::models::{Job, JobStatus};

pub const RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Totals {
    pub applied: usize,
    pub interviews: usize,
    pub offers: usize,
    pub rejected: usize,
}

pub fn totals(jobs: &[Job]) -> Totals {
    Totals {
        applied: jobs.len(),
        interviews: jobs.iter().filter(|j| j.status == JobStatus::Interview).count(),
        offers: jobs.iter().filter(|j| j.status.is_offer()).count(),
        rejected: jobs.iter().filter(|j| j.status == JobStatus::Rejected).count(),
    }
}

/// Activity bucket for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heat {
    None,
    Low,
    Medium,
    High,
}

impl Heat {
    pub fn for_count(count: usize) -> Heat {
        match count {
            0 => Heat::None,
            1..=2 => Heat::Low,
            3..=10 => Heat::Medium,
            _ => Heat::High,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            Heat::None => '.',
            Heat::Low => '-',
            Heat::Medium => '+',
            Heat::High => '#',
        }
    }
}

/// Applications per day for one month, keyed by day of month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthActivity {
    pub year: i32,
    pub month: u32,
    pub days_in_month: u32,
    pub counts: BTreeMap<u32, usize>,
}

impl MonthActivity {
    pub fn count(&self, day: u32) -> usize {
        self.counts.get(&day).copied().unwrap_or(0)
    }

    pub fn heat(&self, day: u32) -> Heat {
        Heat::for_count(self.count(day))
    }

    /// Calendar grid, weeks starting Sunday: one row per week, heat symbol per day.
    pub fn render(&self) -> String {
        let mut out: String = ["S", "M", "T", "W", "T", "F", "S"]
            .iter()
            .map(|d| format!("{:>3} ", d))
            .collect();
        out.push('\n');
        let offset = NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .map(|d| d.weekday().num_days_from_sunday())
            .unwrap_or(0);
        let mut column = 0;
        for _ in 0..offset {
            out.push_str("    ");
            column += 1;
        }
        for day in 1..=self.days_in_month {
            out.push_str(&format!("{:>3}{}", day, self.heat(day).symbol()));
            column += 1;
            if column % 7 == 0 {
                out.push('\n');
            }
        }
        if column % 7 != 0 {
            out.push('\n');
        }
        out
    }
}

/// Buckets `dateApplied` by local calendar day within the given month.
pub fn month_activity<Tz: TimeZone>(jobs: &[Job], year: i32, month: u32, tz: &Tz) -> MonthActivity {
    let mut counts = BTreeMap::new();
    for job in jobs {
        let local = job.date_applied.with_timezone(tz);
        if local.year() == year && local.month() == month {
            *counts.entry(local.day()).or_insert(0) += 1;
        }
    }
    MonthActivity {
        year,
        month,
        days_in_month: days_in_month(year, month),
        counts,
    }
}

pub fn current_month_activity(jobs: &[Job]) -> MonthActivity {
    let now: DateTime<Local> = Local::now();
    month_activity(jobs, now.year(), now.month(), &Local)
}

pub fn recent(jobs: &[Job]) -> &[Job] {
    &jobs[..jobs.len().min(RECENT_LIMIT)]
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(31)
}
