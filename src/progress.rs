//! Dashboard numbers derived from the activity map: the contribution heatmap,
//! streaks, chart series and goal percentages.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use futures_util::future::join3;
use tracing::{debug, warn};

use crate::api::{ApiClient, Transport};
use crate::models::{ActivityData, Badge, WeeklyGoal};

pub const POINTS_PER_TASK: u32 = 10;

/// Completed-task counts by calendar day.
pub type Activity = BTreeMap<NaiveDate, u32>;

/// Parses the `YYYY-MM-DD` keys of the activity payload. Malformed keys are skipped.
pub fn parse_activity(data: &ActivityData) -> Activity {
    data.activity
        .iter()
        .filter_map(|(day, count)| match NaiveDate::parse_from_str(day, "%Y-%m-%d") {
            Ok(date) => Some((date, *count)),
            Err(e) => {
                debug!(day = %day, "Skipping malformed activity key: {e}");
                None
            }
        })
        .collect()
}

/// `min(100, round(current / total * 100))`; 0 when `total` is not positive.
pub fn progress_percent(current: i64, total: i64) -> u32 {
    if total <= 0 || current <= 0 {
        return 0;
    }
    let percent = (current as f64 / total as f64 * 100.0).round();
    percent.min(100.0) as u32
}

/// Heatmap intensity: 0, 1, 2, 3 for three or four, 4 above that.
pub fn activity_level(count: u32) -> u8 {
    match count {
        0 => 0,
        1 => 1,
        2 => 2,
        3..=4 => 3,
        _ => 4,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityCell {
    pub date: NaiveDate,
    pub count: u32,
    pub level: u8,
}

/// Seven rows (one per weekday slot) by `weeks` columns, oldest column first.
/// The bottom-right cell is today.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityGrid {
    rows: Vec<Vec<ActivityCell>>,
    weeks: usize,
}

impl ActivityGrid {
    pub const DEFAULT_WEEKS: usize = 52;
    pub const DAY_LABELS: [&'static str; 7] = ["", "Mon", "", "Wed", "", "Fri", ""];

    pub fn build(activity: &Activity, today: NaiveDate, weeks: usize) -> Self {
        let rows = (0..7)
            .map(|row| {
                (0..weeks)
                    .map(|col| {
                        let days_back = (weeks - col - 1) * 7 + (6 - row);
                        let date = today - Duration::days(days_back as i64);
                        let count = activity.get(&date).copied().unwrap_or(0);
                        ActivityCell { date, count, level: activity_level(count) }
                    })
                    .collect()
            })
            .collect();
        Self { rows, weeks }
    }

    pub fn weeks(&self) -> usize {
        self.weeks
    }

    pub fn rows(&self) -> &[Vec<ActivityCell>] {
        &self.rows
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&ActivityCell> {
        self.rows.get(row)?.get(col)
    }

    /// Completed tasks across every cell.
    pub fn total(&self) -> u32 {
        self.rows.iter().flatten().fold(0u32, |acc, cell| acc.saturating_add(cell.count))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreakStats {
    pub current: u32,
    pub longest: u32,
    /// Active days inside the window.
    pub active_days: u32,
    /// Share of window days with activity, in percent.
    pub consistency_rate: u32,
}

impl StreakStats {
    pub const DEFAULT_WINDOW_DAYS: u32 = 30;

    /// The current streak counts back from today, or from yesterday when nothing
    /// has been logged today yet, so an unfinished day does not break it.
    pub fn from_activity(activity: &Activity, today: NaiveDate, window_days: u32) -> Self {
        let active = |date: NaiveDate| activity.get(&date).is_some_and(|count| *count > 0);

        let mut cursor = if active(today) { today } else { today - Duration::days(1) };
        let mut current = 0;
        while active(cursor) {
            current += 1;
            cursor -= Duration::days(1);
        }

        let mut longest = 0;
        let mut run = 0;
        let mut previous: Option<NaiveDate> = None;
        for (&date, _) in activity.iter().filter(|(_, count)| **count > 0) {
            run = match previous {
                Some(prev) if date - prev == Duration::days(1) => run + 1,
                _ => 1,
            };
            longest = longest.max(run);
            previous = Some(date);
        }

        let window_start = today - Duration::days(i64::from(window_days.max(1)) - 1);
        let active_days = activity
            .range(window_start..=today)
            .filter(|(_, count)| **count > 0)
            .count() as u32;

        Self {
            current,
            longest: longest.max(current),
            active_days,
            consistency_rate: progress_percent(i64::from(active_days), i64::from(window_days)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyTotal {
    /// Short month name, e.g. `Oct`.
    pub label: String,
    pub year: i32,
    pub month: u32,
    pub completed: u32,
}

/// Completed tasks per calendar month for the `months` months ending with
/// today's, oldest first.
pub fn monthly_totals(activity: &Activity, today: NaiveDate, months: u32) -> Vec<MonthlyTotal> {
    let mut year = today.year();
    let mut month = today.month();
    let mut totals = Vec::with_capacity(months as usize);
    for _ in 0..months {
        let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
            break;
        };
        let completed = activity
            .iter()
            .filter(|(date, _)| date.year() == year && date.month() == month)
            .fold(0u32, |acc, (_, count)| acc.saturating_add(*count));
        totals.push(MonthlyTotal { label: first.format("%b").to_string(), year, month, completed });
        if month == 1 {
            year -= 1;
            month = 12;
        } else {
            month -= 1;
        }
    }
    totals.reverse();
    totals
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklyPoints {
    /// `Week 1` is the oldest week.
    pub label: String,
    pub points: u32,
}

/// Points earned per seven-day block for the `weeks` blocks ending today.
pub fn weekly_points(activity: &Activity, today: NaiveDate, weeks: u32) -> Vec<WeeklyPoints> {
    (0..weeks)
        .map(|week| {
            let end = today - Duration::days(i64::from(weeks - week - 1) * 7);
            let start = end - Duration::days(6);
            let completed = activity.range(start..=end).fold(0u32, |acc, (_, count)| acc.saturating_add(*count));
            WeeklyPoints { label: format!("Week {}", week + 1), points: completed.saturating_mul(POINTS_PER_TASK) }
        })
        .collect()
}

/// Badge catalog shown when the server has none to offer; nothing is earned.
pub fn default_badges() -> Vec<Badge> {
    [
        ("bronze", "First Steps", "Complete your first task"),
        ("silver", "Week Warrior", "7-day streak"),
        ("gold", "Gold Standard", "Earn 1000 points"),
        ("platinum", "Platinum Pro", "30-day streak"),
        ("diamond", "Diamond Elite", "100-day streak"),
    ]
    .into_iter()
    .map(|(kind, name, description)| Badge {
        kind: kind.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        is_earned: false,
    })
    .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dashboard {
    /// `None` when the activity call failed.
    pub activity: Option<Activity>,
    pub badges: Vec<Badge>,
    pub goals: Vec<WeeklyGoal>,
}

impl Dashboard {
    pub fn grid(&self, today: NaiveDate, weeks: usize) -> ActivityGrid {
        ActivityGrid::build(&self.activity_or_empty(), today, weeks)
    }

    pub fn streak(&self, today: NaiveDate) -> StreakStats {
        StreakStats::from_activity(&self.activity_or_empty(), today, StreakStats::DEFAULT_WINDOW_DAYS)
    }

    pub fn earned_badges(&self) -> usize {
        self.badges.iter().filter(|badge| badge.is_earned).count()
    }

    fn activity_or_empty(&self) -> Activity {
        self.activity.clone().unwrap_or_default()
    }
}

/// Fetches activity, badges and goals concurrently. Each part degrades on its
/// own: a failed call never blanks the others.
pub async fn load_dashboard<T: Transport>(api: &ApiClient<T>) -> Dashboard {
    let (activity, badges, goals) = join3(api.activity(), api.badges(), api.goals()).await;

    let activity = match activity {
        Ok(data) => Some(parse_activity(&data)),
        Err(e) => {
            warn!("Activity unavailable: {e}");
            None
        }
    };
    let badges = match badges {
        Ok(badges) if !badges.is_empty() => badges,
        Ok(_) => default_badges(),
        Err(e) => {
            warn!("Badges unavailable, showing the catalog: {e}");
            default_badges()
        }
    };
    let goals = goals.unwrap_or_else(|e| {
        warn!("Weekly goals unavailable: {e}");
        Vec::new()
    });

    Dashboard { activity, badges, goals }
}
