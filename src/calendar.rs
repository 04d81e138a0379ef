use std::collections::HashMap;

use chrono::{Datelike, Duration, Months, NaiveDate};

use crate::task::Task;

/// One cell of the month grid
#[derive(Debug, Clone)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub in_month: bool,
    pub tasks: Vec<Task>,
}

impl CalendarDay {
    pub fn has_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }
}

/// The month being displayed and its neighbours, for navigation links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthView {
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
    pub prev: (i32, u32),
    pub next: (i32, u32),
}

impl MonthView {
    /// Resolve a year/month pair. Either one missing, or an impossible month,
    /// falls back to the month containing `today`.
    pub fn resolve(year: Option<i32>, month: Option<u32>, today: NaiveDate) -> Self {
        let first_day = match (year, month) {
            (Some(y), Some(m)) => NaiveDate::from_ymd_opt(y, m, 1),
            _ => None,
        }
        .unwrap_or_else(|| today.with_day(1).unwrap_or(today));

        let next_first = first_day + Months::new(1);
        let prev_first = first_day - Months::new(1);

        Self {
            first_day,
            last_day: next_first - Duration::days(1),
            prev: (prev_first.year(), prev_first.month()),
            next: (next_first.year(), next_first.month()),
        }
    }

    pub fn title(&self) -> String {
        self.first_day.format("%B %Y").to_string()
    }
}

/// Group tasks by due date; undated tasks are left out.
pub fn group_by_due_date(tasks: Vec<Task>) -> HashMap<NaiveDate, Vec<Task>> {
    let mut map: HashMap<NaiveDate, Vec<Task>> = HashMap::new();
    for task in tasks {
        if let Some(date) = task.due_date {
            map.entry(date).or_default().push(task);
        }
    }
    map
}

/// Build the week rows for the month starting at `first_day_of_month`.
///
/// Weeks start on Sunday and there are at most six of them. A trailing week
/// made up only of next-month days is dropped.
pub fn generate_calendar(
    first_day_of_month: NaiveDate,
    task_map: &HashMap<NaiveDate, Vec<Task>>,
) -> Vec<Vec<CalendarDay>> {
    let offset = first_day_of_month.weekday().num_days_from_sunday() as i64;
    let mut current = first_day_of_month - Duration::days(offset);
    let mut weeks = Vec::new();

    for _ in 0..6 {
        let mut row = Vec::with_capacity(7);
        let mut has_current_or_previous = false;

        for _ in 0..7 {
            let in_month = current.month() == first_day_of_month.month()
                && current.year() == first_day_of_month.year();
            if in_month || current < first_day_of_month {
                has_current_or_previous = true;
            }

            row.push(CalendarDay {
                date: current,
                in_month,
                tasks: task_map.get(&current).cloned().unwrap_or_default(),
            });
            current += Duration::days(1);
        }

        if has_current_or_previous {
            weeks.push(row);
        }
    }

    weeks
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weeks_start_on_sunday() {
        // March 2025 starts on a Saturday
        let weeks = generate_calendar(date(2025, 3, 1), &HashMap::new());
        assert_eq!(weeks[0][0].date, date(2025, 2, 23));
        assert_eq!(weeks[0][0].date.weekday(), Weekday::Sun);
        assert!(!weeks[0][0].in_month);
        assert!(weeks[0][6].in_month);
        // 1 leading row + 30 more days spills into a sixth row
        assert_eq!(weeks.len(), 6);
        assert!(weeks.iter().all(|w| w.len() == 7));
    }

    #[test]
    fn test_next_month_only_week_is_dropped() {
        // February 2026: Sunday the 1st through Saturday the 28th, exactly four rows
        let weeks = generate_calendar(date(2026, 2, 1), &HashMap::new());
        assert_eq!(weeks.len(), 4);
        assert_eq!(weeks[3][6].date, date(2026, 2, 28));
    }

    #[test]
    fn test_tasks_land_on_their_day() {
        let tasks = vec![
            Task::new("a", "", Some(date(2025, 3, 14))),
            Task::new("b", "", Some(date(2025, 3, 14))),
            Task::new("c", "", None),
        ];
        let map = group_by_due_date(tasks);
        let weeks = generate_calendar(date(2025, 3, 1), &map);

        let day = weeks
            .iter()
            .flatten()
            .find(|d| d.date == date(2025, 3, 14))
            .unwrap();
        assert_eq!(day.tasks.len(), 2);
        assert_eq!(weeks.iter().flatten().filter(|d| d.has_tasks()).count(), 1);
    }

    #[test]
    fn test_month_view_navigation() {
        let view = MonthView::resolve(Some(2025), Some(1), date(2030, 6, 6));
        assert_eq!(view.first_day, date(2025, 1, 1));
        assert_eq!(view.last_day, date(2025, 1, 31));
        assert_eq!(view.prev, (2024, 12));
        assert_eq!(view.next, (2025, 2));
        assert_eq!(view.title(), "January 2025");
    }

    #[test]
    fn test_month_view_falls_back_to_today() {
        let today = date(2025, 7, 19);
        assert_eq!(MonthView::resolve(None, Some(3), today).first_day, date(2025, 7, 1));
        assert_eq!(MonthView::resolve(Some(2025), Some(13), today).first_day, date(2025, 7, 1));
    }
}
