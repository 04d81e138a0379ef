use chrono::NaiveDate;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Task {
    pub id: Option<i64>,
    pub title: String,
    pub description: String,
    pub due_date: Option<NaiveDate>,
}

impl Task {
    pub fn new(title: impl Into<String>, description: impl Into<String>, due_date: Option<NaiveDate>) -> Self {
        Self {
            id: None,
            title: title.into(),
            description: description.into(),
            due_date,
        }
    }

    pub fn due_date_string(&self) -> String {
        self.due_date
            .map(|d| d.format(DATE_FORMAT).to_string())
            .unwrap_or_default()
    }
}

/// Parse a `YYYY-MM-DD` form value; blank or malformed input yields `None`.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(input, DATE_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2025-03-09"), NaiveDate::from_ymd_opt(2025, 3, 9));
        assert_eq!(parse_date("  "), None);
        assert_eq!(parse_date("09/03/2025"), None);
    }

    #[test]
    fn test_due_date_string() {
        let task = Task::new("Read", "", NaiveDate::from_ymd_opt(2025, 1, 2));
        assert_eq!(task.due_date_string(), "2025-01-02");
        assert_eq!(Task::default().due_date_string(), "");
    }
}
