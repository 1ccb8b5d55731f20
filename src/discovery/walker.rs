use chrono::{DateTime, Days, Utc};

use crate::config::DATE_PLACEHOLDER;

/// Half-open range of candidate broadcast dates, one per calendar day.
///
/// Pure value: iterating never touches the network or the catalog, and
/// every call to [`DateRange::iter`] starts over from `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn iter(&self) -> DateWalk {
        DateWalk {
            next: Some(self.start),
            end: self.end,
        }
    }
}

impl IntoIterator for DateRange {
    type Item = DateTime<Utc>;
    type IntoIter = DateWalk;

    fn into_iter(self) -> DateWalk {
        self.iter()
    }
}

/// Iterator over a [`DateRange`]; yields `start`, `start + 1 day`, ... while
/// the candidate is strictly before `end`.
#[derive(Debug, Clone)]
pub struct DateWalk {
    next: Option<DateTime<Utc>>,
    end: DateTime<Utc>,
}

impl Iterator for DateWalk {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.filter(|candidate| *candidate < self.end)?;
        // checked_add_days only fails at the far end of chrono's range
        self.next = current.checked_add_days(Days::new(1));
        Some(current)
    }
}

/// Where a discovery pass starts walking.
///
/// The newest catalogued episode when there is one, otherwise the show's
/// epoch, so a first run and a steady-state run share one code path.
pub fn start_date(latest: Option<DateTime<Utc>>, epoch: DateTime<Utc>) -> DateTime<Utc> {
    latest.unwrap_or(epoch)
}

/// Candidate file URL for a broadcast date (`{date}` → `YYYY-MM-DD`).
pub fn candidate_url(template: &str, date: &DateTime<Utc>) -> String {
    template.replace(DATE_PLACEHOLDER, &date.format("%Y-%m-%d").to_string())
}

/// Broadcast date as shown in episode titles (`DD-MM-YYYY`).
pub fn display_date(date: &DateTime<Utc>) -> String {
    date.format("%d-%m-%Y").to_string()
}
