use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::model::ChartData;
use crate::util::round_to;


/// Number of calendar months shown in trend charts, the current one included.
pub(crate) const TREND_MONTHS: u32 = 6;

const MONTH_ABBREVIATIONS: [&'static str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun",
    "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub(crate) struct MonthBucket {
    year: i32,
    month: u32,
}

/// Consecutive month buckets, oldest first.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct MonthWindow {
    buckets: Vec<MonthBucket>,
}

/// Running sums of amounts per bucket of a window.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct MonthlyTotals {
    window: MonthWindow,
    totals: Vec<f64>,
}


impl MonthBucket {
    pub fn of(instant: DateTime<Utc>) -> MonthBucket {
        MonthBucket {
            year: instant.year(),
            month: instant.month(),
        }
    }

    pub fn previous(&self) -> MonthBucket {
        if self.month == 1 {
            MonthBucket { year: self.year - 1, month: 12 }
        } else {
            MonthBucket { year: self.year, month: self.month - 1 }
        }
    }

    pub fn next(&self) -> MonthBucket {
        if self.month == 12 {
            MonthBucket { year: self.year + 1, month: 1 }
        } else {
            MonthBucket { year: self.year, month: self.month + 1 }
        }
    }

    /// Midnight UTC on the first day of the month.
    pub fn start(&self) -> DateTime<Utc> {
        let first = NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("month buckets always name a valid month");
        Utc.from_utc_datetime(&first)
    }

    pub fn label(&self) -> &'static str {
        MONTH_ABBREVIATIONS[(self.month - 1) as usize]
    }
}

impl MonthWindow {
    /// The `count` months ending with the one containing `now`.
    pub fn trailing(now: DateTime<Utc>, count: u32) -> MonthWindow {
        let mut buckets = Vec::with_capacity(count as usize);
        let mut bucket = MonthBucket::of(now);
        for _ in 0..count.max(1) {
            buckets.push(bucket);
            bucket = bucket.previous();
        }
        buckets.reverse();
        MonthWindow { buckets }
    }

    pub fn current(now: DateTime<Utc>) -> MonthWindow {
        MonthWindow::trailing(now, 1)
    }

    pub fn buckets(&self) -> &[MonthBucket] { &self.buckets }

    pub fn start(&self) -> DateTime<Utc> {
        self.buckets[0].start()
    }

    /// Start of the month after the latest bucket; exclusive.
    pub fn end(&self) -> DateTime<Utc> {
        self.buckets[self.buckets.len() - 1].next().start()
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start() <= instant && instant < self.end()
    }

    pub fn position(&self, instant: DateTime<Utc>) -> Option<usize> {
        if !self.contains(instant) {
            return None;
        }
        let bucket = MonthBucket::of(instant);
        self.buckets.iter().position(|b| *b == bucket)
    }
}

impl MonthlyTotals {
    pub fn new(window: MonthWindow) -> MonthlyTotals {
        let totals = vec![0.0; window.buckets().len()];
        MonthlyTotals { window, totals }
    }

    /// Adds `amount` to the bucket of `instant`; instants outside the window are ignored.
    pub fn add(&mut self, instant: DateTime<Utc>, amount: f64) -> bool {
        match self.window.position(instant) {
            Some(index) => {
                self.totals[index] += amount;
                true
            },
            None => false,
        }
    }

    pub fn into_chart(self) -> ChartData {
        ChartData {
            months: self.window.buckets().iter().map(|b| b.label().to_owned()).collect(),
            sales: self.totals.iter().map(|t| round_to(*t, 2)).collect(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn six_buckets_ending_now() {
        let window = MonthWindow::trailing(at(2026, 10, 18), TREND_MONTHS);
        let keys: Vec<(i32, u32)> = window.buckets().iter().map(|b| (b.year, b.month)).collect();
        assert_eq!(keys, vec![(2026, 5), (2026, 6), (2026, 7), (2026, 8), (2026, 9), (2026, 10)]);
    }

    #[test]
    fn buckets_wrap_the_year() {
        let window = MonthWindow::trailing(at(2026, 2, 28), TREND_MONTHS);
        let keys: Vec<(i32, u32)> = window.buckets().iter().map(|b| (b.year, b.month)).collect();
        assert_eq!(keys, vec![(2025, 9), (2025, 10), (2025, 11), (2025, 12), (2026, 1), (2026, 2)]);
        assert_eq!(window.start(), Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap());
        assert_eq!(window.end(), Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn december_window_ends_in_january() {
        let window = MonthWindow::current(at(2026, 12, 31));
        assert_eq!(window.buckets().len(), 1);
        assert_eq!(window.end(), Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn window_bounds_are_half_open() {
        let window = MonthWindow::trailing(at(2026, 10, 18), TREND_MONTHS);
        assert!(window.contains(Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap()));
        assert!(!window.contains(Utc.with_ymd_and_hms(2026, 4, 30, 23, 59, 59).unwrap()));
        assert!(!window.contains(Utc.with_ymd_and_hms(2026, 11, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn totals_keep_empty_months() {
        let mut totals = MonthlyTotals::new(MonthWindow::trailing(at(2026, 10, 18), TREND_MONTHS));
        assert!(totals.add(at(2026, 10, 1), 10.004));
        assert!(totals.add(at(2026, 10, 2), 5.0));
        assert!(totals.add(at(2026, 7, 9), 1.5));
        assert!(!totals.add(at(2025, 10, 9), 100.0));

        let chart = totals.into_chart();
        assert_eq!(chart.months, vec!["May", "Jun", "Jul", "Aug", "Sep", "Oct"]);
        assert_eq!(chart.sales, vec![0.0, 0.0, 1.5, 0.0, 0.0, 15.0]);
    }
}
