//! Time bucketing and report-history helpers.
//!
//! All report timestamps are naive local time. Buckets are calendar aligned:
//! the catalogue keeps one report per hour/day/month window for the UI
//! timeline, and cleanup keeps the first report of each calendar day beyond
//! the fresh window.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Retention, DATE_FORMAT};

lazy_static! {
    static ref REPORT_FILE: Regex =
        Regex::new(r"^index_(\d{4})(\d{2})(\d{2})(\d{2})(\d{2})(\d{2})\.json$").unwrap();
}

/// One entry of `history.json` / `filtered_history.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub report_time: String,
    pub report_path: String,
}

/// A snapshot file with its timestamp parsed out of the filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub time: NaiveDateTime,
    pub path: String,
}

/// Parse the timestamp out of a snapshot filename, or `None` when the name
/// does not follow the `index_<YYYYMMDDhhmmss>.json` template.
pub fn report_time(file_name: &str) -> Option<NaiveDateTime> {
    let captures = REPORT_FILE.captures(file_name)?;
    let field = |i: usize| captures[i].parse::<u32>().unwrap_or(0);
    let date = NaiveDate::from_ymd_opt(field(1) as i32, field(2), field(3))?;
    date.and_hms_opt(field(4), field(5), field(6))
}

pub fn report(file_name: &str) -> Option<Report> {
    report_time(file_name).map(|time| Report {
        time,
        path: file_name.to_string(),
    })
}

/// The `history.json` form of a snapshot filename.
pub fn history_entry(file_name: &str) -> Option<HistoryEntry> {
    report_time(file_name).map(|time| HistoryEntry {
        report_time: time.format(DATE_FORMAT).to_string(),
        report_path: file_name.to_string(),
    })
}

pub fn hour_start(t: NaiveDateTime) -> NaiveDateTime {
    t.date().and_hms_opt(t.hour(), 0, 0).expect("whole hour is valid")
}

pub fn day_start(t: NaiveDateTime) -> NaiveDateTime {
    t.date().and_hms_opt(0, 0, 0).expect("midnight is valid")
}

pub fn month_start(t: NaiveDateTime) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(t.year(), t.month(), 1)
        .expect("first of month is valid")
        .and_hms_opt(0, 0, 0)
        .expect("midnight is valid")
}

pub fn year_start(t: NaiveDateTime) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(t.year(), 1, 1)
        .expect("first of year is valid")
        .and_hms_opt(0, 0, 0)
        .expect("midnight is valid")
}

/// Calendar-correct month addition; a negative amount subtracts. Only
/// start-of-bucket values are passed here, so the day of month always stays
/// valid.
pub fn add_months(t: NaiveDateTime, amount: i32) -> NaiveDateTime {
    let months = t.year() * 12 + t.month() as i32 - 1 + amount;
    let year = months.div_euclid(12);
    let month = (months.rem_euclid(12) + 1) as u32;
    NaiveDate::from_ymd_opt(year, month, t.day())
        .expect("month addition keeps a valid day")
        .and_time(t.time())
}

fn shift_hour(now: NaiveDateTime, offset: i64) -> NaiveDateTime {
    hour_start(now) + Duration::hours(offset)
}

fn shift_day(now: NaiveDateTime, offset: i64) -> NaiveDateTime {
    day_start(now) + Duration::days(offset)
}

fn shift_month(now: NaiveDateTime, offset: i32) -> NaiveDateTime {
    add_months(month_start(now), offset)
}

struct Bucketed<'a> {
    time: NaiveDateTime,
    item: &'a HistoryEntry,
}

fn add_filtered<'a>(
    filtered: &mut HashMap<NaiveDateTime, Bucketed<'a>>,
    item_key: NaiveDateTime,
    report_time: NaiveDateTime,
    item: &'a HistoryEntry,
    min_time: Option<NaiveDateTime>,
) {
    if let Some(min_time) = min_time {
        if item_key < min_time {
            return;
        }
    }
    match filtered.get(&item_key) {
        Some(existing) if existing.time <= report_time => {}
        _ => {
            filtered.insert(item_key, Bucketed { time: report_time, item });
        }
    }
}

/// Sparsify the full report history for UI timelines: one report per hour for
/// the last `filtered_hours` hours, one per day for the last `filtered_days`
/// days, one per month for the last `filtered_months` months, and one per
/// year without a cutoff. Each bucket keeps its earliest report, and the
/// newest report is always included.
pub fn filtered_history(
    history: &[HistoryEntry],
    retention: &Retention,
    now: NaiveDateTime,
) -> Result<Vec<HistoryEntry>, Error> {
    let Some(latest) = history.first() else {
        return Ok(Vec::new());
    };

    let mut filtered: HashMap<NaiveDateTime, Bucketed> = HashMap::new();
    for item in history {
        let report_time = NaiveDateTime::parse_from_str(&item.report_time, DATE_FORMAT)
            .map_err(|err| Error::Invalid(format!("bad report time {:?}: {err}", item.report_time)))?;

        add_filtered(
            &mut filtered,
            hour_start(report_time),
            report_time,
            item,
            Some(shift_hour(now, -retention.filtered_hours)),
        );
        add_filtered(
            &mut filtered,
            day_start(report_time),
            report_time,
            item,
            Some(shift_day(now, -retention.filtered_days)),
        );
        add_filtered(
            &mut filtered,
            month_start(report_time),
            report_time,
            item,
            Some(shift_month(now, -(retention.filtered_months))),
        );
        // All years are represented.
        add_filtered(&mut filtered, year_start(report_time), report_time, item, None);
    }

    // The latest report is always part of the filtered history.
    let mut unique: BTreeMap<String, &HistoryEntry> = BTreeMap::new();
    unique.insert(latest.report_time.clone(), latest);
    for bucketed in filtered.values() {
        unique.insert(bucketed.item.report_time.clone(), bucketed.item);
    }

    let mut result: Vec<HistoryEntry> = unique.into_values().cloned().collect();
    result.sort_by(|a, b| b.report_time.cmp(&a.report_time));
    Ok(result)
}

/// Paths of the snapshots that cleanup must not remove: everything newer than
/// `fresh_time`, the earliest snapshot of each older calendar day, and the
/// most recent snapshot unconditionally. `reports` is sorted newest first.
pub fn reports_to_keep(reports: &[Report], fresh_time: NaiveDateTime) -> BTreeSet<String> {
    let Some(latest) = reports.first() else {
        return BTreeSet::new();
    };

    let mut keep: BTreeMap<NaiveDateTime, &str> = BTreeMap::new();
    keep.insert(latest.time, latest.path.as_str());

    let mut first_of_day: HashMap<NaiveDateTime, &Report> = HashMap::new();
    for report in reports {
        if report.time >= fresh_time {
            keep.insert(report.time, report.path.as_str());
        } else {
            let key = day_start(report.time);
            match first_of_day.get(&key) {
                Some(existing) if existing.time <= report.time => {}
                _ => {
                    first_of_day.insert(key, report);
                }
            }
        }
    }
    for report in first_of_day.into_values() {
        keep.insert(report.time, report.path.as_str());
    }

    keep.into_values().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn entry(time: &str) -> HistoryEntry {
        let parsed = at(time);
        HistoryEntry {
            report_time: time.to_string(),
            report_path: format!("index_{}.json", parsed.format("%Y%m%d%H%M%S")),
        }
    }

    #[test]
    fn bucket_starts() {
        let t = at("2024-03-15 13:45:59");
        assert_eq!(hour_start(t), at("2024-03-15 13:00:00"));
        assert_eq!(day_start(t), at("2024-03-15 00:00:00"));
        assert_eq!(month_start(t), at("2024-03-01 00:00:00"));
        assert_eq!(year_start(t), at("2024-01-01 00:00:00"));
    }

    #[test]
    fn month_addition_is_calendar_correct() {
        assert_eq!(add_months(at("2024-03-01 00:00:00"), 10), at("2025-01-01 00:00:00"));
        assert_eq!(add_months(at("2024-03-01 00:00:00"), -3), at("2023-12-01 00:00:00"));
        assert_eq!(add_months(at("2024-01-01 00:00:00"), -12), at("2023-01-01 00:00:00"));
        assert_eq!(add_months(at("2024-01-01 00:00:00"), -13), at("2022-12-01 00:00:00"));
    }

    #[test]
    fn report_filename_round_trip() {
        let time = report_time("index_20240315134559.json").unwrap();
        assert_eq!(time, at("2024-03-15 13:45:59"));
        assert_eq!(report_time("index.json"), None);
        assert_eq!(report_time("index_2024031513455.json"), None);
        assert_eq!(
            history_entry("index_20240315134559.json").unwrap(),
            entry("2024-03-15 13:45:59"),
        );
    }

    #[test]
    fn filtered_history_keeps_earliest_per_bucket_and_the_newest() {
        let now = at("2024-03-15 15:30:00");
        // Newest first, as in history.json.
        let history = vec![
            entry("2024-03-15 15:10:00"),
            entry("2024-03-15 15:05:00"),
            entry("2024-03-15 14:20:00"),
            entry("2024-03-10 08:00:00"),
            entry("2024-03-10 06:00:00"),
            entry("2022-07-01 12:00:00"),
            entry("2022-05-01 12:00:00"),
        ];
        let retention = Retention::default();
        let filtered = filtered_history(&history, &retention, now).unwrap();
        let times: Vec<&str> = filtered.iter().map(|e| e.report_time.as_str()).collect();
        assert_eq!(
            times,
            vec![
                // Newest is always kept even though 15:05 wins its hour bucket.
                "2024-03-15 15:10:00",
                "2024-03-15 15:05:00",
                "2024-03-15 14:20:00",
                // Daily bucket for March 10 keeps the earliest report.
                "2024-03-10 06:00:00",
                // 2022 is outside every window but year buckets have no cutoff.
                "2022-05-01 12:00:00",
            ]
        );
    }

    #[test]
    fn filtered_history_output_is_newest_first() {
        let now = at("2024-03-15 15:30:00");
        let history = vec![
            entry("2024-03-15 15:10:00"),
            entry("2024-03-14 10:00:00"),
            entry("2024-02-01 10:00:00"),
        ];
        let filtered = filtered_history(&history, &Retention::default(), now).unwrap();
        assert!(filtered.windows(2).all(|w| w[0].report_time >= w[1].report_time));
        assert_eq!(filtered[0], history[0]);
    }

    #[test]
    fn reports_to_keep_matches_cleanup_rules() {
        // Mirrors the cleanup scenario: one fresh snapshot, two on the same
        // day 40 days back, one 41 days back, two on the same day long ago.
        let now = at("2024-03-15 12:00:00");
        let fresh_time = day_start(now) - Duration::days(30);
        let reports: Vec<Report> = [
            "index_20240315120000.json",
            "index_20240204150000.json",
            "index_20240204090000.json",
            "index_20240203100000.json",
            "index_20230103170000.json",
            "index_20230103080000.json",
        ]
        .iter()
        .map(|name| report(name).unwrap())
        .collect();

        let keep = reports_to_keep(&reports, fresh_time);
        assert_eq!(
            keep.iter().cloned().collect::<Vec<_>>(),
            vec![
                "index_20230103080000.json",
                "index_20240203100000.json",
                "index_20240204090000.json",
                "index_20240315120000.json",
            ]
        );
    }

    #[test]
    fn latest_report_survives_even_when_stale() {
        let now = at("2024-03-15 12:00:00");
        let fresh_time = day_start(now) - Duration::days(30);
        let reports = vec![
            report("index_20230601120000.json").unwrap(),
            report("index_20230601080000.json").unwrap(),
        ];
        let keep = reports_to_keep(&reports, fresh_time);
        // The noon report is the most recent snapshot, the morning one is the
        // first of its day.
        assert!(keep.contains("index_20230601120000.json"));
        assert!(keep.contains("index_20230601080000.json"));
    }
}
