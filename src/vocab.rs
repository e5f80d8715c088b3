use std::collections::HashSet;

use chrono::{DateTime, NaiveDate};

use crate::freq::Field;
use crate::load::Record;

// Gap marker for days without any records in the daily series.
pub const DAY_GAP_SENTINEL: i64 = -10;

pub const ADOPTION_MARKS: [usize; 3] = [1000, 2000, 3000];

// Cumulative distinct-key count after each record, starting at 0.
// Empty keys contribute no step at all.
pub fn growth_series(records: &[Record], field: Field) -> Vec<i64> {
    let mut vocabulary = HashSet::new();
    let mut series = vec![0i64];
    for record in records {
        let key = field.get(record);
        if key.is_empty() {
            continue;
        }
        let last = *series.last().unwrap();
        if vocabulary.insert(key.to_string()) {
            series.push(last + 1);
        } else {
            series.push(last);
        }
    }
    series
}

fn local_day(record: &Record) -> NaiveDate {
    DateTime::from_timestamp(record.realtime as i64, 0)
        .expect("record timestamp out of range")
        .date_naive()
}

// Same series bucketed into one-day windows: the count resets to zero at
// each day boundary, and a day without records yields a single sentinel
// point instead of interpolation.
pub fn daily_growth_series(records: &[Record], field: Field) -> Vec<i64> {
    let mut series = Vec::new();
    let mut vocabulary = HashSet::new();
    let mut current_day: Option<NaiveDate> = None;
    let mut count = 0i64;

    for record in records {
        let key = field.get(record);
        if key.is_empty() {
            continue;
        }
        let day = local_day(record);
        let new_window = match current_day {
            None => true,
            Some(previous) if day > previous => {
                let mut gap = previous.succ_opt().expect("date out of range");
                while gap < day {
                    series.push(DAY_GAP_SENTINEL);
                    gap = gap.succ_opt().expect("date out of range");
                }
                true
            }
            _ => false,
        };
        if new_window {
            vocabulary.clear();
            count = 0;
            series.push(0);
            current_day = Some(day);
        }
        if vocabulary.insert(key.to_string()) {
            count += 1;
        }
        series.push(count);
    }
    series
}

#[derive(Debug)]
pub struct AdoptionRates {
    // vocabulary size at the mark, divided by the mark
    pub at_mark: Vec<(usize, f64)>,
    // new keys adopted past the mark, divided by the steps past it
    pub after_mark: Vec<(usize, f64)>,
}

pub fn adoption_rates(series: &[i64]) -> AdoptionRates {
    let steps = series.len() - 1;
    let final_size = *series.last().unwrap();
    let mut at_mark = Vec::new();
    let mut after_mark = Vec::new();
    for mark in ADOPTION_MARKS {
        if steps >= mark {
            at_mark.push((mark, series[mark] as f64 / mark as f64));
        }
        if steps > mark {
            let adopted = (final_size - series[mark]) as f64;
            after_mark.push((mark, adopted / (steps - mark) as f64));
        }
    }
    AdoptionRates { at_mark, after_mark }
}
