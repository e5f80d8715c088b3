use crate::load::Strategy;

// Histograms over match distance for one strategy, length `size`.
// Totals count every successful match, even past the histogram range.
#[derive(Debug)]
pub struct StrategyCurves {
    pub title: String,
    pub data_point_count: usize,
    pub matches: Vec<u64>,
    pub matches_total: u64,
    pub chars_recalled: Vec<u64>,
    pub chars_recalled_total: u64,
}

impl StrategyCurves {
    pub fn from_matches(strategy: &Strategy, size: usize) -> Self {
        let mut curves = StrategyCurves {
            title: strategy.title.clone(),
            data_point_count: 0,
            matches: vec![0; size],
            matches_total: 0,
            chars_recalled: vec![0; size],
            chars_recalled_total: 0,
        };
        for outcome in &strategy.matches {
            curves.data_point_count += 1;
            if !outcome.matched {
                continue;
            }
            curves.chars_recalled_total += outcome.chars_recalled;
            curves.matches_total += 1;
            if outcome.distance > size {
                continue;
            }
            curves.matches[outcome.distance - 1] += 1;
            curves.chars_recalled[outcome.distance - 1] += outcome.chars_recalled;
        }
        curves
    }

    // Prefix variant: sums strictly increasing characters-recalled deltas
    // within each data point's ordered partial matches.
    pub fn from_prefix_matches(strategy: &Strategy, size: usize) -> Self {
        let mut curves = StrategyCurves {
            title: strategy.title.clone(),
            data_point_count: 0,
            matches: vec![0; size],
            matches_total: 0,
            chars_recalled: vec![0; size],
            chars_recalled_total: 0,
        };
        for multi_match in &strategy.prefix_matches {
            curves.data_point_count += 1;
            if !multi_match.matched {
                continue;
            }
            curves.matches_total += 1;
            let mut last_chars_recalled = 0;
            for entry in &multi_match.entries {
                let chars = entry.chars_recalled;
                let increase = chars as i64 - last_chars_recalled as i64;
                assert!(
                    increase > 0,
                    "prefix matches of <{}> must recall strictly more characters per entry",
                    strategy.title
                );
                curves.chars_recalled_total += increase as u64;
                if entry.distance <= size {
                    curves.chars_recalled[entry.distance - 1] += increase as u64;
                }
                last_chars_recalled = chars;
            }
        }
        curves
    }

    pub fn match_percent(&self, cumulative: bool) -> Vec<f64> {
        percent_curve(&self.matches, self.data_point_count, cumulative)
    }

    pub fn chars_recalled_average(&self, cumulative: bool) -> Vec<f64> {
        average_curve(&self.chars_recalled, self.data_point_count, cumulative)
    }
}

fn running_sum(values: &[u64]) -> Vec<u64> {
    let mut acc = 0;
    values
        .iter()
        .map(|value| {
            acc += value;
            acc
        })
        .collect()
}

pub fn percent_curve(histogram: &[u64], data_point_count: usize, cumulative: bool) -> Vec<f64> {
    let values = if cumulative {
        running_sum(histogram)
    } else {
        histogram.to_vec()
    };
    values
        .iter()
        .map(|value| 100.0 * *value as f64 / data_point_count as f64)
        .collect()
}

pub fn average_curve(histogram: &[u64], data_point_count: usize, cumulative: bool) -> Vec<f64> {
    let values = if cumulative {
        running_sum(histogram)
    } else {
        histogram.to_vec()
    };
    values
        .iter()
        .map(|value| *value as f64 / data_point_count as f64)
        .collect()
}

// `recent` is simple enough to trust: its totals are the ground truth for
// the maximum achievable recurrence rate and average recall.
fn recent_curves<'a>(all: &'a [StrategyCurves]) -> &'a StrategyCurves {
    all.iter()
        .find(|curves| curves.title == "recent")
        .expect("strategy 'recent' missing from the input")
}

pub fn max_recurrence_rate(all: &[StrategyCurves]) -> f64 {
    let recent = recent_curves(all);
    100.0 * recent.matches_total as f64 / recent.data_point_count as f64
}

pub fn max_average_recall(all: &[StrategyCurves]) -> f64 {
    let recent = recent_curves(all);
    recent.chars_recalled_total as f64 / recent.data_point_count as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(title: &str, outcomes: &[(bool, usize, u64)]) -> Strategy {
        let matches: Vec<String> = outcomes
            .iter()
            .map(|(matched, distance, chars)| {
                format!(
                    r#"{{"Match": {}, "Distance": {}, "CharsRecalled": {}}}"#,
                    matched, distance, chars
                )
            })
            .collect();
        let json = format!(
            r#"{{"Title": "{}", "Matches": [{}]}}"#,
            title,
            matches.join(",")
        );
        serde_json::from_str(&json).unwrap()
    }

    fn prefix_strategy(title: &str, points: &[(bool, Vec<(usize, u64)>)]) -> Strategy {
        let multi: Vec<String> = points
            .iter()
            .map(|(matched, entries)| {
                let entries: Vec<String> = entries
                    .iter()
                    .map(|(distance, chars)| {
                        format!(
                            r#"{{"Match": true, "Distance": {}, "CharsRecalled": {}}}"#,
                            distance, chars
                        )
                    })
                    .collect();
                format!(
                    r#"{{"Match": {}, "Entries": [{}]}}"#,
                    matched,
                    entries.join(",")
                )
            })
            .collect();
        let json = format!(
            r#"{{"Title": "{}", "PrefixMatches": [{}]}}"#,
            title,
            multi.join(",")
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn worked_example_histograms() {
        // distances [1, 3, 1], chars [5, 2, 5], D = 3
        let strategy = strategy("recent", &[(true, 1, 5), (true, 3, 2), (true, 1, 5)]);
        let curves = StrategyCurves::from_matches(&strategy, 3);

        assert_eq!(curves.matches, vec![2, 0, 1]);
        let averages = curves.chars_recalled_average(false);
        assert!((averages[0] - 10.0 / 3.0).abs() < 1e-9);
        assert_eq!(averages[1], 0.0);
        assert!((averages[2] - 2.0 / 3.0).abs() < 1e-9);

        let all = vec![curves];
        assert!((max_average_recall(&all) - 4.0).abs() < 1e-9);
        assert!((max_recurrence_rate(&all) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn misses_count_as_data_points_only() {
        let strategy = strategy("recent", &[(true, 1, 4), (false, 0, 0)]);
        let curves = StrategyCurves::from_matches(&strategy, 2);
        assert_eq!(curves.data_point_count, 2);
        assert_eq!(curves.matches_total, 1);
        assert_eq!(curves.match_percent(true), vec![50.0, 50.0]);
    }

    #[test]
    fn distant_matches_hit_totals_but_not_histograms() {
        let strategy = strategy("recent", &[(true, 9, 7)]);
        let curves = StrategyCurves::from_matches(&strategy, 3);
        assert_eq!(curves.matches, vec![0, 0, 0]);
        assert_eq!(curves.matches_total, 1);
        assert_eq!(curves.chars_recalled_total, 7);
    }

    #[test]
    fn cumulative_percent_is_a_running_sum() {
        let strategy = strategy(
            "frequent",
            &[(true, 1, 1), (true, 2, 1), (true, 2, 1), (false, 0, 0)],
        );
        let curves = StrategyCurves::from_matches(&strategy, 2);
        assert_eq!(curves.match_percent(false), vec![25.0, 50.0]);
        assert_eq!(curves.match_percent(true), vec![25.0, 75.0]);
    }

    #[test]
    fn prefix_matches_sum_increasing_deltas() {
        let strategy = prefix_strategy(
            "recent",
            &[(true, vec![(1, 2), (3, 6)]), (false, vec![])],
        );
        let curves = StrategyCurves::from_prefix_matches(&strategy, 3);
        // deltas: 2 at distance 1, then 4 at distance 3
        assert_eq!(curves.chars_recalled, vec![2, 0, 4]);
        assert_eq!(curves.chars_recalled_total, 6);
        assert_eq!(curves.data_point_count, 2);
    }

    #[test]
    #[should_panic(expected = "strictly more characters")]
    fn decreasing_prefix_recall_is_fatal() {
        let strategy = prefix_strategy("recent", &[(true, vec![(1, 5), (2, 3)])]);
        StrategyCurves::from_prefix_matches(&strategy, 3);
    }

    #[test]
    #[should_panic(expected = "strategy 'recent' missing")]
    fn missing_recent_strategy_is_fatal() {
        let strategy = strategy("frequent", &[(true, 1, 1)]);
        let all = vec![StrategyCurves::from_matches(&strategy, 1)];
        max_recurrence_rate(&all);
    }
}
