use std::collections::HashMap;

use crate::load::Record;

// Which record field an aggregation keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Command,
    CmdLine,
}

impl Field {
    pub fn get<'a>(&self, record: &'a Record) -> &'a str {
        match self {
            Field::Command => &record.command,
            Field::CmdLine => &record.cmd_line,
        }
    }
}

#[derive(Debug)]
pub struct FrequencyTable {
    pub counts: HashMap<String, u64>,
    pub total: u64,
}

impl FrequencyTable {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Record>, field: Field) -> Self {
        let mut counts = HashMap::new();
        let mut total = 0;
        for record in records {
            let key = field.get(record);
            if key.is_empty() {
                continue;
            }
            *counts.entry(key.to_string()).or_insert(0) += 1;
            total += 1;
        }
        FrequencyTable { counts, total }
    }

    // Rank order: count descending, ties lexicographic ascending.
    pub fn ranked(&self) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> = self
            .counts
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }

    // Share of all occurrences covered by the top `fraction` of distinct keys.
    pub fn coverage_percent(&self, fraction: f64) -> f64 {
        let ranked = self.ranked();
        let take = (fraction * ranked.len() as f64) as usize;
        let covered: u64 = ranked.iter().take(take).map(|(_, count)| count).sum();
        100.0 * covered as f64 / self.total as f64
    }
}

// Counts divided by the top count; the first entry is always 1.0.
// Panics on an empty ranking, matching the fatal empty-partition behavior.
pub fn normalized(ranked: &[(String, u64)], top: usize) -> Vec<f64> {
    let truncated = &ranked[..ranked.len().min(top)];
    let max = truncated[0].1 as f64;
    truncated.iter().map(|(_, count)| *count as f64 / max).collect()
}

// Reference geometric series: f(rank) = 2^-(rank-1).
pub fn zipf(len: usize) -> Vec<f64> {
    (0..len).map(|x| 1.0 / 2f64.powi(x as i32)).collect()
}

pub fn top_commands(records: &[Record], field: Field, n: usize) -> Vec<(String, u64)> {
    let mut ranked = FrequencyTable::from_records(records, field).ranked();
    ranked.truncate(n);
    ranked
}

pub fn trim_label(text: &str, length: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() > length {
        let mut out: String = chars[..length - 1].iter().collect();
        out.push('…');
        return out;
    }
    text.to_string()
}
