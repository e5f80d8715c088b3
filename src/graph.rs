use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use lazy_static::lazy_static;

use crate::load::Record;

pub const START_TOKEN: &str = "_start_";
pub const END_TOKEN: &str = "_end_";

const BASE_SCALING_FACTOR: f64 = 21.0;
// affects everything: nodes, edges, labels, the label-to-xlabel treshold
const EXTRA_SCALING_FACTOR: f64 = 1.0;
const LABEL_FONT_FLOOR: f64 = 12.0;
const RENDER_ATTEMPTS: usize = 10;
const LAYOUT_ENGINE: &str = "neato";

#[derive(Debug, Clone, Copy)]
pub struct GraphParams {
    pub node_count: usize,
    pub edge_min_value: f64,
}

// First-order Markov counts of "command A immediately followed by command B"
// within sessions, with synthetic start/end boundary tokens.
#[derive(Debug)]
pub struct TransitionTable {
    pub counts: BTreeMap<String, BTreeMap<String, u64>>,
    pub totals: BTreeMap<String, u64>,
    ids: HashMap<String, String>,
    next_id: u64,
}

impl TransitionTable {
    fn new() -> Self {
        let mut table = TransitionTable {
            counts: BTreeMap::new(),
            totals: BTreeMap::new(),
            ids: HashMap::new(),
            next_id: 0,
        };
        table.assign_id(START_TOKEN);
        table.assign_id(END_TOKEN);
        table
    }

    fn assign_id(&mut self, token: &str) {
        if !self.ids.contains_key(token) {
            self.ids.insert(token.to_string(), self.next_id.to_string());
            self.next_id += 1;
        }
    }

    pub fn from_sessions<'a>(sessions: impl IntoIterator<Item = &'a Vec<Record>>) -> Self {
        let mut table = TransitionTable::new();
        for session in sessions {
            *table.totals.entry(START_TOKEN.to_string()).or_insert(0) += 1;
            let mut prev = START_TOKEN.to_string();
            for record in session {
                let cmd = record.command.as_str();
                if cmd.is_empty() {
                    continue;
                }
                *table
                    .counts
                    .entry(prev.clone())
                    .or_insert_with(BTreeMap::new)
                    .entry(cmd.to_string())
                    .or_insert(0) += 1;
                *table.totals.entry(cmd.to_string()).or_insert(0) += 1;
                table.assign_id(cmd);
                prev = cmd.to_string();
            }
            // end the session
            *table
                .counts
                .entry(prev)
                .or_insert_with(BTreeMap::new)
                .entry(END_TOKEN.to_string())
                .or_insert(0) += 1;
            *table.totals.entry(END_TOKEN.to_string()).or_insert(0) += 1;
        }
        table
    }

    pub fn id(&self, token: &str) -> &str {
        &self.ids[token]
    }

    // The `node_count` highest-total tokens, ties lexicographic ascending.
    pub fn top_tokens(&self, node_count: usize) -> Vec<String> {
        let mut entries: Vec<(&String, &u64)> = self.totals.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        entries
            .into_iter()
            .take(node_count)
            .map(|(token, _)| token.clone())
            .collect()
    }
}

struct EdgeTier {
    min_value: f64,
    style: &'static str,
    arrowhead: Option<&'static str>,
    constraint: bool,
    labeled: bool,
    width_base: f64,
    width_slope: f64,
}

lazy_static! {
    static ref EDGE_TIERS: Vec<EdgeTier> = vec![
        EdgeTier {
            min_value: 0.5,
            style: "bold",
            arrowhead: Some("diamond"),
            constraint: true,
            labeled: true,
            width_base: 0.0,
            width_slope: 8.0,
        },
        EdgeTier {
            min_value: 0.2,
            style: "solid",
            arrowhead: Some("open"),
            constraint: true,
            labeled: true,
            width_base: 0.5,
            width_slope: 4.5,
        },
        EdgeTier {
            min_value: 0.1,
            style: "dashed",
            arrowhead: None,
            constraint: true,
            labeled: false,
            width_base: 0.5,
            width_slope: 3.5,
        },
        EdgeTier {
            min_value: -1.0,
            style: "dotted",
            arrowhead: Some("empty"),
            constraint: false,
            labeled: false,
            width_base: 0.5,
            width_slope: 2.5,
        },
    ];
}

fn tier_for(relative: f64) -> &'static EdgeTier {
    EDGE_TIERS
        .iter()
        .find(|tier| relative > tier.min_value)
        .expect("tier table covers all values")
}

fn node_statement(id: &str, token: &str, scale: f64) -> String {
    let width = 0.08 * scale;
    let fontsize = 8.5 * scale / (token.chars().count() + 3) as f64;
    let label = token.replace('\\', "\\\\").replace('"', "\\\"");
    if fontsize < LABEL_FONT_FLOOR * EXTRA_SCALING_FACTOR {
        // too small for an inner label: bare circle with an external tick
        format!(
            "    {} [label=\" \", shape=circle, fixedsize=true, fontname=\"monospace bold\", \
             width={:.4}, fontsize={:.4}, forcelabels=true, xlabel=\"{}\"];\n",
            id,
            width,
            LABEL_FONT_FLOOR * EXTRA_SCALING_FACTOR,
            label
        )
    } else {
        format!(
            "    {} [label=\"{}\", shape=circle, fixedsize=true, fontname=\"monospace bold\", \
             width={:.4}, fontsize={:.4}, forcelabels=true, labelloc=c];\n",
            id, label, width, fontsize
        )
    }
}

fn edge_statement(src_id: &str, dst_id: &str, relative: f64) -> String {
    let tier = tier_for(relative);
    let penwidth = (tier.width_base + tier.width_slope * relative) * EXTRA_SCALING_FACTOR;
    let mut attrs = format!(
        "constraint={}, splines=curved, penwidth={:.4}, style={}",
        tier.constraint, penwidth, tier.style
    );
    if let Some(arrowhead) = tier.arrowhead {
        write!(attrs, ", arrowhead={}", arrowhead).unwrap();
    }
    if tier.labeled {
        // percentage truncated to two decimals
        let label = (relative * 100.0).trunc() / 100.0;
        write!(attrs, ", forcelabels=true, label=\"{:.2}\"", label).unwrap();
    }
    format!("    {} -> {} [{}];\n", src_id, dst_id, attrs)
}

// The DOT description of the selected subgraph at the given scaling factor.
pub fn build_dot(table: &TransitionTable, nodes: &[String], params: &GraphParams, scaling_factor: f64) -> String {
    // three biggest selected nodes are the reference point for scaling
    let combined = table.totals[&nodes[0]] + table.totals[&nodes[1]] + table.totals[&nodes[2]];
    let count_to_scale = 3.0 / combined as f64;

    let mut dot = String::from("digraph command_sequentiality {\n");
    // overlap: scale -> solve overlap by scaling the graph
    // overlap_shrink -> try to shrink the graph a bit after you are done
    // splines -> don't draw edges over nodes
    dot.push_str("    graph [overlap=scale, overlap_shrink=true, splines=true, sep=\"0.25\"];\n");

    let mut declared: Vec<&str> = Vec::new();
    for src in nodes {
        let outgoing = match table.counts.get(src) {
            Some(outgoing) => outgoing,
            None => continue,
        };
        let src_total = table.totals[src];
        for (dst, seq_count) in outgoing {
            if !nodes.contains(dst) {
                continue;
            }
            let relative = *seq_count as f64 / src_total as f64;
            if relative < params.edge_min_value {
                continue;
            }
            for token in [src.as_str(), dst.as_str()] {
                if !declared.contains(&token) {
                    declared.push(token);
                    let scale = table.totals[token] as f64
                        * count_to_scale
                        * scaling_factor
                        * EXTRA_SCALING_FACTOR;
                    dot.push_str(&node_statement(table.id(token), token, scale));
                }
            }
            dot.push_str(&edge_statement(table.id(src), table.id(dst), relative));
        }
    }
    dot.push_str("}\n");
    dot
}

pub fn graph_output_path(params: &GraphParams) -> PathBuf {
    std::env::temp_dir().join(format!(
        "hindsight-graph-command_sequence-nodeCount_{}-edgeMinVal_{}.gv",
        params.node_count, params.edge_min_value
    ))
}

// Build and lay out the command-sequence graph. The layout engine fails
// intermittently, so retry with the nodes scaled down 1% per attempt;
// failure after the last attempt is logged, not raised.
pub fn render_command_sequences(
    sessions: &BTreeMap<u64, Vec<Record>>,
    params: &GraphParams,
) -> Option<PathBuf> {
    let table = TransitionTable::from_sessions(sessions.values());
    let nodes = table.top_tokens(params.node_count);
    let path = graph_output_path(params);

    for attempt in 0..RENDER_ATTEMPTS {
        let scaling_factor = BASE_SCALING_FACTOR * (1.0 - attempt as f64 * 0.01);
        let dot = build_dot(&table, &nodes, params, scaling_factor);
        if let Err(err) = fs::write(&path, &dot) {
            eprintln!("failed to write {}: {}", path.display(), err);
            continue;
        }
        match Command::new(LAYOUT_ENGINE)
            .arg("-Tsvg")
            .arg("-O")
            .arg(&path)
            .output()
        {
            Ok(output) if output.status.success() => return Some(path),
            Ok(output) => {
                eprintln!(
                    "{} failed (attempt {}): {}",
                    LAYOUT_ENGINE,
                    attempt + 1,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(err) => {
                eprintln!("{} failed (attempt {}): {}", LAYOUT_ENGINE, attempt + 1, err);
            }
        }
    }
    eprintln!(
        "giving up on graph layout after {} attempts: {}",
        RENDER_ATTEMPTS,
        path.display()
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(commands: &[&str], session_id: u64) -> Vec<Record> {
        commands
            .iter()
            .map(|cmd| {
                let json = format!(
                    r#"{{"cmdLine": "{}", "command": "{}", "realtimeAfterLocal": 0.0, "seqSessionId": {}}}"#,
                    cmd, cmd, session_id
                );
                serde_json::from_str(&json).unwrap()
            })
            .collect()
    }

    fn example_table() -> TransitionTable {
        let sessions = vec![session(&["ls", "cd"], 1), session(&["ls", "ls"], 2)];
        TransitionTable::from_sessions(sessions.iter())
    }

    #[test]
    fn transition_counts_match_worked_example() {
        let table = example_table();
        assert_eq!(table.counts[START_TOKEN]["ls"], 2);
        assert_eq!(table.counts["ls"]["cd"], 1);
        assert_eq!(table.counts["ls"]["ls"], 1);
        assert_eq!(table.counts["ls"][END_TOKEN], 1);
        assert_eq!(table.counts["cd"][END_TOKEN], 1);

        let relative = table.counts["ls"]["ls"] as f64 / table.totals["ls"] as f64;
        assert!((relative - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn start_transitions_sum_to_session_count() {
        let table = example_table();
        let outgoing: u64 = table.counts[START_TOKEN].values().sum();
        assert_eq!(outgoing, 2);
        assert_eq!(table.totals[START_TOKEN], 2);
    }

    #[test]
    fn end_token_reached_once_per_session() {
        let table = example_table();
        let incoming: u64 = table
            .counts
            .values()
            .filter_map(|outgoing| outgoing.get(END_TOKEN))
            .sum();
        assert_eq!(incoming, 2);
        assert_eq!(table.totals[END_TOKEN], 2);
    }

    #[test]
    fn empty_session_still_bridges_start_to_end() {
        let sessions = vec![session(&[""], 1)];
        let table = TransitionTable::from_sessions(sessions.iter());
        assert_eq!(table.counts[START_TOKEN][END_TOKEN], 1);
    }

    #[test]
    fn node_ids_are_assigned_in_first_seen_order() {
        let table = example_table();
        assert_eq!(table.id(START_TOKEN), "0");
        assert_eq!(table.id(END_TOKEN), "1");
        assert_eq!(table.id("ls"), "2");
        assert_eq!(table.id("cd"), "3");
    }

    #[test]
    fn top_tokens_order_is_deterministic() {
        let table = example_table();
        // ls: 3, start: 2, end: 2, cd: 1
        let tokens = table.top_tokens(4);
        assert_eq!(tokens, vec!["ls", END_TOKEN, START_TOKEN, "cd"]);
    }

    #[test]
    fn edge_tiers_map_by_threshold() {
        assert_eq!(tier_for(0.6).style, "bold");
        assert_eq!(tier_for(0.3).style, "solid");
        assert_eq!(tier_for(0.15).style, "dashed");
        assert_eq!(tier_for(0.05).style, "dotted");
    }

    #[test]
    fn dot_output_contains_nodes_and_edges() {
        let table = example_table();
        let nodes = table.top_tokens(4);
        let params = GraphParams {
            node_count: 4,
            edge_min_value: 0.05,
        };
        let dot = build_dot(&table, &nodes, &params, BASE_SCALING_FACTOR);
        assert!(dot.starts_with("digraph command_sequentiality {"));
        assert!(dot.contains("overlap=scale"));
        // start -> ls carries relative frequency 1.0: bold tier
        assert!(dot.contains("0 -> 2 [constraint=true, splines=curved, penwidth=8.0000, style=bold"));
        // ls -> ls at 1/3: solid open-arrow tier
        assert!(dot.contains("2 -> 2 ["));
        assert!(dot.contains("style=solid"));
    }

    #[test]
    fn weak_edges_are_filtered_by_minimum() {
        let table = example_table();
        let nodes = table.top_tokens(4);
        let params = GraphParams {
            node_count: 4,
            edge_min_value: 0.5,
        };
        let dot = build_dot(&table, &nodes, &params, BASE_SCALING_FACTOR);
        // only start->ls (1.0) survives; ls->cd (1/3) does not
        assert!(dot.contains("0 -> 2 ["));
        assert!(!dot.contains("2 -> 3 ["));
    }
}
