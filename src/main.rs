use std::error::Error;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use clap::{App, AppSettings, Arg};
use regex::Regex;
use serde_json::json;
use thousands::Separable;

mod chart;
mod config;
mod freq;
mod graph;
mod load;
mod strategy;
mod vocab;

use chart::{Figure, FigureQueue};
use freq::{Field, FrequencyTable};
use graph::GraphParams;
use load::{History, Strategy};
use strategy::StrategyCurves;

// Stdout summary: plain lines as the analyses run, or one JSON document.
struct Summary {
    json: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Summary {
    fn new(as_json: bool) -> Summary {
        Summary {
            json: if as_json {
                Some(serde_json::Map::new())
            } else {
                None
            },
        }
    }

    fn note(&mut self, line: &str) {
        if self.json.is_none() {
            println!("{}", line);
        }
    }

    fn set(&mut self, key: &str, value: serde_json::Value) {
        if let Some(map) = &mut self.json {
            map.insert(key.to_string(), value);
        }
    }

    fn finish(self) -> Result<(), Box<dyn Error>> {
        if let Some(map) = self.json {
            println!("{}", serde_json::to_string_pretty(&map)?);
        }
        Ok(())
    }
}

fn coverage_notes(name: &str, table: &FrequencyTable, summary: &mut Summary) {
    let mut coverage = serde_json::Map::new();
    for (percent, fraction) in [(100, 1.0), (10, 0.1), (20, 0.2)] {
        let covered = table.coverage_percent(fraction);
        summary.note(&format!(
            "% {}: Top {} % of cmds amounts for {} % of all command lines",
            name, percent, covered
        ));
        coverage.insert(format!("top{}", percent), json!(covered));
    }
    summary.set(&format!("coverage.{}", name), coverage.into());
}

fn run_command_frequency(history: &History, plot_size: usize, figures: &mut FigureQueue, summary: &mut Summary) {
    let mut figure = Figure::new(
        "Command frequency / rank",
        "Command rank",
        "Normalized command frequency",
    );
    let table = FrequencyTable::from_records(&history.records, Field::Command);
    let series = freq::normalized(&table.ranked(), plot_size);
    figure.add_series("Zipf distribution", chart::rank_points(&freq::zipf(series.len())));
    figure.add_series("All subjects", chart::rank_points(&series));
    coverage_notes("ALL", &table, summary);

    for (name, records) in &history.by_user {
        let table = FrequencyTable::from_records(records, Field::Command);
        let series = freq::normalized(&table.ranked(), plot_size);
        figure.add_series(name, chart::rank_points(&series));
        coverage_notes(name, &table, summary);
    }
    figures.push(figure);
}

fn run_cmdline_frequency(history: &History, plot_size: usize, figures: &mut FigureQueue) {
    let mut figure = Figure::new(
        "Commandline frequency / rank",
        "Commandline rank",
        "Normalized commandline frequency",
    );
    let table = FrequencyTable::from_records(&history.records, Field::CmdLine);
    let series = freq::normalized(&table.ranked(), plot_size);
    figure.add_series("Zipf", chart::rank_points(&freq::zipf(series.len())));
    figure.add_series("Commandline", chart::rank_points(&series));
    figures.push(figure);
}

fn run_vocabulary_growth(history: &History, figures: &mut FigureQueue, summary: &mut Summary) {
    let mut commands = Figure::new(
        "Command vocabulary size vs. the number of command lines entered",
        "# of command lines entered",
        "Command vocabulary size",
    );
    let mut cmd_lines = Figure::new(
        "Command line vocabulary size vs. the number of command lines entered",
        "# of command lines entered",
        "Command line vocabulary size",
    );
    let global = vocab::growth_series(&history.records, Field::Command);
    commands.add_series("All subjects", chart::step_points(&global));
    for (name, records) in &history.by_user {
        let series = vocab::growth_series(records, Field::Command);
        let rates = vocab::adoption_rates(&series);
        let mut adoption = serde_json::Map::new();
        for (mark, rate) in &rates.at_mark {
            summary.note(&format!(
                "% {}: Cmd adoption rate at {}k cmdlines = {}",
                name,
                mark / 1000,
                rate
            ));
            adoption.insert(format!("at_{}", mark), json!(rate));
        }
        for (mark, rate) in &rates.after_mark {
            summary.note(&format!(
                "% {}: New cmd adoption rate after {}k cmdlines = {}",
                name,
                mark / 1000,
                rate
            ));
            adoption.insert(format!("after_{}", mark), json!(rate));
        }
        summary.set(&format!("adoption.{}", name), adoption.into());

        commands.add_series(name, chart::step_points(&series));
        let line_series = vocab::growth_series(records, Field::CmdLine);
        cmd_lines.add_series(name, chart::step_points(&line_series));
    }
    figures.push(commands);
    figures.push(cmd_lines);
}

fn run_daily_vocabulary(history: &History, figures: &mut FigureQueue) {
    let mut figure = Figure::new(
        "Daily command vocabulary growth",
        "# of command lines entered (day windows)",
        "Command vocabulary size within the day",
    );
    for (name, records) in &history.by_user {
        let series = vocab::daily_growth_series(records, Field::Command);
        figure.add_series(name, chart::step_points(&series));
    }
    figures.push(figure);
}

fn run_transition_graph(history: &History, params: &GraphParams, summary: &mut Summary) {
    if let Some(path) = graph::render_command_sequences(&history.by_session, params) {
        summary.note(&format!("% graph: {}", path.display()));
        summary.set("graph_output", json!(path.display().to_string()));
    }
}

fn selected(curves: &StrategyCurves, select: &Option<Regex>) -> bool {
    match select {
        Some(pattern) => pattern.is_match(&curves.title),
        None => true,
    }
}

fn run_strategy_matches(
    strategies: &[Strategy],
    plot_size: usize,
    cumulative: bool,
    select: &Option<Regex>,
    figures: &mut FigureQueue,
    summary: &mut Summary,
) {
    let curves: Vec<StrategyCurves> = strategies
        .iter()
        .map(|strategy| StrategyCurves::from_matches(strategy, plot_size))
        .collect();
    let mut figure = Figure::new("Matches at distance", "Distance", "% of matches");
    for strategy_curves in curves.iter().filter(|c| selected(c, select)) {
        figure.add_series(
            &freq::trim_label(&strategy_curves.title, 24),
            chart::rank_points(&strategy_curves.match_percent(cumulative)),
        );
    }
    let max_rate = strategy::max_recurrence_rate(&curves);
    summary.note(&format!("% >>> Avg recurrence rate = {}", max_rate));
    summary.set("avg_recurrence_rate", json!(max_rate));
    figure.add_reference("maximum possible", chart::flat_line(max_rate, plot_size));
    figures.push(figure);
}

fn run_strategy_chars(
    strategies: &[Strategy],
    plot_size: usize,
    cumulative: bool,
    select: &Option<Regex>,
    figures: &mut FigureQueue,
    summary: &mut Summary,
) {
    let curves: Vec<StrategyCurves> = strategies
        .iter()
        .map(|strategy| StrategyCurves::from_matches(strategy, plot_size))
        .collect();
    let mut figure = Figure::new(
        "Average characters recalled at distance",
        "Distance",
        "Average characters recalled",
    );
    for strategy_curves in curves.iter().filter(|c| selected(c, select)) {
        figure.add_series(
            &freq::trim_label(&strategy_curves.title, 24),
            chart::rank_points(&strategy_curves.chars_recalled_average(cumulative)),
        );
    }
    let max_recall = strategy::max_average_recall(&curves);
    summary.note(&format!("% >>> Max avg recalled characters = {}", max_recall));
    summary.set("max_avg_recalled_chars", json!(max_recall));
    figure.add_reference("maximum possible", chart::flat_line(max_recall, plot_size));
    figures.push(figure);
}

fn run_strategy_prefix_chars(
    strategies: &[Strategy],
    plot_size: usize,
    select: &Option<Regex>,
    figures: &mut FigureQueue,
    summary: &mut Summary,
) {
    let curves: Vec<StrategyCurves> = strategies
        .iter()
        .map(|strategy| StrategyCurves::from_prefix_matches(strategy, plot_size))
        .collect();
    let mut figure = Figure::new(
        "Average characters recalled at distance (including prefix matches)",
        "Distance",
        "Average characters recalled (including prefix matches)",
    );
    for strategy_curves in curves.iter().filter(|c| selected(c, select)) {
        figure.add_series(
            &freq::trim_label(&strategy_curves.title, 24),
            chart::rank_points(&strategy_curves.chars_recalled_average(true)),
        );
    }
    let max_recall = strategy::max_average_recall(&curves);
    summary.note(&format!(
        "% >>> Max avg recalled characters (including prefix matches) = {}",
        max_recall
    ));
    summary.set("max_avg_recalled_chars_prefix", json!(max_recall));
    figure.add_reference("maximum possible", chart::flat_line(max_recall, plot_size));
    figures.push(figure);
}

fn top_commands_notes(name: &str, records: &[load::Record], count: usize, summary: &mut Summary) {
    let ranked = freq::top_commands(records, Field::Command, count);
    summary.note(&format!("\n\n% {}: Top commands", name));
    let mut listing = Vec::new();
    for (cmd, cmd_count) in &ranked {
        summary.note(&format!("{} {}", cmd, cmd_count.separate_with_commas()));
        listing.push(json!([cmd, cmd_count]));
    }
    summary.set(&format!("top_commands.{}", name), json!(listing));
}

fn run_top_commands(history: &History, count: usize, summary: &mut Summary) {
    top_commands_notes("All subjects", &history.records, count, summary);
    for (name, records) in &history.by_user {
        top_commands_notes(name, records, count, summary);
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let matches = App::new("hindsight")
        .version("0.2")
        .about("Descriptive statistics and charts for recorded shell history dumps")
        .setting(AppSettings::ArgRequiredElseHelp)
        .setting(AppSettings::ColoredHelp)
        .arg(Arg::with_name("file")
            .short("f")
            .long("file")
            .value_name("FILE")
            .help("Read the history dump from a file instead of stdin")
            .takes_value(true))
        .arg(Arg::with_name("freq")
            .long("freq")
            .help("Command frequency/rank distribution vs. Zipf"))
        .arg(Arg::with_name("line-freq")
            .long("line-freq")
            .help("Command-line frequency/rank distribution vs. Zipf"))
        .arg(Arg::with_name("vocab")
            .long("vocab")
            .help("Vocabulary growth curves per user"))
        .arg(Arg::with_name("vocab-daily")
            .long("vocab-daily")
            .help("Vocabulary growth bucketed into day windows"))
        .arg(Arg::with_name("graph")
            .short("g")
            .long("graph")
            .help("Command transition graph (needs graphviz installed)"))
        .arg(Arg::with_name("strategies")
            .long("strategies")
            .help("Strategy match-rate curves"))
        .arg(Arg::with_name("chars")
            .long("chars")
            .help("Strategy characters-recalled curves"))
        .arg(Arg::with_name("prefix")
            .long("prefix")
            .help("Prefix-match characters-recalled curves"))
        .arg(Arg::with_name("top")
            .short("t")
            .long("top")
            .help("Top-command listings"))
        .arg(Arg::with_name("all")
            .short("a")
            .long("all")
            .help("Run every analysis"))
        .arg(Arg::with_name("plot-size")
            .short("s")
            .long("plot-size")
            .value_name("N")
            .help("How many ranks/distances to plot")
            .takes_value(true))
        .arg(Arg::with_name("node-count")
            .short("n")
            .long("node-count")
            .value_name("N")
            .help("Nodes in the transition graph")
            .takes_value(true))
        .arg(Arg::with_name("edge-min")
            .short("e")
            .long("edge-min")
            .value_name("VALUE")
            .help("Minimum relative frequency for a graph edge")
            .takes_value(true))
        .arg(Arg::with_name("top-count")
            .long("top-count")
            .value_name("N")
            .help("Commands per top listing")
            .takes_value(true))
        .arg(Arg::with_name("select")
            .long("select")
            .value_name("REGEX")
            .help("Only plot strategies whose title matches")
            .takes_value(true))
        .arg(Arg::with_name("histogram")
            .long("histogram")
            .help("Plot per-distance strategy histograms instead of cumulative curves"))
        .arg(Arg::with_name("csv")
            .long("csv")
            .value_name("DIR")
            .help("Export every chart's series as CSV files")
            .takes_value(true))
        .arg(Arg::with_name("no-draw")
            .long("no-draw")
            .help("Skip terminal charts, print summaries only"))
        .arg(Arg::with_name("json")
            .short("j")
            .long("json")
            .help("Output summary in JSON format"))
        .arg(Arg::with_name("quiet")
            .short("q")
            .long("quiet")
            .help("Suppress non-essential output"))
        .arg(Arg::with_name("write-config")
            .long("write-config")
            .help("Save the effective settings to ~/.hindsightrc"))
        .after_help("EXAMPLES:\n  hindsight --freq --top < dump.json\n  hindsight -f dump.json -g -n 28 -e 0.06\n  hindsight --strategies --select 'recent|frequent' --no-draw\n  hindsight --all --csv /tmp/hindsight-csv")
        .get_matches();

    let mut settings = config::get_config();
    if let Some(value) = matches.value_of("plot-size") {
        settings.plot_size = value.parse()?;
    }
    if let Some(value) = matches.value_of("node-count") {
        settings.node_count = value.parse()?;
    }
    if let Some(value) = matches.value_of("edge-min") {
        settings.edge_min_value = value.parse()?;
    }
    if let Some(value) = matches.value_of("top-count") {
        settings.top_count = value.parse()?;
    }
    if matches.is_present("write-config") {
        settings.save()?;
    }

    let select = match matches.value_of("select") {
        Some(pattern) => Some(Regex::new(pattern)?),
        None => None,
    };

    let quiet = matches.is_present("quiet");
    if !quiet {
        eprintln!("Analyzing the history dump...");
    }

    let dump = if let Some(path) = matches.value_of("file") {
        let mut contents = String::new();
        File::open(Path::new(path))?.read_to_string(&mut contents)?;
        load::read_dump(contents.as_bytes())?
    } else {
        load::read_dump(io::stdin().lock())?
    };
    let history = History::from_dump(&dump);
    let strategies = dump.strategies.clone().unwrap_or_default();

    if !quiet {
        eprintln!(
            "Loaded {} records across {} sessions from {} users, {} strategies",
            history.records.len().separate_with_commas(),
            history.by_session.len().separate_with_commas(),
            history.by_user.len(),
            strategies.len()
        );
    }

    let all = matches.is_present("all");
    let want = |name: &str| all || matches.is_present(name);

    let mut figures = FigureQueue::new();
    let mut summary = Summary::new(matches.is_present("json"));

    if want("freq") {
        run_command_frequency(&history, settings.plot_size, &mut figures, &mut summary);
    }
    if want("line-freq") {
        run_cmdline_frequency(&history, settings.plot_size, &mut figures);
    }
    if want("vocab") {
        run_vocabulary_growth(&history, &mut figures, &mut summary);
    }
    if want("vocab-daily") {
        run_daily_vocabulary(&history, &mut figures);
    }
    if want("top") {
        run_top_commands(&history, settings.top_count, &mut summary);
    }
    if want("graph") {
        let params = GraphParams {
            node_count: settings.node_count,
            edge_min_value: settings.edge_min_value,
        };
        run_transition_graph(&history, &params, &mut summary);
    }
    let cumulative = !matches.is_present("histogram");
    if want("strategies") {
        run_strategy_matches(&strategies, settings.plot_size, cumulative, &select, &mut figures, &mut summary);
    }
    if want("chars") {
        run_strategy_chars(&strategies, settings.plot_size, cumulative, &select, &mut figures, &mut summary);
    }
    if want("prefix") {
        run_strategy_prefix_chars(&strategies, settings.plot_size, &select, &mut figures, &mut summary);
    }

    if let Some(dir) = matches.value_of("csv") {
        let dir = Path::new(dir);
        fs::create_dir_all(dir)?;
        figures.export_csv(dir)?;
        if !quiet {
            eprintln!("Exported {} charts to {}", figures.figures.len(), dir.display());
        }
    }

    summary.finish()?;

    if !matches.is_present("no-draw") && !figures.is_empty() {
        figures.show()?;
    }

    Ok(())
}
