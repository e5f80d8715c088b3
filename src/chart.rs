use std::error::Error;
use std::fs::File;
use std::io;
use std::path::Path;

use termion::event::Key;
use termion::input::TermRead;
use termion::raw::IntoRawMode;
use termion::screen::IntoAlternateScreen;
use tui::backend::TermionBackend;
use tui::layout::{Constraint, Direction, Layout};
use tui::style::{Color, Style};
use tui::symbols;
use tui::text::Span;
use tui::widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph};
use tui::Terminal;

const SERIES_COLORS: [Color; 6] = [
    Color::Cyan,
    Color::Yellow,
    Color::Green,
    Color::Magenta,
    Color::Blue,
    Color::White,
];

#[derive(Debug)]
pub struct Series {
    pub name: String,
    pub points: Vec<(f64, f64)>,
    pub color: Color,
}

#[derive(Debug)]
pub struct Figure {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: &str, x_label: &str, y_label: &str) -> Figure {
        Figure {
            title: title.to_string(),
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, name: &str, points: Vec<(f64, f64)>) {
        let color = SERIES_COLORS[self.series.len() % SERIES_COLORS.len()];
        self.series.push(Series {
            name: name.to_string(),
            points,
            color,
        });
    }

    // reference lines ("maximum possible") are always red
    pub fn add_reference(&mut self, name: &str, points: Vec<(f64, f64)>) {
        self.series.push(Series {
            name: name.to_string(),
            points,
            color: Color::Red,
        });
    }

    fn bounds(&self) -> ([f64; 2], [f64; 2]) {
        let mut x = (f64::MAX, f64::MIN);
        let mut y = (f64::MAX, f64::MIN);
        for series in &self.series {
            for (px, py) in &series.points {
                x = (x.0.min(*px), x.1.max(*px));
                y = (y.0.min(*py), y.1.max(*py));
            }
        }
        if x.0 >= x.1 {
            x.1 = x.0 + 1.0;
        }
        if y.0 >= y.1 {
            y.1 = y.0 + 1.0;
        }
        ([x.0, x.1], [y.0, y.1])
    }

    fn slug(&self) -> String {
        self.title
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

// Queued figures, shown together once all analyses ran (deferred draw).
#[derive(Debug, Default)]
pub struct FigureQueue {
    pub figures: Vec<Figure>,
}

impl FigureQueue {
    pub fn new() -> FigureQueue {
        FigureQueue {
            figures: Vec::new(),
        }
    }

    pub fn push(&mut self, figure: Figure) {
        self.figures.push(figure);
    }

    pub fn is_empty(&self) -> bool {
        self.figures.is_empty()
    }

    // One chart per screen; n/→ and p/← to page, q/Esc to quit.
    pub fn show(&self) -> Result<(), Box<dyn Error>> {
        if self.figures.is_empty() {
            return Ok(());
        }
        let stdout = io::stdout().into_raw_mode()?;
        let stdout = stdout.into_alternate_screen()?;
        let backend = TermionBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        // the dump usually arrives on stdin, so keys come from the tty
        let tty = termion::get_tty()?;
        let mut keys = tty.keys();

        let mut selected = 0;
        loop {
            let figure = &self.figures[selected];
            let status = format!(
                "chart {}/{}  (n/p to page, q to quit)",
                selected + 1,
                self.figures.len()
            );
            terminal.draw(|f| {
                let chunks = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([Constraint::Min(1), Constraint::Length(1)].as_ref())
                    .split(f.size());

                let (x_bounds, y_bounds) = figure.bounds();
                let datasets = figure
                    .series
                    .iter()
                    .map(|series| {
                        Dataset::default()
                            .name(series.name.as_str())
                            .marker(symbols::Marker::Braille)
                            .graph_type(GraphType::Line)
                            .style(Style::default().fg(series.color))
                            .data(&series.points)
                    })
                    .collect();
                let chart = Chart::new(datasets)
                    .block(
                        Block::default()
                            .title(figure.title.as_str())
                            .borders(Borders::ALL),
                    )
                    .x_axis(
                        Axis::default()
                            .title(figure.x_label.as_str())
                            .bounds(x_bounds)
                            .labels(axis_labels(x_bounds)),
                    )
                    .y_axis(
                        Axis::default()
                            .title(figure.y_label.as_str())
                            .bounds(y_bounds)
                            .labels(axis_labels(y_bounds)),
                    );
                f.render_widget(chart, chunks[0]);
                f.render_widget(Paragraph::new(status.as_str()), chunks[1]);
            })?;

            match keys.next() {
                Some(Ok(Key::Char('n'))) | Some(Ok(Key::Right)) | Some(Ok(Key::Char('\n'))) => {
                    if selected + 1 < self.figures.len() {
                        selected += 1;
                    }
                }
                Some(Ok(Key::Char('p'))) | Some(Ok(Key::Left)) => {
                    selected = selected.saturating_sub(1);
                }
                Some(Ok(Key::Char('q'))) | Some(Ok(Key::Esc)) | None => break,
                _ => {}
            }
        }
        Ok(())
    }

    // Long-format CSV per figure: series,x,y.
    pub fn export_csv(&self, dir: &Path) -> Result<(), Box<dyn Error>> {
        for figure in &self.figures {
            let path = dir.join(format!("{}.csv", figure.slug()));
            let mut writer = csv::Writer::from_writer(File::create(&path)?);
            writer.write_record(["series", "x", "y"])?;
            for series in &figure.series {
                for (x, y) in &series.points {
                    writer.write_record(&[series.name.clone(), x.to_string(), y.to_string()])?;
                }
            }
            writer.flush()?;
        }
        Ok(())
    }
}

fn axis_labels(bounds: [f64; 2]) -> Vec<Span<'static>> {
    let mid = (bounds[0] + bounds[1]) / 2.0;
    [bounds[0], mid, bounds[1]]
        .iter()
        .map(|value| Span::from(format!("{:.1}", value)))
        .collect()
}

// Series helpers: y-values against 1-based ranks/distances or 0-based steps.
pub fn rank_points(values: &[f64]) -> Vec<(f64, f64)> {
    values
        .iter()
        .enumerate()
        .map(|(i, y)| ((i + 1) as f64, *y))
        .collect()
}

pub fn step_points(values: &[i64]) -> Vec<(f64, f64)> {
    values
        .iter()
        .enumerate()
        .map(|(i, y)| (i as f64, *y as f64))
        .collect()
}

pub fn flat_line(value: f64, len: usize) -> Vec<(f64, f64)> {
    (1..=len).map(|x| (x as f64, value)).collect()
}
