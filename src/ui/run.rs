use crate::error::AppError;
use crate::storage::read_dataset;
use crate::ui::app::{Control, DashboardState};
use crate::view::{TrendPoint, ViewRow};
use chrono::{Duration, NaiveDate};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols;
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Axis, Block, Borders, Cell, Chart, Dataset, GraphType, Paragraph, Row, Table,
};
use ratatui::Terminal;
use std::io;
use std::path::Path;
use std::time::Duration as StdDuration;
use tracing::info;

const COLOR_ACCENT: Color = Color::Cyan;
const COLOR_MUTED: Color = Color::DarkGray;
const COLOR_HEADER: Color = Color::White;
const POLL_INTERVAL: StdDuration = StdDuration::from_millis(250);

const SERIES_COLORS: [Color; 6] = [
    Color::Cyan,
    Color::Yellow,
    Color::Green,
    Color::Magenta,
    Color::LightRed,
    Color::LightBlue,
];

pub fn run_dashboard(input: &Path, trend_days: usize) -> Result<(), AppError> {
    let dataset = read_dataset(input)?;
    if dataset.rows.is_empty() {
        return Err(AppError::NoData(format!(
            "{} has no rows to display",
            input.display()
        )));
    }
    info!(rows = dataset.rows.len(), input = %input.display(), "loaded dashboard data");
    let mut state = DashboardState::new(dataset, trend_days);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let loop_result = run_loop(&mut terminal, &mut state);

    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    loop_result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: &mut DashboardState,
) -> Result<(), AppError> {
    while state.running {
        terminal.draw(|f| render(f, state))?;

        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                handle_key(key.code, key.modifiers, state);
            }
        }
    }
    Ok(())
}

fn handle_key(code: KeyCode, modifiers: KeyModifiers, state: &mut DashboardState) {
    if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
        state.running = false;
        return;
    }

    if state.editing.is_some() {
        match code {
            KeyCode::Enter => state.commit_edit(),
            KeyCode::Esc => state.cancel_edit(),
            KeyCode::Backspace => state.pop_edit_char(),
            KeyCode::Char(ch) => state.push_edit_char(ch),
            _ => {}
        }
        return;
    }

    match code {
        KeyCode::Char('q') | KeyCode::Esc => state.running = false,
        KeyCode::Tab => state.focus_next(),
        KeyCode::BackTab => state.focus_prev(),
        // inside the project list the vertical arrows move the cursor
        KeyCode::Down if state.focus == Control::Projects => state.adjust(1),
        KeyCode::Up if state.focus == Control::Projects => state.adjust(-1),
        KeyCode::Down => state.focus_next(),
        KeyCode::Up => state.focus_prev(),
        KeyCode::Left if state.focus != Control::Projects => state.adjust(-1),
        KeyCode::Right if state.focus != Control::Projects => state.adjust(1),
        KeyCode::Enter => state.begin_edit(),
        KeyCode::Char(' ') => match state.focus {
            Control::Projects => state.toggle_project(),
            Control::MaOverlay => state.adjust(1),
            _ => {}
        },
        KeyCode::Char('m') => state.show_ma = !state.show_ma,
        KeyCode::Char('a') => state.show_all_projects(),
        KeyCode::Char('n') => state.hide_all_projects(),
        _ => {}
    }
}

fn render(f: &mut ratatui::Frame, state: &DashboardState) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(2),
        ])
        .split(f.area());

    let rows = state.rows();
    let header = Paragraph::new(format!(
        " costscope  ·  MA({})  ·  {}  ·  {} rows  ·  {} ",
        state.window().unwrap_or_default(),
        state
            .date()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "no dates".into()),
        rows.len(),
        state.status
    ))
    .block(Block::default().borders(Borders::ALL).title(" Cost Analysis "))
    .style(Style::default().fg(COLOR_HEADER));
    f.render_widget(header, root[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(34), Constraint::Min(40)])
        .split(root[1]);

    render_controls(f, body[0], state);

    let main = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(body[1]);

    render_table(f, main[0], state, &rows);
    render_trend(f, main[1], state);

    let footer = Paragraph::new(footer_text(state))
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(COLOR_MUTED));
    f.render_widget(footer, root[2]);
}

fn footer_text(state: &DashboardState) -> &'static str {
    if state.editing.is_some() {
        return "type a number | Enter apply | Backspace delete | Esc cancel";
    }
    match state.focus {
        Control::Projects => {
            "Up/Down move | Space toggle | a all | n none | Tab next | q quit"
        }
        c if c.editable() => "Left/Right step | Enter type value | Tab/Shift+Tab focus | m MA | q quit",
        _ => "Left/Right change | Tab/Shift+Tab focus | m MA | a/n all/none | q quit",
    }
}

fn render_controls(f: &mut ratatui::Frame, area: Rect, state: &DashboardState) {
    let split = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(Control::ALL.len() as u16 + 2),
            Constraint::Min(3),
        ])
        .split(area);

    let lines: Vec<Line> = Control::ALL
        .iter()
        .map(|&c| {
            let focused = c == state.focus;
            let marker = if focused { "▶ " } else { "  " };
            let style = if focused {
                Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(format!("{marker}{:<13}", c.label()), style),
                Span::styled(state.control_value(c), style),
            ])
        })
        .collect();
    let controls = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Filters "));
    f.render_widget(controls, split[0]);

    let candidates = state.candidate_projects();
    let project_lines: Vec<Line> = candidates
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let checked = if state.hidden_projects.contains(p) { "[ ]" } else { "[x]" };
            let style = if state.focus == Control::Projects && i == state.project_cursor {
                Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::REVERSED)
            } else {
                Style::default()
            };
            Line::styled(format!("{checked} {p}"), style)
        })
        .collect();
    let scroll = state.project_cursor.saturating_sub(split[1].height.saturating_sub(3) as usize);
    let projects = Paragraph::new(project_lines)
        .scroll((scroll as u16, 0))
        .block(Block::default().borders(Borders::ALL).title(" Projects "));
    f.render_widget(projects, split[1]);
}

fn format_pct(pct: Option<f64>) -> String {
    match pct {
        Some(p) => format!("{p:+.2}%"),
        None => "n/a".into(),
    }
}

fn render_table(f: &mut ratatui::Frame, area: Rect, state: &DashboardState, rows: &[ViewRow]) {
    let window = state.window().unwrap_or_default();
    let table_rows = rows
        .iter()
        .map(|r| {
            let color = if r.change_abs > 0.0 {
                Color::LightRed
            } else if r.change_abs < 0.0 {
                Color::LightGreen
            } else {
                Color::Reset
            };
            Row::new(vec![
                Cell::from(r.project_id.clone()),
                Cell::from(format!("${:.2}", r.moving_average)),
                Cell::from(format!("${:.2}", r.total_cost)),
                Cell::from(format_pct(r.change_pct)),
                Cell::from(format!("{:+.2}", r.change_abs)),
            ])
            .style(Style::default().fg(color))
        })
        .collect::<Vec<_>>();

    let table = Table::new(
        table_rows,
        [
            Constraint::Percentage(36),
            Constraint::Percentage(16),
            Constraint::Percentage(16),
            Constraint::Percentage(16),
            Constraint::Percentage(16),
        ],
    )
    .header(
        Row::new(vec![
            "Project".to_string(),
            format!("MA({window})"),
            "Today's Price".to_string(),
            "% Change".to_string(),
            "$ Change".to_string(),
        ])
        .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().borders(Borders::ALL).title(" Filtered Projects "));
    f.render_widget(table, area);
}

type ChartLine = (String, Color, bool, Vec<(f64, f64)>);

/// Plot coordinates: x is days since `origin`.
fn chart_lines(
    trends: &[(String, Vec<TrendPoint>)],
    origin: NaiveDate,
    window: usize,
    show_ma: bool,
) -> Vec<ChartLine> {
    let mut lines = Vec::new();
    for (i, (project, points)) in trends.iter().enumerate() {
        let color = SERIES_COLORS[i % SERIES_COLORS.len()];
        let x = |p: &TrendPoint| (p.date - origin).num_days() as f64;
        lines.push((
            format!("{project} cost"),
            color,
            false,
            points.iter().map(|p| (x(p), p.total_cost)).collect(),
        ));
        if show_ma {
            lines.push((
                format!("{project} MA({window})"),
                color,
                true,
                points.iter().map(|p| (x(p), p.moving_average)).collect(),
            ));
        }
    }
    lines
}

fn value_bounds(lines: &[ChartLine]) -> [f64; 2] {
    let (lo, hi) = lines
        .iter()
        .flat_map(|(_, _, _, pts)| pts.iter().map(|(_, y)| *y))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() || !hi.is_finite() {
        return [0.0, 1.0];
    }
    let pad = ((hi - lo) * 0.05).max(0.5);
    [lo - pad, hi + pad]
}

fn render_trend(f: &mut ratatui::Frame, area: Rect, state: &DashboardState) {
    let window = state.window().unwrap_or_default();
    let end = state.date();
    let title = format!(
        " Cost Trend Over Last {} Days (Ending {}) ",
        state.trend_days,
        end.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
    );

    let trends = state.trends();
    let origin = trends
        .iter()
        .filter_map(|(_, pts)| pts.first().map(|p| p.date))
        .min();
    let (Some(origin), Some(end)) = (origin, end) else {
        let empty = Paragraph::new("No trend data for the current selection")
            .block(Block::default().borders(Borders::ALL).title(title))
            .style(Style::default().fg(COLOR_MUTED));
        f.render_widget(empty, area);
        return;
    };

    let lines = chart_lines(&trends, origin, window, state.show_ma);
    let datasets: Vec<Dataset> = lines
        .iter()
        .map(|(name, color, dashed, pts)| {
            let style = if *dashed {
                Style::default().fg(*color).add_modifier(Modifier::DIM)
            } else {
                Style::default().fg(*color)
            };
            Dataset::default()
                .name(name.clone())
                .marker(if *dashed { symbols::Marker::Dot } else { symbols::Marker::Braille })
                .graph_type(GraphType::Line)
                .style(style)
                .data(pts)
        })
        .collect();

    let x_max = ((end - origin).num_days() as f64).max(1.0);
    let mid = origin + Duration::days((x_max / 2.0).round() as i64);
    let [y_lo, y_hi] = value_bounds(&lines);

    let chart = Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title(title))
        .x_axis(
            Axis::default()
                .title("Date")
                .style(Style::default().fg(COLOR_MUTED))
                .bounds([0.0, x_max])
                .labels(vec![origin.to_string(), mid.to_string(), end.to_string()]),
        )
        .y_axis(
            Axis::default()
                .title("Cost")
                .style(Style::default().fg(COLOR_MUTED))
                .bounds([y_lo, y_hi])
                .labels(vec![
                    format!("{y_lo:.2}"),
                    format!("{:.2}", (y_lo + y_hi) / 2.0),
                    format!("{y_hi:.2}"),
                ]),
        );
    f.render_widget(chart, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AggregatedCostPoint, CostDataset};
    use crate::rolling::enrich;

    fn state() -> DashboardState {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date");
        let points: Vec<AggregatedCostPoint> = ["p1", "p2"]
            .iter()
            .flat_map(|p| {
                (0..10).map(move |d| AggregatedCostPoint {
                    project_id: (*p).into(),
                    usage_date: start + Duration::days(d),
                    total_cost: 1.0 + d as f64,
                })
            })
            .collect();
        let rows = enrich(&points, &[7]).expect("enrich");
        DashboardState::new(CostDataset { windows: vec![7], rows }, 30)
    }

    #[test]
    fn quit_keys_stop_the_loop() {
        let mut s = state();
        handle_key(KeyCode::Char('q'), KeyModifiers::NONE, &mut s);
        assert!(!s.running);

        let mut s = state();
        handle_key(KeyCode::Char('c'), KeyModifiers::CONTROL, &mut s);
        assert!(!s.running);
    }

    #[test]
    fn q_while_editing_does_not_quit() {
        let mut s = state();
        s.focus = Control::MinPct;
        handle_key(KeyCode::Enter, KeyModifiers::NONE, &mut s);
        handle_key(KeyCode::Char('q'), KeyModifiers::NONE, &mut s);
        assert!(s.running);
        handle_key(KeyCode::Char('5'), KeyModifiers::NONE, &mut s);
        handle_key(KeyCode::Enter, KeyModifiers::NONE, &mut s);
        assert_eq!(s.min_change_pct, 5.0);
    }

    #[test]
    fn arrows_move_focus_outside_projects_and_cursor_inside() {
        let mut s = state();
        handle_key(KeyCode::Down, KeyModifiers::NONE, &mut s);
        assert_eq!(s.focus, Control::Date);

        s.focus = Control::Projects;
        handle_key(KeyCode::Down, KeyModifiers::NONE, &mut s);
        assert_eq!(s.focus, Control::Projects);
        assert_eq!(s.project_cursor, 1);
        handle_key(KeyCode::Char(' '), KeyModifiers::NONE, &mut s);
        assert_eq!(s.selected_projects(), vec!["p1"]);
    }

    #[test]
    fn chart_lines_respect_ma_toggle() {
        let s = state();
        let trends = s.trends();
        let origin = NaiveDate::from_ymd_opt(2024, 3, 8).expect("valid date");
        assert_eq!(chart_lines(&trends, origin, 7, true).len(), 4);

        let without = chart_lines(&trends, origin, 7, false);
        assert_eq!(without.len(), 2);
        assert_eq!(without[0].0, "p1 cost");
        assert_eq!(without[0].3.first(), Some(&(0.0, 8.0)));
    }

    #[test]
    fn value_bounds_pad_and_default() {
        assert_eq!(value_bounds(&[]), [0.0, 1.0]);
        let line = ("x".to_string(), Color::Cyan, false, vec![(0.0, 10.0), (1.0, 30.0)]);
        assert_eq!(value_bounds(&[line]), [9.0, 31.0]);
    }

    #[test]
    fn pct_formatting_marks_undefined() {
        assert_eq!(format_pct(None), "n/a");
        assert_eq!(format_pct(Some(12.345)), "+12.35%");
        assert_eq!(format_pct(Some(-3.0)), "-3.00%");
    }
}
