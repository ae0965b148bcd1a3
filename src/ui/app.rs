use crate::models::CostDataset;
use crate::view::{
    apply_filters, available_dates, dollar_bounds, select_by_change, trend_series, ChangeType,
    DollarAction, DollarRange, FilterParams, TrendPoint, ViewRow,
};
use chrono::NaiveDate;
use std::collections::BTreeSet;

pub const TREND_DAYS_MIN: usize = 7;
pub const TREND_DAYS_MAX: usize = 365;
pub const TREND_DAYS_STEP: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Window,
    Date,
    ChangeType,
    MinPct,
    MinDollar,
    MaxDollar,
    Projects,
    TrendDays,
    MaOverlay,
}

impl Control {
    pub const ALL: [Control; 9] = [
        Control::Window,
        Control::Date,
        Control::ChangeType,
        Control::MinPct,
        Control::MinDollar,
        Control::MaxDollar,
        Control::Projects,
        Control::TrendDays,
        Control::MaOverlay,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Control::Window => "MA period",
            Control::Date => "Date",
            Control::ChangeType => "Change type",
            Control::MinPct => "Min % change",
            Control::MinDollar => "Min $ change",
            Control::MaxDollar => "Max $ change",
            Control::Projects => "Projects",
            Control::TrendDays => "Days shown",
            Control::MaOverlay => "Show MA",
        }
    }

    pub fn editable(self) -> bool {
        matches!(self, Control::MinPct | Control::MinDollar | Control::MaxDollar)
    }

    fn index(self) -> usize {
        Control::ALL.iter().position(|c| *c == self).unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct DashboardState {
    pub running: bool,
    pub dataset: CostDataset,
    pub focus: Control,
    pub window_idx: usize,
    pub date_idx: usize,
    pub change_type: ChangeType,
    pub min_change_pct: f64,
    pub dollar: DollarRange,
    /// Projects the user switched off; everything else in the table is shown.
    pub hidden_projects: BTreeSet<String>,
    pub project_cursor: usize,
    pub trend_days: usize,
    pub show_ma: bool,
    /// Text being typed into a numeric control.
    pub editing: Option<String>,
    pub status: String,
}

impl DashboardState {
    /// Opens on the largest moving-average window and the newest date.
    pub fn new(dataset: CostDataset, trend_days: usize) -> Self {
        let window_idx = dataset.windows.len().saturating_sub(1);
        let mut state = Self {
            running: true,
            dataset,
            focus: Control::Window,
            window_idx,
            date_idx: 0,
            change_type: ChangeType::Both,
            min_change_pct: 0.0,
            dollar: DollarRange::new(0.0, 0.0),
            hidden_projects: BTreeSet::new(),
            project_cursor: 0,
            trend_days: trend_days.clamp(TREND_DAYS_MIN, TREND_DAYS_MAX),
            show_ma: true,
            editing: None,
            status: "ready".into(),
        };
        state.rebound_dollars();
        state
    }

    pub fn window(&self) -> Option<usize> {
        self.dataset.windows.get(self.window_idx).copied()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.window()
            .map(|w| available_dates(&self.dataset, w))
            .unwrap_or_default()
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.dates().get(self.date_idx).copied()
    }

    fn change_rows(&self) -> Vec<ViewRow> {
        match (self.window(), self.date()) {
            (Some(w), Some(d)) => {
                select_by_change(&self.dataset, w, d, self.change_type, self.min_change_pct)
            }
            _ => Vec::new(),
        }
    }

    /// Change-filtered rows inside the dollar selection, before project
    /// toggles. These are the projects the user can toggle.
    pub fn candidate_projects(&self) -> Vec<String> {
        let projects: BTreeSet<String> = self
            .query(None)
            .into_iter()
            .map(|r| r.project_id)
            .collect();
        projects.into_iter().collect()
    }

    pub fn selected_projects(&self) -> Vec<String> {
        self.candidate_projects()
            .into_iter()
            .filter(|p| !self.hidden_projects.contains(p))
            .collect()
    }

    fn query(&self, projects: Option<BTreeSet<String>>) -> Vec<ViewRow> {
        let (Some(window), Some(date)) = (self.window(), self.date()) else {
            return Vec::new();
        };
        let params = FilterParams {
            window,
            date,
            change_type: self.change_type,
            min_change_pct: self.min_change_pct,
            dollar_range: Some(self.dollar.selection()),
            projects,
        };
        apply_filters(&self.dataset, &params)
    }

    pub fn rows(&self) -> Vec<ViewRow> {
        let selected: BTreeSet<String> = self.selected_projects().into_iter().collect();
        self.query(Some(selected))
    }

    pub fn trends(&self) -> Vec<(String, Vec<TrendPoint>)> {
        let (Some(window), Some(date)) = (self.window(), self.date()) else {
            return Vec::new();
        };
        self.selected_projects()
            .into_iter()
            .map(|p| {
                let series = trend_series(&self.dataset, &p, window, date, self.trend_days);
                (p, series)
            })
            .filter(|(_, series)| !series.is_empty())
            .collect()
    }

    /// Resets the dollar range to the span of the change-filtered rows.
    fn rebound_dollars(&mut self) {
        let (lo, hi) = dollar_bounds(&self.change_rows());
        self.dollar.apply(DollarAction::Rebound(lo, hi));
        self.project_cursor = 0;
    }

    fn dollar_step(&self) -> f64 {
        let (lo, hi) = self.dollar.bounds();
        ((hi - lo) / 20.0).max(0.01)
    }

    pub fn focus_next(&mut self) {
        let i = (self.focus.index() + 1) % Control::ALL.len();
        self.focus = Control::ALL[i];
        self.editing = None;
    }

    pub fn focus_prev(&mut self) {
        let len = Control::ALL.len();
        let i = (self.focus.index() + len - 1) % len;
        self.focus = Control::ALL[i];
        self.editing = None;
    }

    /// Steps the focused control one notch in `direction` (-1 or +1).
    pub fn adjust(&mut self, direction: i32) {
        match self.focus {
            Control::Window => {
                let len = self.dataset.windows.len();
                if len == 0 {
                    return;
                }
                let current_date = self.date();
                self.window_idx = step_index(self.window_idx, len, direction);
                let dates = self.dates();
                self.date_idx = current_date
                    .and_then(|d| dates.iter().position(|x| *x == d))
                    .unwrap_or(0);
                self.rebound_dollars();
            }
            Control::Date => {
                let len = self.dates().len();
                if len == 0 {
                    return;
                }
                let next = self.date_idx as i64 + i64::from(direction);
                self.date_idx = next.clamp(0, len as i64 - 1) as usize;
                self.rebound_dollars();
            }
            Control::ChangeType => {
                let i = ChangeType::ALL
                    .iter()
                    .position(|c| *c == self.change_type)
                    .unwrap_or(0);
                self.change_type = ChangeType::ALL[step_index(i, ChangeType::ALL.len(), direction)];
                self.rebound_dollars();
            }
            Control::MinPct => {
                self.set_min_pct(self.min_change_pct + f64::from(direction));
            }
            Control::MinDollar => {
                let v = self.dollar.selection().0 + f64::from(direction) * self.dollar_step();
                self.dollar.apply(DollarAction::SetMin(v));
            }
            Control::MaxDollar => {
                let v = self.dollar.selection().1 + f64::from(direction) * self.dollar_step();
                self.dollar.apply(DollarAction::SetMax(v));
            }
            Control::Projects => {
                let len = self.candidate_projects().len();
                if len > 0 {
                    let next = self.project_cursor as i64 + i64::from(direction);
                    self.project_cursor = next.clamp(0, len as i64 - 1) as usize;
                }
            }
            Control::TrendDays => {
                let next = if direction < 0 {
                    self.trend_days.saturating_sub(TREND_DAYS_STEP)
                } else {
                    self.trend_days + TREND_DAYS_STEP
                };
                self.trend_days = next.clamp(TREND_DAYS_MIN, TREND_DAYS_MAX);
            }
            Control::MaOverlay => self.show_ma = !self.show_ma,
        }
    }

    fn set_min_pct(&mut self, value: f64) {
        self.min_change_pct = value.max(0.0);
        self.rebound_dollars();
    }

    pub fn toggle_project(&mut self) {
        let Some(project) = self.candidate_projects().get(self.project_cursor).cloned() else {
            return;
        };
        if !self.hidden_projects.remove(&project) {
            self.hidden_projects.insert(project);
        }
    }

    pub fn show_all_projects(&mut self) {
        self.hidden_projects.clear();
    }

    pub fn hide_all_projects(&mut self) {
        self.hidden_projects.extend(self.candidate_projects());
    }

    pub fn begin_edit(&mut self) {
        if self.focus.editable() {
            self.editing = Some(String::new());
        }
    }

    pub fn push_edit_char(&mut self, ch: char) {
        if let Some(buf) = self.editing.as_mut() {
            if ch.is_ascii_digit() || ch == '.' || (ch == '-' && buf.is_empty()) {
                buf.push(ch);
            }
        }
    }

    pub fn pop_edit_char(&mut self) {
        if let Some(buf) = self.editing.as_mut() {
            buf.pop();
        }
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    /// Applies the typed value to the focused control. Unparseable text is
    /// rejected and leaves the control unchanged.
    pub fn commit_edit(&mut self) {
        let Some(buf) = self.editing.take() else {
            return;
        };
        let Ok(value) = buf.trim().parse::<f64>() else {
            self.status = format!("'{buf}' is not a number");
            return;
        };
        if !value.is_finite() {
            self.status = format!("'{buf}' is not a number");
            return;
        }
        match self.focus {
            Control::MinPct => self.set_min_pct(value),
            Control::MinDollar => self.dollar.apply(DollarAction::SetMin(value)),
            Control::MaxDollar => self.dollar.apply(DollarAction::SetMax(value)),
            _ => return,
        }
        self.status = format!("{} set", self.focus.label());
    }

    pub fn control_value(&self, control: Control) -> String {
        if control == self.focus {
            if let Some(buf) = &self.editing {
                return format!("{buf}_");
            }
        }
        match control {
            Control::Window => self
                .window()
                .map(|w| w.to_string())
                .unwrap_or_else(|| "-".into()),
            Control::Date => self
                .date()
                .map(|d| d.to_string())
                .unwrap_or_else(|| "no dates".into()),
            Control::ChangeType => self.change_type.as_label().into(),
            Control::MinPct => format!("{:.0}", self.min_change_pct),
            Control::MinDollar => format!("{:.2}", self.dollar.selection().0),
            Control::MaxDollar => format!("{:.2}", self.dollar.selection().1),
            Control::Projects => {
                let total = self.candidate_projects().len();
                format!("{}/{}", total.saturating_sub(self.hidden_count()), total)
            }
            Control::TrendDays => self.trend_days.to_string(),
            Control::MaOverlay => (if self.show_ma { "on" } else { "off" }).into(),
        }
    }

    fn hidden_count(&self) -> usize {
        self.candidate_projects()
            .iter()
            .filter(|p| self.hidden_projects.contains(*p))
            .count()
    }
}

fn step_index(current: usize, len: usize, direction: i32) -> usize {
    if direction < 0 {
        (current + len - 1) % len
    } else {
        (current + 1) % len
    }
}
