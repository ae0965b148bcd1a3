//! SVG chart comparing observations, in-sample fit and the forecast.

use crate::models::{ForecastPoint, SeriesPoint};
use chrono::{Duration, NaiveDate};

const WIDTH: f64 = 1500.0;
const HEIGHT: f64 = 600.0;
const MARGIN_LEFT: f64 = 90.0;
const MARGIN_RIGHT: f64 = 220.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 60.0;
const TICKS: usize = 6;

struct Frame {
    x_min: NaiveDate,
    x_span: f64,
    y_min: f64,
    y_span: f64,
}

impl Frame {
    fn x(&self, d: NaiveDate) -> f64 {
        let days = (d - self.x_min).num_days() as f64;
        MARGIN_LEFT + days / self.x_span * (WIDTH - MARGIN_LEFT - MARGIN_RIGHT)
    }

    fn y(&self, v: f64) -> f64 {
        HEIGHT - MARGIN_BOTTOM - (v - self.y_min) / self.y_span * (HEIGHT - MARGIN_TOP - MARGIN_BOTTOM)
    }
}

fn polyline<I>(frame: &Frame, points: I, color: &str) -> String
where
    I: IntoIterator<Item = (NaiveDate, f64)>,
{
    let coords: Vec<String> = points
        .into_iter()
        .map(|(d, v)| format!("{:.1},{:.1}", frame.x(d), frame.y(v)))
        .collect();
    if coords.is_empty() {
        return String::new();
    }
    format!(
        "<polyline fill=\"none\" stroke=\"{color}\" stroke-width=\"1.5\" points=\"{}\"/>\n",
        coords.join(" ")
    )
}

/// Renders the forecast chart. The shaded interval covers only dates after
/// `last_observed`, where a dashed marker separates history from forecast.
pub fn render_svg(
    observed: &[SeriesPoint],
    forecast: &[ForecastPoint],
    last_observed: NaiveDate,
) -> String {
    let dates = observed
        .iter()
        .map(|p| p.ds)
        .chain(forecast.iter().map(|p| p.ds));
    let x_min = dates.clone().min().unwrap_or(last_observed);
    let x_max = dates.max().unwrap_or(last_observed);

    let values = observed.iter().map(|p| p.y).chain(
        forecast
            .iter()
            .flat_map(|p| [p.yhat, p.yhat_lower, p.yhat_upper]),
    );
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let (lo, hi) = if lo.is_finite() && hi.is_finite() { (lo, hi) } else { (0.0, 1.0) };
    let pad = ((hi - lo) * 0.05).max(1.0);

    let frame = Frame {
        x_min,
        x_span: ((x_max - x_min).num_days() as f64).max(1.0),
        y_min: lo - pad,
        y_span: (hi - lo) + 2.0 * pad,
    };

    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{WIDTH}\" height=\"{HEIGHT}\" \
         viewBox=\"0 0 {WIDTH} {HEIGHT}\" font-family=\"sans-serif\" font-size=\"12\">\n\
         <rect width=\"100%\" height=\"100%\" fill=\"white\"/>\n\
         <text x=\"{}\" y=\"28\" text-anchor=\"middle\" font-size=\"16\">\
         Cost Forecast with Observed, Fit, and Forecast</text>\n",
        (WIDTH - MARGIN_RIGHT + MARGIN_LEFT) / 2.0
    );

    // grid and tick labels
    let plot_right = WIDTH - MARGIN_RIGHT;
    let plot_bottom = HEIGHT - MARGIN_BOTTOM;
    for i in 0..=TICKS {
        let v = frame.y_min + frame.y_span * i as f64 / TICKS as f64;
        let y = frame.y(v);
        svg.push_str(&format!(
            "<line x1=\"{MARGIN_LEFT}\" y1=\"{y:.1}\" x2=\"{plot_right}\" y2=\"{y:.1}\" stroke=\"#dddddd\"/>\n\
             <text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"end\">{v:.0}</text>\n",
            MARGIN_LEFT - 6.0,
            y + 4.0
        ));

        let offset = (frame.x_span * i as f64 / TICKS as f64).round() as i64;
        let d = x_min + Duration::days(offset);
        let x = frame.x(d);
        svg.push_str(&format!(
            "<line x1=\"{x:.1}\" y1=\"{MARGIN_TOP}\" x2=\"{x:.1}\" y2=\"{plot_bottom}\" stroke=\"#dddddd\"/>\n\
             <text x=\"{x:.1}\" y=\"{:.1}\" text-anchor=\"middle\">{d}</text>\n",
            plot_bottom + 18.0
        ));
    }
    svg.push_str(&format!(
        "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\">Date</text>\n\
         <text x=\"20\" y=\"{:.1}\" text-anchor=\"middle\" transform=\"rotate(-90 20 {:.1})\">Total Cost</text>\n",
        (MARGIN_LEFT + plot_right) / 2.0,
        HEIGHT - 15.0,
        (MARGIN_TOP + plot_bottom) / 2.0,
        (MARGIN_TOP + plot_bottom) / 2.0
    ));

    let future: Vec<&ForecastPoint> = forecast.iter().filter(|p| p.ds > last_observed).collect();
    if !future.is_empty() {
        let upper = future.iter().map(|p| (p.ds, p.yhat_upper));
        let lower = future.iter().rev().map(|p| (p.ds, p.yhat_lower));
        let coords: Vec<String> = upper
            .chain(lower)
            .map(|(d, v)| format!("{:.1},{:.1}", frame.x(d), frame.y(v)))
            .collect();
        svg.push_str(&format!(
            "<polygon class=\"interval\" fill=\"blue\" fill-opacity=\"0.2\" stroke=\"none\" points=\"{}\"/>\n",
            coords.join(" ")
        ));
    }

    svg.push_str(&polyline(&frame, observed.iter().map(|p| (p.ds, p.y)), "black"));
    svg.push_str(&polyline(
        &frame,
        forecast
            .iter()
            .filter(|p| p.ds <= last_observed)
            .map(|p| (p.ds, p.yhat)),
        "green",
    ));
    svg.push_str(&polyline(&frame, future.iter().map(|p| (p.ds, p.yhat)), "blue"));

    let marker_x = frame.x(last_observed);
    svg.push_str(&format!(
        "<line class=\"forecast-start\" x1=\"{marker_x:.1}\" y1=\"{MARGIN_TOP}\" x2=\"{marker_x:.1}\" \
         y2=\"{plot_bottom}\" stroke=\"gray\" stroke-dasharray=\"6 4\"/>\n"
    ));

    let legend = [
        ("Observed (Ground Truth)", "black"),
        ("Fitted (Train)", "green"),
        ("Forecast", "blue"),
        ("Confidence Interval", "rgba(0,0,255,0.2)"),
        ("Forecast Start", "gray"),
    ];
    for (i, (label, color)) in legend.iter().enumerate() {
        let y = MARGIN_TOP + 10.0 + i as f64 * 20.0;
        let x = plot_right + 20.0;
        svg.push_str(&format!(
            "<rect x=\"{x:.1}\" y=\"{:.1}\" width=\"18\" height=\"4\" fill=\"{color}\"/>\n\
             <text x=\"{:.1}\" y=\"{y:.1}\">{label}</text>\n",
            y - 6.0,
            x + 26.0
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date") + Duration::days(d)
    }

    fn fp(d: i64, y: f64) -> ForecastPoint {
        ForecastPoint {
            ds: date(d),
            yhat: y,
            yhat_lower: y - 2.0,
            yhat_upper: y + 2.0,
        }
    }

    #[test]
    fn chart_contains_all_layers() {
        let observed: Vec<SeriesPoint> = (0..5).map(|d| SeriesPoint { ds: date(d), y: 10.0 + d as f64 }).collect();
        let forecast: Vec<ForecastPoint> = (0..10).map(|d| fp(d, 10.0 + d as f64)).collect();
        let svg = render_svg(&observed, &forecast, date(4));

        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(svg.contains("stroke=\"black\""));
        assert!(svg.contains("stroke=\"green\""));
        assert!(svg.contains("stroke=\"blue\""));
        assert!(svg.contains("class=\"interval\""));
        assert!(svg.contains("class=\"forecast-start\""));
        assert!(svg.contains("Observed (Ground Truth)"));
    }

    #[test]
    fn no_band_without_future_points() {
        let observed = vec![SeriesPoint { ds: date(0), y: 1.0 }, SeriesPoint { ds: date(1), y: 2.0 }];
        let forecast = vec![fp(0, 1.0), fp(1, 2.0)];
        let svg = render_svg(&observed, &forecast, date(1));
        assert!(!svg.contains("class=\"interval\""));
    }

    #[test]
    fn empty_inputs_still_render() {
        let svg = render_svg(&[], &[], date(0));
        assert!(svg.contains("</svg>"));
    }
}
