use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn home_path(home: &TempDir) -> &Path {
    home.path()
}

fn bin_path() -> &'static str {
    env!("CARGO_BIN_EXE_costscope")
}

fn run_cmd(home: &TempDir, args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .current_dir(home_path(home))
        .env("COSTSCOPE_HOME", home_path(home))
        .env("COSTSCOPE_LOG", "warn")
        .output()
        .expect("run costscope command")
}

fn exports_dir(home: &TempDir) -> PathBuf {
    home.path().join("exports")
}

fn seed_export(home: &TempDir, name: &str, body: &str) {
    let dir = exports_dir(home);
    fs::create_dir_all(&dir).expect("create exports dir");
    fs::write(dir.join(name), body).expect("write export file");
}

fn process_two_days(home: &TempDir) -> PathBuf {
    seed_export(
        home,
        "2023_01_data_000.csv",
        "project_id,usage_date,total_cost\nA,2023-01-31,10\n",
    );
    seed_export(
        home,
        "2023_02_data_000.csv",
        "project_id,usage_date,total_cost\nA,2023-02-01,20\n",
    );
    let output = home.path().join("processed.csv");
    let out = run_cmd(
        home,
        &[
            "process",
            "--data-dir",
            exports_dir(home).to_str().expect("utf8 path"),
            "--start",
            "2023_01",
            "--end",
            "2023_02",
            "--output",
            output.to_str().expect("utf8 path"),
        ],
    );
    assert!(
        out.status.success(),
        "process failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    output
}

#[test]
fn init_creates_config() {
    let home = TempDir::new().expect("temp home");
    let output = run_cmd(&home, &["init"]);
    assert!(output.status.success());

    assert!(home.path().join("config").exists());
    assert!(home.path().join("config").join("config.toml").exists());
}

#[test]
fn init_is_idempotent() {
    let home = TempDir::new().expect("temp home");

    assert!(run_cmd(&home, &["init"]).status.success());
    let first = fs::read_to_string(home.path().join("config").join("config.toml"))
        .expect("read config after first init");

    assert!(run_cmd(&home, &["init"]).status.success());
    let second = fs::read_to_string(home.path().join("config").join("config.toml"))
        .expect("read config after second init");

    assert_eq!(first, second);
    assert!(first.contains("[ingest]"));
    assert!(first.contains("start_month = \"2022-09\""));
}

#[test]
fn process_writes_moving_averages() {
    let home = TempDir::new().expect("temp home");
    let output = process_two_days(&home);

    let body = fs::read_to_string(output).expect("read processed table");
    let mut lines = body.lines();
    let header = lines.next().expect("header");
    assert!(header.starts_with("project_id,usage_date,total_cost,MA_7,MA_15"));
    assert!(header.contains("Change_%_7,Change_$_7"));

    let first: Vec<&str> = lines.next().expect("first row").split(',').collect();
    let second: Vec<&str> = lines.next().expect("second row").split(',').collect();
    assert_eq!(&first[..4], ["A", "2023-01-31", "10", "10"]);
    assert_eq!(&second[..4], ["A", "2023-02-01", "20", "15"]);
    assert!(lines.next().is_none());
}

#[test]
fn process_uses_config_range_when_flags_are_omitted() {
    let home = TempDir::new().expect("temp home");
    assert!(run_cmd(&home, &["init"]).status.success());
    // default range 2022-09..=2023-09, default data dir ./exports
    seed_export(
        &home,
        "2022_10_data_000.csv",
        "project_id,usage_date,total_cost\nA,2022-10-01,3\n",
    );
    seed_export(
        &home,
        "2024_01_data_000.csv",
        "project_id,usage_date,total_cost\nA,2024-01-01,999\n",
    );

    let out = run_cmd(&home, &["process"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let body = fs::read_to_string(home.path().join("processed_data.csv")).expect("default output");
    assert_eq!(body.lines().count(), 2);
    assert!(!body.contains("999"));
}

#[test]
fn process_fails_without_matching_files() {
    let home = TempDir::new().expect("temp home");
    fs::create_dir_all(exports_dir(&home)).expect("create exports dir");
    let output = home.path().join("processed.csv");

    let out = run_cmd(
        &home,
        &[
            "process",
            "--data-dir",
            exports_dir(&home).to_str().expect("utf8 path"),
            "--output",
            output.to_str().expect("utf8 path"),
        ],
    );
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("no data"), "stderr was: {stderr}");
    assert!(!output.exists());
}

#[test]
fn process_reports_malformed_row_location() {
    let home = TempDir::new().expect("temp home");
    seed_export(
        &home,
        "2023_01_data_000.csv",
        "project_id,usage_date,total_cost\nA,2023-01-01,1\nA,2023-01-02,abc\n",
    );

    let out = run_cmd(
        &home,
        &[
            "process",
            "--data-dir",
            exports_dir(&home).to_str().expect("utf8 path"),
            "--start",
            "2023_01",
            "--end",
            "2023_01",
        ],
    );
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("2023_01_data_000.csv"));
    assert!(stderr.contains("line 3"));
}

#[test]
fn forecast_rejects_missing_input() {
    let home = TempDir::new().expect("temp home");
    let out = run_cmd(
        &home,
        &[
            "forecast",
            "--input",
            "missing.csv",
            "--daily_output",
            "daily.csv",
            "--monthly_output",
            "monthly.csv",
        ],
    );
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("does not exist"));
    assert!(!home.path().join("daily.csv").exists());
    assert!(!home.path().join("config").join("config.toml").exists());
}

#[test]
fn forecast_failure_leaves_no_partial_outputs() {
    let home = TempDir::new().expect("temp home");
    let mut body = String::from("usage_date,total_cost\n");
    for day in 1..=20 {
        body.push_str(&format!("2024-03-{day:02},{}\n", 30 + day % 7));
    }
    fs::write(home.path().join("costs.csv"), body).expect("write input");
    fs::write(home.path().join("blocker"), "file").expect("write blocker");

    let out = run_cmd(
        &home,
        &[
            "forecast",
            "--input",
            "costs.csv",
            "--daily_output",
            "daily.csv",
            "--monthly_output",
            "monthly.csv",
            "--plot_output",
            "blocker/plot.svg",
        ],
    );
    assert!(!out.status.success());
    assert!(!home.path().join("daily.csv").exists());
    assert!(!home.path().join("monthly.csv").exists());
}

#[test]
fn forecast_writes_daily_monthly_and_plot() {
    let home = TempDir::new().expect("temp home");
    let mut body = String::from("usage_date,total_cost\n");
    for day in 1..=28 {
        body.push_str(&format!("2024-02-{day:02},{}\n", 50 + (day % 7) * 2));
    }
    fs::write(home.path().join("costs.csv"), body).expect("write input");

    let out = run_cmd(
        &home,
        &[
            "forecast",
            "--input",
            "costs.csv",
            "--daily_output",
            "out/daily.csv",
            "--monthly_output",
            "out/monthly.csv",
            "--plot_output",
            "out/plot.svg",
        ],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let daily = fs::read_to_string(home.path().join("out/daily.csv")).expect("daily output");
    assert!(daily.starts_with("ds,yhat,yhat_lower,yhat_upper\n2024-02-01,"));
    // 28 history days + 730 horizon days + header
    assert_eq!(daily.lines().count(), 28 + 730 + 1);

    let monthly = fs::read_to_string(home.path().join("out/monthly.csv")).expect("monthly output");
    let mut rows = monthly.lines();
    assert_eq!(rows.next(), Some("month,monthly_total_cost"));
    assert!(rows.next().expect("first month").starts_with("2024-02,"));

    let svg = fs::read_to_string(home.path().join("out/plot.svg")).expect("plot output");
    assert!(svg.contains("<svg"));
}

#[test]
fn export_json_outputs_filtered_rows() {
    let home = TempDir::new().expect("temp home");
    let output = process_two_days(&home);

    let out = run_cmd(
        &home,
        &[
            "export",
            "--input",
            output.to_str().expect("utf8 path"),
            "--window",
            "7",
            "--date",
            "2023-02-01",
            "--change-type",
            "increase",
            "--min-pct",
            "30",
        ],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let parsed: Value = serde_json::from_slice(&out.stdout).expect("valid json output");
    let arr = parsed.as_array().expect("json array");
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["project_id"], "A");
    assert_eq!(arr[0]["moving_average"], 15.0);
    assert_eq!(arr[0]["change_abs"], 5.0);
}

#[test]
fn export_csv_outputs_header() {
    let home = TempDir::new().expect("temp home");
    let output = process_two_days(&home);

    let out = run_cmd(
        &home,
        &[
            "export",
            "--input",
            output.to_str().expect("utf8 path"),
            "--window",
            "7",
            "--date",
            "2023-02-01",
            "--format",
            "csv",
        ],
    );
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with(
        "project_id,usage_date,moving_average,total_cost,change_pct,change_abs\n"
    ));
    assert!(stdout.contains("A,2023-02-01,15"));
}

#[test]
fn export_rejects_unknown_change_type() {
    let home = TempDir::new().expect("temp home");
    let output = process_two_days(&home);

    let out = run_cmd(
        &home,
        &[
            "export",
            "--input",
            output.to_str().expect("utf8 path"),
            "--change-type",
            "sideways",
        ],
    );
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Unsupported change type"));
}
