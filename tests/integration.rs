use std::{
    env, fs,
    path::{Path, PathBuf},
    process::{Command, Output},
};

const CONFIG: &str = "\
[world]
seed = 42
ticks_per_day = 60
season_length_days = 2
bloom_duration_ticks = 90

[prey]
initial_count = 30

[predator]
initial_count = 6

[output]
days_per_segment = 3
";

fn setup(name: &str) -> PathBuf {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);
    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");
    fs::write(test_dir.join("config.toml"), CONFIG).expect("failed to write config file");
    test_dir
}

fn exec_bin(test_dir: &Path, args: &[&str]) -> Output {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_ecosim"));
    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");
    Command::new(bin)
        .arg("--sim-dir")
        .arg(test_dir_str)
        .args(args)
        .output()
        .expect("failed to execute command")
}

fn run_bin(test_dir: &Path, args: &[&str]) {
    let output = exec_bin(test_dir, args);

    let stdout_str =
        std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
    let stderr_str =
        std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");

    assert!(
        output.status.success(),
        "failed to run binary with {args:?}\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n"
    );
}

fn read_report(path: PathBuf) -> serde_json::Value {
    let contents = fs::read_to_string(&path).expect("failed to read report");
    serde_json::from_str(&contents).expect("failed to parse report")
}

#[test]
fn basic_workflow() {
    let test_dir = setup("basic_workflow");

    run_bin(&test_dir, &["create"]);
    run_bin(&test_dir, &["create"]);

    run_bin(&test_dir, &["resume", "--run-idx", "0"]);
    run_bin(&test_dir, &["resume", "--run-idx", "0"]);
    run_bin(&test_dir, &["resume", "--run-idx", "1"]);

    let run_0 = test_dir.join("run-0000");
    let run_1 = test_dir.join("run-0001");
    assert!(run_0.join("checkpoint.msgpack").is_file());
    assert!(run_1.join("checkpoint.msgpack").is_file());
    for idx in 0..3 {
        assert!(run_0.join(format!("report-{idx:04}.json")).is_file());
    }
    assert!(run_1.join("report-0001.json").is_file());
    assert!(!run_1.join("report-0002.json").exists());

    let first = read_report(run_0.join("report-0000.json"));
    let third = read_report(run_0.join("report-0002.json"));
    assert_eq!(first["start_day"], 0);
    assert_eq!(first["end_day"], 3);
    assert_eq!(third["start_day"], 6);
    assert_eq!(third["end_day"], 9);
    assert_eq!(first["observables"][0]["populations"]["prey"]["n_vals"], 3);

    run_bin(&test_dir, &["clean"]);
    assert!(!run_0.exists());
    assert!(!run_1.exists());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn seeded_runs_produce_identical_reports() {
    let test_dir = setup("seeded_runs");

    run_bin(&test_dir, &["create"]);
    run_bin(&test_dir, &["create"]);

    let report_0 = read_report(test_dir.join("run-0000").join("report-0000.json"));
    let report_1 = read_report(test_dir.join("run-0001").join("report-0000.json"));
    assert_eq!(report_0, report_1);

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn resume_rejects_changed_config() {
    let test_dir = setup("changed_config");

    run_bin(&test_dir, &["create"]);
    fs::write(
        test_dir.join("config.toml"),
        CONFIG.replace("seed = 42", "seed = 43"),
    )
    .expect("failed to write config file");

    let output = exec_bin(&test_dir, &["resume", "--run-idx", "0"]);
    assert!(!output.status.success());
    assert!(!test_dir.join("run-0000").join("report-0001.json").exists());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn invalid_config_is_rejected() {
    let test_dir = setup("invalid_config");
    fs::write(test_dir.join("config.toml"), "[prey]\nmax_energy = 0.0\n")
        .expect("failed to write config file");

    let output = exec_bin(&test_dir, &["create"]);
    assert!(!output.status.success());
    assert!(!test_dir.join("run-0000").exists());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn help_describes_the_run_layout() {
    let test_dir = setup("help");

    let output = exec_bin(&test_dir, &["--help"]);
    assert!(output.status.success());
    let stdout_str =
        std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
    assert!(stdout_str.contains("run-NNNN"));
    assert!(stdout_str.contains("Example: ecosim --sim-dir"));

    let output = exec_bin(&test_dir, &["create"]);
    assert!(output.status.success());
    let stderr_str =
        std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");
    assert!(stderr_str.contains("800x600 world, 30 prey, 6 predators, 3 days per segment"));

    fs::remove_dir_all(&test_dir).ok();
}
