use assert_cmd::Command;
use predicates::prelude::*;
use specparam_rs::simulate::{simulate_dataset, DatasetSpec};
use std::path::Path;

fn specparam() -> Command {
    Command::cargo_bin("specparam").unwrap()
}

fn small_dataset(root: &Path) {
    let spec = DatasetSpec {
        n_subjects: 2,
        channels: vec!["Fz".to_string(), "Oz".to_string()],
        duration: 20.0,
        ..Default::default()
    };
    simulate_dataset(root, &spec).unwrap();
}

fn first_recording(root: &Path) -> String {
    root.join("sub-01")
        .join("ses-1")
        .join("eeg")
        .join("sub-01_ses-1_task-eyesopen_desc-clean_eeg.set")
        .to_str()
        .unwrap()
        .to_string()
}

// =============================================================================
// GENERAL
// =============================================================================

#[test]
fn test_no_args_shows_help() {
    specparam()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    specparam()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("specparam"));
}

#[test]
fn test_help_flag() {
    specparam()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("aperiodic (1/f)"));
}

// =============================================================================
// RUN SUBCOMMAND
// =============================================================================

#[test]
fn test_run_writes_condition_tables() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    small_dataset(data.path());

    specparam()
        .args(["run", "--data-root"])
        .arg(data.path())
        .arg("--output-dir")
        .arg(out.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Loading sub-01 ses-1 (NS)"))
        .stderr(predicate::str::contains("Saved results →"));

    for condition in ["NS", "SD"] {
        let path = out.path().join(format!("channel_specparam_{}.csv", condition));
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "subject,session,condition,channel,aperiodic_exponent,aperiodic_offset,n_peaks"
        );
        // 2 subjects x 2 channels
        assert_eq!(lines.len(), 5);
        assert!(lines[1..].iter().all(|l| l.contains(&format!(",{},", condition))));
    }
}

#[test]
fn test_run_quiet_with_metrics_and_json_summary() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    small_dataset(data.path());

    let assert = specparam()
        .args(["run", "--quiet", "--json", "--metrics", "--peaks", "--channels", "Oz"])
        .arg("--data-root")
        .arg(data.path())
        .arg("--output-dir")
        .arg(out.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Loading").not());

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let summary: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(summary["processed"], 4);
    assert_eq!(summary["failed"], 0);
    assert_eq!(summary["ns_rows"], 2);

    let ns = std::fs::read_to_string(out.path().join("channel_specparam_NS.csv")).unwrap();
    assert!(ns.lines().next().unwrap().ends_with("aperiodic_knee,r_squared,error"));
    assert!(ns.lines().skip(1).all(|l| l.contains(",Oz,")));
    assert!(out.path().join("channel_peaks_SD.csv").is_file());
}

#[test]
fn test_run_verbose_prints_each_loading_line_once() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    small_dataset(data.path());

    let assert = specparam()
        .args(["-v", "run", "--data-root"])
        .arg(data.path())
        .arg("--output-dir")
        .arg(out.path())
        .assert()
        .success();

    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert_eq!(stderr.matches("Loading sub-01 ses-1 (NS)").count(), 1);
    assert!(stderr.contains("[1/4] Loading sub-01 ses-1 (NS)"));
}

#[test]
fn test_run_missing_recording_is_skipped() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    small_dataset(data.path());
    std::fs::remove_dir_all(data.path().join("sub-02").join("ses-2")).unwrap();

    specparam()
        .args(["run", "--data-root"])
        .arg(data.path())
        .arg("--output-dir")
        .arg(out.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("No eyes-open file found for sub-02 ses-2"));
}

#[test]
fn test_run_partial_failure() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    small_dataset(data.path());
    let fdt = Path::new(first_recording(data.path()).as_str()).with_extension("fdt");
    std::fs::write(&fdt, [0u8; 7]).unwrap();

    specparam()
        .args(["run", "--data-root"])
        .arg(data.path())
        .arg("--output-dir")
        .arg(out.path())
        .assert()
        .code(2);
}

#[test]
fn test_run_missing_data_root() {
    specparam()
        .args(["run", "--data-root", "/nonexistent/dataset"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Data root not found"));
}

#[test]
fn test_run_missing_participants() {
    let data = tempfile::tempdir().unwrap();
    specparam()
        .args(["run", "--data-root"])
        .arg(data.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Participants table not found"));
}

#[test]
fn test_run_invalid_peak_width() {
    let data = tempfile::tempdir().unwrap();
    small_dataset(data.path());
    specparam()
        .args(["run", "--peak-width-limits", "12,1", "--data-root"])
        .arg(data.path())
        .assert()
        .code(1);
}

#[test]
fn test_run_data_root_from_env() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    small_dataset(data.path());

    specparam()
        .arg("run")
        .arg("--quiet")
        .env("SPECPARAM_DATA_ROOT", data.path())
        .env("SPECPARAM_OUTPUT_DIR", out.path())
        .assert()
        .success();
    assert!(out.path().join("channel_specparam_SD.csv").is_file());
}

// =============================================================================
// DISCOVER SUBCOMMAND
// =============================================================================

#[test]
fn test_discover_json() {
    let data = tempfile::tempdir().unwrap();
    small_dataset(data.path());

    let assert = specparam()
        .args(["discover", "--json", "--data-root"])
        .arg(data.path())
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let jobs: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let jobs = jobs.as_array().unwrap();
    assert_eq!(jobs.len(), 4);
    assert_eq!(jobs[0]["subject"], "sub-01");
    assert_eq!(jobs[0]["condition"], "NS");
    assert_eq!(jobs[2]["subject"], "sub-02");
    assert_eq!(jobs[2]["condition"], "SD");
    assert!(jobs.iter().all(|j| j["recording"].is_string()));
}

#[test]
fn test_discover_table() {
    let data = tempfile::tempdir().unwrap();
    small_dataset(data.path());

    specparam()
        .args(["discover", "--data-root"])
        .arg(data.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("SUBJECT"))
        .stdout(predicate::str::contains("sub-02"))
        .stderr(predicate::str::contains("4 session(s)"));
}

// =============================================================================
// FIT / PSD SUBCOMMANDS
// =============================================================================

#[test]
fn test_fit_single_recording() {
    let data = tempfile::tempdir().unwrap();
    small_dataset(data.path());

    let assert = specparam()
        .args(["fit", "--quiet", "--file", first_recording(data.path()).as_str()])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["sample_rate"], 250.0);
    let channels = parsed["channels"].as_array().unwrap();
    assert_eq!(channels.len(), 2);
    assert_eq!(channels[0]["channel"], "Fz");
    assert!(channels[0]["aperiodic_exponent"].as_f64().unwrap() > 0.0);
}

#[test]
fn test_fit_to_output_file() {
    let data = tempfile::tempdir().unwrap();
    small_dataset(data.path());
    let out = data.path().join("fit.json");

    specparam()
        .args(["fit", "--compact", "--channels", "Oz"])
        .args(["--file", first_recording(data.path()).as_str()])
        .arg("-o")
        .arg(&out)
        .assert()
        .success()
        .stderr(predicate::str::contains("Results written to"));

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(parsed["channels"].as_array().unwrap().len(), 1);
}

#[test]
fn test_fit_unsupported_file() {
    let data = tempfile::tempdir().unwrap();
    let path = data.path().join("rec.edf");
    std::fs::write(&path, b"").unwrap();

    specparam()
        .args(["fit", "--file"])
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unsupported file"));
}

#[test]
fn test_psd_channel() {
    let data = tempfile::tempdir().unwrap();
    small_dataset(data.path());

    let assert = specparam()
        .args(["psd", "--channel", "Oz", "--f-low", "1", "--f-high", "40"])
        .args(["--file", first_recording(data.path()).as_str()])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let freqs = parsed["frequencies"].as_array().unwrap();
    assert_eq!(freqs.len(), 40);
    assert_eq!(freqs[0], 1.0);
    assert_eq!(parsed["frequency_resolution"], 1.0);
    assert!(parsed["power"]
        .as_array()
        .unwrap()
        .iter()
        .all(|p| p.as_f64().unwrap() > 0.0));
}

#[test]
fn test_psd_unknown_channel() {
    let data = tempfile::tempdir().unwrap();
    small_dataset(data.path());

    specparam()
        .args(["psd", "--channel", "T7", "--file", first_recording(data.path()).as_str()])
        .assert()
        .code(1);
}

// =============================================================================
// SIMULATE SUBCOMMAND
// =============================================================================

#[test]
fn test_simulate_writes_dataset() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("bids");

    specparam()
        .args(["simulate", "--subjects", "1", "--duration", "5", "--channels", "Cz"])
        .arg("--out-dir")
        .arg(&root)
        .assert()
        .success()
        .stdout(predicate::str::contains("sub-01 ses-1 NS"));

    assert!(root.join("participants.tsv").is_file());
    assert!(root
        .join("sub-01/ses-2/eeg/sub-01_ses-2_task-eyesopen_desc-clean_channels.tsv")
        .is_file());
}
