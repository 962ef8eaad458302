use std::process::Command;

#[test]
fn bundled_demo_runs_to_stage_failure() {
    let output = Command::new(env!("CARGO_BIN_EXE_bastion"))
        .output()
        .expect("failed to invoke the bastion binary");

    assert!(output.status.success(), "bastion should exit cleanly");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("placed entities: 1 (6 reserved cells, 1 settle sequences cancelled)"),
        "destroyed tower keeps its reservation: {stdout}"
    );
    assert!(stdout.contains("stage failed at tick 80: all 3 cores dead"), "{stdout}");
}

#[test]
fn missing_stage_file_is_reported() {
    let output = Command::new(env!("CARGO_BIN_EXE_bastion"))
        .args(["--stage", "does/not/exist.toml"])
        .output()
        .expect("failed to invoke the bastion binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to read stage script"), "{stderr}");
}
