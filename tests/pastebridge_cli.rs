use std::process::Command;

fn combined_output(output: &std::process::Output) -> String {
    let mut combined = String::new();
    combined.push_str(&String::from_utf8_lossy(&output.stdout));
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

fn pastebridge_bin() -> &'static str {
    option_env!("CARGO_BIN_EXE_pastebridge").expect("pastebridge test binary not built")
}

#[test]
fn help_mentions_name_and_flags() {
    let output = Command::new(pastebridge_bin())
        .arg("--help")
        .output()
        .expect("run pastebridge --help");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("pastebridge"));
    assert!(combined.contains("--spool-dir"));
    assert!(combined.contains("--no-intercept"));
}

#[test]
fn missing_command_fails() {
    let output = Command::new(pastebridge_bin())
        .output()
        .expect("run pastebridge without a command");
    assert!(!output.status.success());
}

#[test]
fn bad_cwd_fails_before_spawning() {
    let output = Command::new(pastebridge_bin())
        .args(["--cwd", "/no/such/dir/pastebridge", "true"])
        .output()
        .expect("run pastebridge with a bad --cwd");
    assert!(!output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("--cwd"), "got: {combined:?}");
}

#[test]
fn child_exit_code_is_propagated() {
    let output = Command::new(pastebridge_bin())
        .args(["sh", "-c", "exit 7"])
        .output()
        .expect("run pastebridge sh -c 'exit 7'");
    assert_eq!(output.status.code(), Some(7));
}

#[test]
fn piped_stdin_runs_in_pass_through_mode() {
    let output = Command::new(pastebridge_bin())
        .args(["sh", "-c", "printf ok"])
        .stdin(std::process::Stdio::null())
        .output()
        .expect("run pastebridge with closed stdin");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("ok"), "got: {combined:?}");
}
