use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn model_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../models/tiny-chat")
}

/// `spindle` with an empty config location so the user's config is never read
fn spindle(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("spindle").unwrap();
    cmd.env_remove("RUST_LOG")
        .arg("--config")
        .arg(config_dir.path().join("config.toml"));
    cmd
}

fn run(config_dir: &TempDir) -> Command {
    let mut cmd = spindle(config_dir);
    cmd.arg("run").arg("--model").arg(model_dir());
    cmd
}

#[test]
fn streams_reply_for_stdin_prompt() {
    let config_dir = TempDir::new().unwrap();
    run(&config_dir)
        .write_stdin("Hello\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Input: "))
        .stdout(predicate::str::contains("Output: Hi there!\n"));
}

#[test]
fn prompt_flag_skips_input() {
    let config_dir = TempDir::new().unwrap();
    run(&config_dir)
        .args(["--prompt", "Hello"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Input:").not())
        .stdout(predicate::str::contains("Output: Hi there!"));
}

#[test]
fn empty_input_is_reported() {
    let config_dir = TempDir::new().unwrap();
    run(&config_dir)
        .write_stdin("\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Error: Input cannot be empty"))
        .stdout(predicate::str::contains("Output:").not());
}

#[test]
fn unsupported_characters_fail() {
    let config_dir = TempDir::new().unwrap();
    run(&config_dir)
        .write_stdin("h\u{e9}llo\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("TOKENIZER_UNSUPPORTED_CHAR"));
}

#[test]
fn max_length_includes_prompt() {
    let config_dir = TempDir::new().unwrap();
    run(&config_dir)
        .args(["--max-length", "9"])
        .write_stdin("Hello\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Output: Hi there\n"));
}

#[test]
fn interactive_loop_until_quit() {
    let config_dir = TempDir::new().unwrap();
    let assert = run(&config_dir)
        .arg("--interactive")
        .write_stdin("Hello\n\nHi\nquit\nHello\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Error: Input cannot be empty"));

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert_eq!(stdout.matches("Hi there!").count(), 2);
}

#[test]
fn interactive_loop_ends_at_eof() {
    let config_dir = TempDir::new().unwrap();
    run(&config_dir)
        .arg("-i")
        .write_stdin("Hello\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Output: Hi there!"));
}

#[test]
fn config_file_layers_search_options() {
    let config_dir = TempDir::new().unwrap();
    std::fs::write(
        config_dir.path().join("config.toml"),
        "[search]\nmax_length = 9\n",
    )
    .unwrap();
    run(&config_dir)
        .write_stdin("Hello\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Output: Hi there\n"));

    // the command line wins over the config file
    run(&config_dir)
        .args(["--max-length", "100"])
        .write_stdin("Hello\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Output: Hi there!"));
}

#[test]
fn unsupported_batch_size_is_rejected() {
    let config_dir = TempDir::new().unwrap();
    std::fs::write(
        config_dir.path().join("config.toml"),
        "[search]\nbatch_size = 2\n",
    )
    .unwrap();
    run(&config_dir)
        .write_stdin("Hello\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("BATCH_SIZE_UNSUPPORTED"));
}

#[test]
fn json_run_summary() {
    let config_dir = TempDir::new().unwrap();
    run(&config_dir)
        .args(["--prompt", "Hello"])
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"output\": \"Hi there!\""))
        .stdout(predicate::str::contains("\"status\": \"completed\""));
}

#[test]
fn info_reports_model_metadata() {
    let config_dir = TempDir::new().unwrap();
    spindle(&config_dir)
        .arg("--json")
        .arg("info")
        .arg("--model")
        .arg(model_dir())
        .arg("--tokenizer")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"vocab_size\": 109"))
        .stdout(predicate::str::contains("\"name\": \"tiny-chat\""))
        .stdout(predicate::str::contains("<|assistant|>"));
}

#[test]
fn missing_model_fails() {
    let config_dir = TempDir::new().unwrap();
    spindle(&config_dir)
        .args(["run", "--model", "no-such-model"])
        .write_stdin("Hello\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("stdout is not JSON ({e}): {stdout}"))
}

#[test]
fn json_summary_from_stdin_is_clean_json() {
    let config_dir = TempDir::new().unwrap();
    let assert = run(&config_dir)
        .arg("--json")
        .write_stdin("Hello\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("Input: "));

    let summary = stdout_json(assert.get_output());
    assert_eq!(summary["input"], "Hello");
    assert_eq!(summary["output"], "Hi there!");
    assert_eq!(summary["status"], "completed");
}

#[test]
fn json_empty_input_is_reported_as_json() {
    let config_dir = TempDir::new().unwrap();
    let assert = run(&config_dir)
        .arg("--json")
        .write_stdin("\n")
        .assert()
        .success();

    let rejected = stdout_json(assert.get_output());
    assert_eq!(rejected["status"], "rejected");
    assert_eq!(rejected["error"], "Input cannot be empty");
}

/// Model that repeats `a` until the length limit
#[cfg(unix)]
fn write_endless_model(dir: &std::path::Path) {
    std::fs::write(
        dir.join("genai_config.json"),
        r#"{"model": {"type": "bigram", "name": "endless", "vocab_size": 8,
            "context_length": 1048576, "eos_token_id": 3}}"#,
    )
    .unwrap();
    std::fs::write(
        dir.join("tokenizer.json"),
        r#"{"pieces": ["<s>", "</s>", "<|user|>", "<|end|>", "<|assistant|>", "\n", "▁", "a"],
            "special_tokens": ["<|user|>", "<|assistant|>"],
            "bos_token": "<s>", "eos_token": "<|end|>", "pad_token": "</s>"}"#,
    )
    .unwrap();
    std::fs::write(
        dir.join("weights.json"),
        r#"{"base_logit": -10.0, "default": [[7, 8.0]], "transitions": []}"#,
    )
    .unwrap();
}

#[cfg(unix)]
#[test]
fn ctrl_c_aborts_generation_and_keeps_output() {
    use std::io::Read;
    use std::process::Stdio;
    use std::time::Duration;

    let config_dir = TempDir::new().unwrap();
    let model = TempDir::new().unwrap();
    write_endless_model(model.path());

    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("spindle"))
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(config_dir.path().join("config.toml"))
        .args(["run", "--prompt", "a", "--max-length", "1000000", "--model"])
        .arg(model.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let mut stdout = child.stdout.take().unwrap();
    let mut seen = Vec::new();
    let mut buf = [0u8; 256];
    while !String::from_utf8_lossy(&seen).contains("Output: aaa") {
        let n = stdout.read(&mut buf).unwrap();
        assert!(n > 0, "generation ended before it could be interrupted");
        seen.extend_from_slice(&buf[..n]);
    }

    // let the signal watcher get installed before interrupting
    std::thread::sleep(Duration::from_millis(200));
    let rc = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGINT) };
    assert_eq!(rc, 0);

    stdout.read_to_end(&mut seen).unwrap();
    let status = child.wait().unwrap();
    let text = String::from_utf8_lossy(&seen);
    assert!(status.success(), "exit status {status:?}");
    assert!(
        text.ends_with("a\n  --control+c pressed, aborting generation--\n"),
        "unexpected tail: {:?}",
        &text[text.len().saturating_sub(80)..]
    );
}
