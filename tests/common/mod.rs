//! Shared test infrastructure for integration tests.

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn manifest_dir() -> PathBuf {
    PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()))
}

/// Command line that runs `tests/mock-lm.sh` as the model backend.
pub fn mock_lm_command() -> String {
    let script = manifest_dir().join("tests/mock-lm.sh");
    format!("sh {}", shell_words::quote(&script.display().to_string()))
}

/// Write a JSON Lines input table with one row per permission name.
pub fn write_input(dir: &Path, names: &[&str]) -> PathBuf {
    let path = dir.join("permissions.jsonl");
    let mut text = String::new();
    for name in names {
        let row = serde_json::json!({
            "Permission Name": name,
            "API Name": name.replace(' ', ""),
            "Description": format!("Allows {name}."),
            "Expanded Description": format!("Long form for {name} [1]."),
        });
        text.push_str(&row.to_string());
        text.push('\n');
    }
    std::fs::write(&path, text).expect("write input table");
    path
}

pub fn write_prompt(dir: &Path) -> PathBuf {
    let path = dir.join("risk_prompt.txt");
    std::fs::write(
        &path,
        "Assess the risk of {permission_name} ({permission_api_name}).\n{permission_description}\n{permission_expanded_description}\n",
    )
    .expect("write prompt");
    path
}

/// Run the permeval binary inside `dir` with extra environment variables.
pub fn permeval(dir: &Path, args: &[&str], envs: &[(&str, &str)]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_permeval"));
    command
        .current_dir(dir)
        .args(args)
        .env_remove("PERMEVAL_LM_COMMAND")
        .env("RUST_LOG", "warn");
    for (key, value) in envs {
        command.env(key, value);
    }
    command.output().expect("run permeval")
}

/// Parse a JSON Lines file into values.
pub fn read_jsonl(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .expect("read jsonl")
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("parse jsonl row"))
        .collect()
}
