//! Shared helpers for krupy integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::process::Command;

use krupy::worker::WorkerOptions;
use questionnaire::{PromptDescriptor, PromptError, Prompter};
use serde_json::Value;

/// Write `files` below `root`, creating parent directories
pub fn build_file_tree(root: &Path, files: &[(&str, &str)]) {
    for (path, content) in files {
        let path = root.join(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create directory");
        }
        fs::write(&path, content).expect("Failed to write file");
    }
}

/// Run git in `dir`, panicking on failure
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=Krupy Test",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "tag.gpgsign=false",
            "-c",
            "init.defaultBranch=main",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn git_init(dir: &Path) {
    fs::create_dir_all(dir).expect("Failed to create repository directory");
    git(dir, &["init", "-q"]);
}

/// Commit everything in `dir` and tag the commit
pub fn git_commit_tag(dir: &Path, message: &str, tag: &str) {
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", message]);
    git(dir, &["tag", tag]);
}

/// Non-interactive options generating from `src` into `dst`
pub fn options(src: &Path, dst: &Path) -> WorkerOptions {
    WorkerOptions {
        src_path: Some(src.to_string_lossy().into_owned()),
        dst_path: dst.to_path_buf(),
        defaults: true,
        quiet: true,
        ..Default::default()
    }
}

pub fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e))
}

/// Prompter replaying prepared answers
#[derive(Debug, Default)]
pub struct Scripted {
    pub answers: VecDeque<Result<Value, PromptError>>,
    pub confirms: VecDeque<bool>,
    pub asked: Vec<String>,
}

impl Scripted {
    pub fn new(answers: Vec<Result<Value, PromptError>>) -> Self {
        Self {
            answers: answers.into(),
            ..Default::default()
        }
    }
}

impl Prompter for Scripted {
    fn ask(&mut self, descriptor: &PromptDescriptor) -> Result<Value, PromptError> {
        self.asked.push(descriptor.name.clone());
        self.answers.pop_front().unwrap_or(Err(PromptError::Interrupted))
    }

    fn confirm(&mut self, _message: &str, default: bool) -> Result<bool, PromptError> {
        Ok(self.confirms.pop_front().unwrap_or(default))
    }
}
