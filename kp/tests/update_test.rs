//! Integration tests for template versions, recopy and update
//!
//! Templates are throwaway git repositories built with the `git` binary.

mod common;

use std::fs;
use std::path::PathBuf;

use krupy::diagnostics::WarningKind;
use krupy::error::KrupyError;
use krupy::merge::ConflictPolicy;
use krupy::worker::{Stage, Worker, WorkerOptions};
use serde_json::json;
use tempfile::TempDir;

use common::{build_file_tree, git_commit_tag, git_init, options, read};

const CONFIG_V1: &str = "name:\n  type: str\n  default: demo\n";

const README_V1: &str = "# {{ name }}\n\nline a\nline b\nline c\nline d\nline e\nline f\nline g\nfooter\n";

/// A template repository tagged `v1.0.0` and a project copied from it
struct Fixture {
    _temp: TempDir,
    repo: PathBuf,
    dst: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let repo = temp.path().join("template");
        let dst = temp.path().join("project");
        git_init(&repo);
        build_file_tree(
            &repo,
            &[
                ("krupy.yml", CONFIG_V1),
                ("README.md.hbs", README_V1),
                ("obsolete.txt", "old\n"),
            ],
        );
        git_commit_tag(&repo, "v1", "v1.0.0");

        let mut worker = Worker::new(options(&repo, &dst));
        worker.run_copy().expect("initial copy should succeed");
        Self { _temp: temp, repo, dst }
    }

    /// Commit a new template version
    fn release(&self, tag: &str, files: &[(&str, &str)], removed: &[&str]) {
        for path in removed {
            fs::remove_file(self.repo.join(path)).expect("Failed to remove template file");
        }
        build_file_tree(&self.repo, files);
        git_commit_tag(&self.repo, tag, tag);
    }

    fn edit(&self, path: &str, from: &str, to: &str) {
        let path = self.dst.join(path);
        let content = read(&path).replacen(from, to, 1);
        fs::write(path, content).expect("Failed to edit project file");
    }

    fn update_options(&self) -> WorkerOptions {
        WorkerOptions {
            dst_path: self.dst.clone(),
            defaults: true,
            quiet: true,
            ..Default::default()
        }
    }

    fn answers(&self) -> String {
        read(&self.dst.join(".krupy-answers.yml"))
    }
}

fn readme_v2(footer: &str) -> String {
    README_V1.replace("footer", footer)
}

// =============================================================================
// Template versions
// =============================================================================

#[test]
fn test_copy_records_template_version() {
    let fixture = Fixture::new();
    assert_eq!(read(&fixture.dst.join("README.md")), README_V1.replace("{{ name }}", "demo"));
    let answers = fixture.answers();
    assert!(answers.contains("_commit: v1.0.0"), "answers were:\n{}", answers);
    assert!(answers.contains("name: demo"));
}

#[test]
fn test_latest_tag_prerelease_and_explicit_ref() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let repo = temp.path().join("template");
    git_init(&repo);
    build_file_tree(&repo, &[("version.txt", "one\n")]);
    git_commit_tag(&repo, "one", "v1.0.0");
    build_file_tree(&repo, &[("version.txt", "two-alpha\n")]);
    git_commit_tag(&repo, "two alpha", "v2.0.0-alpha");
    build_file_tree(&repo, &[("version.txt", "head\n")]);
    common::git(&repo, &["add", "-A"]);
    common::git(&repo, &["commit", "-q", "-m", "untagged"]);

    let stable = temp.path().join("stable");
    Worker::new(options(&repo, &stable)).run_copy().unwrap();
    assert_eq!(read(&stable.join("version.txt")), "one\n");

    let pre = temp.path().join("pre");
    Worker::new(WorkerOptions {
        use_prereleases: true,
        ..options(&repo, &pre)
    })
    .run_copy()
    .unwrap();
    assert_eq!(read(&pre.join("version.txt")), "two-alpha\n");
    assert!(read(&pre.join(".krupy-answers.yml")).contains("_commit: v2.0.0-alpha"));

    let head = temp.path().join("head");
    Worker::new(WorkerOptions {
        vcs_ref: Some("HEAD".into()),
        ..options(&repo, &head)
    })
    .run_copy()
    .unwrap();
    assert_eq!(read(&head.join("version.txt")), "head\n");
}

#[test]
fn test_dirty_local_template_warns_and_uses_committed_files() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let repo = temp.path().join("template");
    git_init(&repo);
    build_file_tree(&repo, &[("file.txt", "committed\n")]);
    git_commit_tag(&repo, "one", "v1.0.0");
    fs::write(repo.join("file.txt"), "uncommitted\n").unwrap();

    let dst = temp.path().join("out");
    let mut worker = Worker::new(options(&repo, &dst));
    worker.run_copy().unwrap();
    assert!(worker.diagnostics().iter().any(|d| d.kind == WarningKind::DirtyLocal));
    assert_eq!(read(&dst.join("file.txt")), "committed\n");

    let strict = temp.path().join("strict");
    let err = Worker::new(WorkerOptions {
        strict: true,
        ..options(&repo, &strict)
    })
    .run_copy()
    .unwrap_err();
    assert!(matches!(err, KrupyError::Warning(d) if d.kind == WarningKind::DirtyLocal));
}

// =============================================================================
// Update
// =============================================================================

#[test]
fn test_update_merges_template_and_local_changes() {
    let fixture = Fixture::new();
    fixture.edit("README.md", "line a", "line a (local)");
    fixture.release(
        "v2.0.0",
        &[
            ("krupy.yml", "name:\n  type: str\n  default: demo\nlicense: MIT\n"),
            ("README.md.hbs", &readme_v2("footer v2")),
            ("new.txt.hbs", "license {{ license }}\n"),
        ],
        &["obsolete.txt"],
    );

    let mut worker = Worker::new(fixture.update_options());
    worker.run_update().expect("update should succeed");
    assert_eq!(worker.stage(), Stage::Done);

    assert_eq!(
        read(&fixture.dst.join("README.md")),
        "# demo\n\nline a (local)\nline b\nline c\nline d\nline e\nline f\nline g\nfooter v2\n"
    );
    assert!(!fixture.dst.join("obsolete.txt").exists());
    assert_eq!(read(&fixture.dst.join("new.txt")), "license MIT\n");

    let answers = fixture.answers();
    assert!(answers.contains("_commit: v2.0.0"));
    assert!(answers.contains("license: MIT"));
    assert!(answers.contains("name: demo"));
}

#[test]
fn test_update_keeps_file_deleted_locally() {
    let fixture = Fixture::new();
    fs::remove_file(fixture.dst.join("README.md")).unwrap();
    fixture.release("v2.0.0", &[("README.md.hbs", &readme_v2("footer v2"))], &[]);

    Worker::new(fixture.update_options()).run_update().unwrap();
    assert!(!fixture.dst.join("README.md").exists());
}

#[test]
fn test_update_conflict_inline_markers() {
    let fixture = Fixture::new();
    fixture.edit("README.md", "line d", "line d mine");
    fixture.release(
        "v2.0.0",
        &[("README.md.hbs", &README_V1.replace("line d", "line d template"))],
        &[],
    );

    Worker::new(fixture.update_options()).run_update().unwrap();
    let readme = read(&fixture.dst.join("README.md"));
    assert!(
        readme.contains("<<<<<<< before updating\nline d mine\n=======\nline d template\n>>>>>>> after updating\n"),
        "README was:\n{}",
        readme
    );
    assert!(!fixture.dst.join("README.md.rej").exists());
    assert!(fixture.answers().contains("_commit: v2.0.0"));
}

#[test]
fn test_update_conflict_rej_file() {
    let fixture = Fixture::new();
    fixture.edit("README.md", "line d", "line d mine");
    fixture.release(
        "v2.0.0",
        &[("README.md.hbs", &README_V1.replace("line d", "line d template"))],
        &[],
    );

    Worker::new(WorkerOptions {
        conflict: ConflictPolicy::Rej,
        context_lines: 1,
        ..fixture.update_options()
    })
    .run_update()
    .unwrap();

    let readme = read(&fixture.dst.join("README.md"));
    assert!(readme.contains("line d mine\n"));
    assert!(!readme.contains("<<<<<<<"));
    let rej = read(&fixture.dst.join("README.md.rej"));
    assert!(rej.starts_with("diff a/README.md b/README.md\t(rejected hunks)\n@@ "));
    assert!(rej.contains("-line d\n+line d template\n"));
}

#[test]
fn test_update_pretend_changes_nothing() {
    let fixture = Fixture::new();
    fixture.release("v2.0.0", &[("README.md.hbs", &readme_v2("footer v2"))], &["obsolete.txt"]);
    let before = read(&fixture.dst.join("README.md"));

    let mut worker = Worker::new(WorkerOptions {
        pretend: true,
        ..fixture.update_options()
    });
    worker.run_update().unwrap();
    assert_eq!(worker.stage(), Stage::Done);
    assert_eq!(read(&fixture.dst.join("README.md")), before);
    assert!(fixture.dst.join("obsolete.txt").exists());
    assert!(fixture.answers().contains("_commit: v1.0.0"));
}

#[test]
fn test_update_requires_recorded_commit() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let src = temp.path().join("plain");
    build_file_tree(&src, &[("a.txt", "a\n")]);
    let dst = temp.path().join("out");
    Worker::new(options(&src, &dst)).run_copy().unwrap();

    let err = Worker::new(WorkerOptions {
        dst_path: dst.clone(),
        defaults: true,
        quiet: true,
        ..Default::default()
    })
    .run_update()
    .unwrap_err();
    assert!(err.to_string().contains("previous template version is unknown"), "{}", err);
}

#[cfg(unix)]
#[test]
fn test_update_runs_migrations_in_range() {
    let fixture = Fixture::new();
    let config = format!(
        "{}{}",
        CONFIG_V1,
        r#"
_migrations:
  - version: v1.0.0
    before: ["echo too-old >> migrations.log"]
  - version: v2.0.0
    before: ["echo before $STAGE $VERSION_FROM $VERSION_TO >> migrations.log"]
    after: ["echo after $STAGE >> migrations.log"]
  - version: v3.0.0
    before: ["echo too-new >> migrations.log"]
"#
    );
    fixture.release("v2.0.0", &[("krupy.yml", &config)], &[]);

    let err = Worker::new(fixture.update_options()).run_update().unwrap_err();
    assert!(matches!(&err, KrupyError::UnsafeTemplate { features } if features.contains(&"migrations".to_string())));

    Worker::new(WorkerOptions {
        trust: true,
        ..fixture.update_options()
    })
    .run_update()
    .unwrap();
    assert_eq!(
        read(&fixture.dst.join("migrations.log")),
        "before before v1.0.0 v2.0.0\nafter after\n"
    );
}

// =============================================================================
// Recopy
// =============================================================================

#[test]
fn test_recopy_reuses_answers_and_discards_history() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let repo = temp.path().join("template");
    git_init(&repo);
    build_file_tree(&repo, &[("krupy.yml", CONFIG_V1), ("README.md.hbs", README_V1)]);
    git_commit_tag(&repo, "v1", "v1.0.0");

    let dst = temp.path().join("project");
    let mut data = questionnaire::AnswerMap::new();
    data.insert("name".into(), json!("custom"));
    Worker::new(WorkerOptions {
        data,
        ..options(&repo, &dst)
    })
    .run_copy()
    .unwrap();

    fs::write(dst.join("README.md"), "rewritten locally\n").unwrap();
    build_file_tree(&repo, &[("README.md.hbs", &readme_v2("footer v2"))]);
    git_commit_tag(&repo, "v2", "v2.0.0");

    let mut worker = Worker::new(WorkerOptions {
        dst_path: dst.clone(),
        defaults: true,
        overwrite: true,
        quiet: true,
        ..Default::default()
    });
    worker.run_recopy().expect("recopy should succeed");

    assert_eq!(
        read(&dst.join("README.md")),
        readme_v2("footer v2").replace("{{ name }}", "custom")
    );
    let answers = read(&dst.join(".krupy-answers.yml"));
    assert!(answers.contains("name: custom"));
    assert!(answers.contains("_commit: v2.0.0"));
}

#[test]
fn test_recopy_without_answers_file_fails() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let err = Worker::new(WorkerOptions {
        dst_path: temp.path().to_path_buf(),
        defaults: true,
        quiet: true,
        ..Default::default()
    })
    .run_recopy()
    .unwrap_err();
    assert!(err.to_string().contains("template source is not recorded"));
}
