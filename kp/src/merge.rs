//! Three-way line merge
//!
//! `base` is the old template rendering, `ours` the destination and `theirs`
//! the new template rendering. Lines are aligned with `diff::slice`, then the
//! files are cut into stable runs (same line in all three) and change chunks
//! in between, diff3 style.
//!
//! Change chunks separated by fewer than `context_lines` stable lines are
//! judged together: a template change that lands within the context radius of
//! a destination change is a conflict, like a patch whose context no longer
//! applies.

use std::fmt;
use std::ops::Range;

use clap::ValueEnum;
use tracing::debug;

/// Opening conflict marker
pub const MARKER_OURS: &str = "<<<<<<< before updating";

/// Separator between the two sides of a conflict
pub const MARKER_SEPARATOR: &str = "=======";

/// Closing conflict marker
pub const MARKER_THEIRS: &str = ">>>>>>> after updating";

/// How conflicting regions are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ConflictPolicy {
    /// Keep the destination and write rejected hunks to a `.rej` file
    Rej,
    /// Embed both sides between conflict markers
    #[default]
    Inline,
}

/// One line of a rejected hunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Removed(String),
    Added(String),
}

impl fmt::Display for HunkLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HunkLine::Context(s) => write!(f, " {}", s),
            HunkLine::Removed(s) => write!(f, "-{}", s),
            HunkLine::Added(s) => write!(f, "+{}", s),
        }
    }
}

/// Template change that could not be applied, in unified diff form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<HunkLine>,
}

impl fmt::Display for Hunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_count, self.new_start, self.new_count
        )?;
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// Result of merging one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub content: String,
    /// Number of conflicting regions
    pub conflicts: usize,
    /// Rejected template hunks (rej policy only)
    pub rejects: Vec<Hunk>,
}

impl MergeOutcome {
    pub fn is_clean(&self) -> bool {
        self.conflicts == 0
    }
}

/// Format rejected hunks the way `git apply --reject` does
pub fn format_rej(path: &str, hunks: &[Hunk]) -> String {
    let mut out = format!("diff a/{0} b/{0}\t(rejected hunks)\n", path);
    for hunk in hunks {
        out.push_str(&hunk.to_string());
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Stable,
    Ours,
    Theirs,
    Same,
    Conflict,
}

#[derive(Debug, Clone)]
struct Region {
    base: Range<usize>,
    ours: Range<usize>,
    theirs: Range<usize>,
    kind: Kind,
}

fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// For each line of `a`, the index of the line of `b` it is aligned with
fn matching(a: &[&str], b: &[&str]) -> Vec<Option<usize>> {
    let mut map = vec![None; a.len()];
    let (mut i, mut j) = (0, 0);
    for result in diff::slice(a, b) {
        match result {
            diff::Result::Left(_) => i += 1,
            diff::Result::Right(_) => j += 1,
            diff::Result::Both(_, _) => {
                map[i] = Some(j);
                i += 1;
                j += 1;
            }
        }
    }
    map
}

fn classify(base: &[&str], ours: &[&str], theirs: &[&str]) -> Kind {
    match (ours != base, theirs != base) {
        (false, false) => Kind::Stable,
        (true, false) => Kind::Ours,
        (false, true) => Kind::Theirs,
        (true, true) if ours == theirs => Kind::Same,
        (true, true) => Kind::Conflict,
    }
}

fn regions(base: &[&str], ours: &[&str], theirs: &[&str]) -> Vec<Region> {
    let ours_map = matching(base, ours);
    let theirs_map = matching(base, theirs);
    let (mut i, mut j, mut k) = (0, 0, 0);
    let mut out = Vec::new();

    loop {
        let start = (i, j, k);
        while i < base.len() && ours_map[i] == Some(j) && theirs_map[i] == Some(k) {
            i += 1;
            j += 1;
            k += 1;
        }
        if i > start.0 {
            out.push(Region {
                base: start.0..i,
                ours: start.1..j,
                theirs: start.2..k,
                kind: Kind::Stable,
            });
        }
        if i >= base.len() && j >= ours.len() && k >= theirs.len() {
            break;
        }

        let (m, oj, tk) = (i..base.len())
            .find_map(|m| Some((m, ours_map[m]?, theirs_map[m]?)))
            .unwrap_or((base.len(), ours.len(), theirs.len()));
        out.push(Region {
            base: i..m,
            ours: j..oj,
            theirs: k..tk,
            kind: classify(&base[i..m], &ours[j..oj], &theirs[k..tk]),
        });
        i = m;
        j = oj;
        k = tk;
    }
    out
}

/// Fold change chunks that sit within the context radius of each other
fn cluster(regions: Vec<Region>, context_lines: usize) -> Vec<Region> {
    let mut out: Vec<Region> = Vec::with_capacity(regions.len());
    let mut index = 0;
    while index < regions.len() {
        if regions[index].kind == Kind::Stable {
            out.push(regions[index].clone());
            index += 1;
            continue;
        }

        // Extend the group while the stable gap to the next chunk is short
        let mut end = index;
        while end + 2 < regions.len()
            && regions[end + 1].kind == Kind::Stable
            && regions[end + 1].base.len() < context_lines
            && regions[end + 2].kind != Kind::Stable
        {
            end += 2;
        }

        let group = &regions[index..=end];
        let kinds: Vec<Kind> = group.iter().map(|r| r.kind).collect();
        let conflicting = kinds.contains(&Kind::Conflict)
            || (kinds.contains(&Kind::Ours) && kinds.contains(&Kind::Theirs));
        if conflicting && group.len() > 1 {
            let first = &group[0];
            let last = &group[group.len() - 1];
            out.push(Region {
                base: first.base.start..last.base.end,
                ours: first.ours.start..last.ours.end,
                theirs: first.theirs.start..last.theirs.end,
                kind: Kind::Conflict,
            });
        } else {
            out.extend(group.iter().cloned());
        }
        index = end + 1;
    }
    out
}

fn push_lines(out: &mut String, lines: &[&str]) {
    for line in lines {
        out.push_str(line);
    }
}

fn push_block(out: &mut String, lines: &[&str]) {
    push_lines(out, lines);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn strip_eol(line: &str) -> String {
    line.trim_end_matches('\n').trim_end_matches('\r').to_string()
}

fn reject_hunk(region: &Region, base: &[&str], theirs: &[&str], context_lines: usize) -> Hunk {
    let before = context_lines.min(region.base.start);
    let after = context_lines.min(base.len() - region.base.end);
    let mut lines = Vec::new();
    for line in &base[region.base.start - before..region.base.start] {
        lines.push(HunkLine::Context(strip_eol(line)));
    }
    for line in &base[region.base.clone()] {
        lines.push(HunkLine::Removed(strip_eol(line)));
    }
    for line in &theirs[region.theirs.clone()] {
        lines.push(HunkLine::Added(strip_eol(line)));
    }
    for line in &base[region.base.end..region.base.end + after] {
        lines.push(HunkLine::Context(strip_eol(line)));
    }
    Hunk {
        old_start: region.base.start - before + 1,
        old_count: before + region.base.len() + after,
        new_start: region.theirs.start.saturating_sub(before) + 1,
        new_count: before + region.theirs.len() + after,
        lines,
    }
}

/// Merge template changes from `base` to `theirs` into `ours`
pub fn merge3(base: &str, ours: &str, theirs: &str, context_lines: usize, policy: ConflictPolicy) -> MergeOutcome {
    debug!(context_lines, ?policy, "merge3: called");
    let base_lines = split_lines(base);
    let ours_lines = split_lines(ours);
    let theirs_lines = split_lines(theirs);

    let regions = cluster(regions(&base_lines, &ours_lines, &theirs_lines), context_lines);

    let mut content = String::with_capacity(ours.len().max(theirs.len()));
    let mut conflicts = 0;
    let mut rejects = Vec::new();
    for region in &regions {
        let ours_part = &ours_lines[region.ours.clone()];
        let theirs_part = &theirs_lines[region.theirs.clone()];
        match region.kind {
            Kind::Stable | Kind::Ours | Kind::Same => push_lines(&mut content, ours_part),
            Kind::Theirs => push_lines(&mut content, theirs_part),
            Kind::Conflict => {
                conflicts += 1;
                match policy {
                    ConflictPolicy::Inline => {
                        push_block(&mut content, &[]);
                        content.push_str(MARKER_OURS);
                        content.push('\n');
                        push_block(&mut content, ours_part);
                        content.push_str(MARKER_SEPARATOR);
                        content.push('\n');
                        push_block(&mut content, theirs_part);
                        content.push_str(MARKER_THEIRS);
                        content.push('\n');
                    }
                    ConflictPolicy::Rej => {
                        push_lines(&mut content, ours_part);
                        rejects.push(reject_hunk(region, &base_lines, &theirs_lines, context_lines));
                    }
                }
            }
        }
    }
    debug!(conflicts, "merge3: done");
    MergeOutcome {
        content,
        conflicts,
        rejects,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "a\nb\nc\nd\ne\nf\ng\nh\ni\nj\n";

    fn replace(text: &str, from: &str, to: &str) -> String {
        text.replacen(&format!("{}\n", from), &format!("{}\n", to), 1)
    }

    #[test]
    fn test_only_template_changed() {
        let theirs = replace(BASE, "c", "C");
        let out = merge3(BASE, BASE, &theirs, 3, ConflictPolicy::Inline);
        assert!(out.is_clean());
        assert_eq!(out.content, theirs);
    }

    #[test]
    fn test_only_destination_changed() {
        let ours = replace(BASE, "c", "local");
        let out = merge3(BASE, &ours, BASE, 3, ConflictPolicy::Inline);
        assert!(out.is_clean());
        assert_eq!(out.content, ours);
    }

    #[test]
    fn test_distant_changes_merge_cleanly() {
        let ours = replace(BASE, "a", "local");
        let theirs = replace(BASE, "j", "J");
        let out = merge3(BASE, &ours, &theirs, 3, ConflictPolicy::Inline);
        assert!(out.is_clean());
        assert_eq!(out.content, "local\nb\nc\nd\ne\nf\ng\nh\ni\nJ\n");
    }

    #[test]
    fn test_same_change_on_both_sides() {
        let changed = replace(BASE, "e", "E");
        let out = merge3(BASE, &changed, &changed, 3, ConflictPolicy::Inline);
        assert!(out.is_clean());
        assert_eq!(out.content, changed);
    }

    #[test]
    fn test_overlapping_change_inline_markers() {
        let ours = replace(BASE, "e", "mine");
        let theirs = replace(BASE, "e", "template");
        let out = merge3(BASE, &ours, &theirs, 3, ConflictPolicy::Inline);
        assert_eq!(out.conflicts, 1);
        assert_eq!(
            out.content,
            "a\nb\nc\nd\n<<<<<<< before updating\nmine\n=======\ntemplate\n>>>>>>> after updating\nf\ng\nh\ni\nj\n"
        );
    }

    #[test]
    fn test_context_radius() {
        // Two stable lines between the edits
        let ours = replace(BASE, "c", "mine");
        let theirs = replace(BASE, "f", "template");

        let tight = merge3(BASE, &ours, &theirs, 3, ConflictPolicy::Inline);
        assert_eq!(tight.conflicts, 1);
        assert!(tight.content.contains("<<<<<<< before updating\nmine\nd\ne\nf\n=======\nc\nd\ne\ntemplate\n"));

        let loose = merge3(BASE, &ours, &theirs, 1, ConflictPolicy::Inline);
        assert!(loose.is_clean());
        assert_eq!(loose.content, "a\nb\nmine\nd\ne\ntemplate\ng\nh\ni\nj\n");

        let zero = merge3(BASE, &ours, &theirs, 0, ConflictPolicy::Inline);
        assert!(zero.is_clean());
    }

    #[test]
    fn test_rej_keeps_destination() {
        let ours = replace(BASE, "e", "mine");
        let theirs = replace(BASE, "e", "template");
        let out = merge3(BASE, &ours, &theirs, 2, ConflictPolicy::Rej);
        assert_eq!(out.conflicts, 1);
        assert_eq!(out.content, ours);
        assert_eq!(out.rejects.len(), 1);

        let rej = format_rej("src/app.txt", &out.rejects);
        assert_eq!(
            rej,
            "diff a/src/app.txt b/src/app.txt\t(rejected hunks)\n@@ -3,5 +3,5 @@\n c\n d\n-e\n+template\n f\n g\n"
        );
    }

    #[test]
    fn test_missing_trailing_newline() {
        let base = "one\ntwo";
        let ours = "one\nmine";
        let theirs = "one\ntheirs";
        let out = merge3(base, ours, theirs, 3, ConflictPolicy::Inline);
        assert_eq!(out.conflicts, 1);
        assert_eq!(
            out.content,
            "one\n<<<<<<< before updating\nmine\n=======\ntheirs\n>>>>>>> after updating\n"
        );
    }

    #[test]
    fn test_added_on_both_sides_without_base() {
        let out = merge3("", "x\n", "y\n", 3, ConflictPolicy::Inline);
        assert_eq!(out.conflicts, 1);
        let same = merge3("", "x\n", "x\n", 3, ConflictPolicy::Inline);
        assert!(same.is_clean());
        assert_eq!(same.content, "x\n");
    }

    #[test]
    fn test_template_insertion_next_to_untouched_lines() {
        let theirs = "a\nb\nnew\nc\nd\ne\nf\ng\nh\ni\nj\n";
        let ours = replace(BASE, "h", "mine");
        let out = merge3(BASE, &ours, theirs, 3, ConflictPolicy::Inline);
        assert!(out.is_clean());
        assert_eq!(out.content, "a\nb\nnew\nc\nd\ne\nf\ng\nmine\ni\nj\n");
    }
}
