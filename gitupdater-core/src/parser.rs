//! Line-oriented parser for gitupdater config sources.
//!
//! # Format
//!
//! ```text
//! # comment            ; also a comment
//! jobs = 2             (top-level option)
//! ~/notes              (bare path: a target with no overrides)
//!
//! [DEFAULT]            (options section, any case)
//! quiet = yes
//!
//! [dotfiles]           (target section)
//! path = ~/dotfiles
//! remote = origin
//! branch = main
//! url = git@example.com:me/dotfiles.git
//! ```
//!
//! Parsing never fails as a whole. Every problem is reported as a
//! [`ConfigError::Malformed`] carrying the line number, and the offending entry
//! is skipped.

use std::path::Path;

use crate::error::ConfigError;
use crate::paths::expand_home;
use crate::types::{OptionOverrides, RepoTarget, TargetName};

/// Everything one source contributes.
#[derive(Debug, Default)]
pub struct ParsedSource {
    pub options: OptionOverrides,
    pub targets: Vec<RepoTarget>,
    /// Recovered problems, always [`ConfigError::Malformed`].
    pub problems: Vec<ConfigError>,
}

#[derive(Debug)]
struct PendingTarget {
    name: String,
    line: usize,
    path: Option<String>,
    remote: Option<String>,
    branch: Option<String>,
    url: Option<String>,
}

#[derive(Debug)]
enum Section {
    Global,
    Target(PendingTarget),
    /// Body of a broken header; ignored until the next header.
    Skipped,
}

/// Parse the text of one config source. `origin` is used for diagnostics and
/// recorded on each target; `home` expands `~`.
pub fn parse_source(text: &str, origin: &Path, home: &Path) -> ParsedSource {
    let mut out = ParsedSource::default();
    let mut section = Section::Global;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(header) = line.strip_prefix('[') {
            finish_section(std::mem::replace(&mut section, Section::Skipped), origin, home, &mut out);
            let Some(name) = header.strip_suffix(']') else {
                out.problems.push(ConfigError::malformed(
                    origin,
                    line_no,
                    format!("unterminated section header '{line}'"),
                ));
                continue;
            };
            let name = name.trim();
            section = if name.is_empty() {
                out.problems
                    .push(ConfigError::malformed(origin, line_no, "empty section name"));
                Section::Skipped
            } else if name.eq_ignore_ascii_case("default") {
                Section::Global
            } else {
                Section::Target(PendingTarget {
                    name: name.to_string(),
                    line: line_no,
                    path: None,
                    remote: None,
                    branch: None,
                    url: None,
                })
            };
            continue;
        }

        match (&mut section, split_key_value(line)) {
            (Section::Skipped, _) => {}
            (_, Some((key, ""))) => {
                out.problems.push(ConfigError::malformed(
                    origin,
                    line_no,
                    format!("empty value for `{key}`"),
                ));
            }
            (Section::Global, Some((key, value))) => {
                if let Err(reason) = out.options.set(&key.to_ascii_lowercase(), value) {
                    out.problems
                        .push(ConfigError::malformed(origin, line_no, reason));
                }
            }
            (Section::Global, None) => {
                out.targets.push(
                    RepoTarget::new(line, expand_home(line, home)).with_origin(origin),
                );
            }
            (Section::Target(pending), Some((key, value))) => {
                let value = Some(value.to_string());
                match key.to_ascii_lowercase().as_str() {
                    "path" => pending.path = value,
                    "remote" => pending.remote = value,
                    "branch" => pending.branch = value,
                    "url" => pending.url = value,
                    other => out.problems.push(ConfigError::malformed(
                        origin,
                        line_no,
                        format!("unknown key `{other}` in [{}]", pending.name),
                    )),
                }
            }
            (Section::Target(pending), None) => {
                out.problems.push(ConfigError::malformed(
                    origin,
                    line_no,
                    format!("expected `key = value` inside [{}]", pending.name),
                ));
            }
        }
    }

    finish_section(section, origin, home, &mut out);
    out
}

fn finish_section(section: Section, origin: &Path, home: &Path, out: &mut ParsedSource) {
    let Section::Target(pending) = section else {
        return;
    };
    let Some(path) = pending.path else {
        out.problems.push(ConfigError::malformed(
            origin,
            pending.line,
            format!("section [{}] has no `path`", pending.name),
        ));
        return;
    };
    if pending.branch.is_some() && pending.remote.is_none() {
        out.problems.push(ConfigError::malformed(
            origin,
            pending.line,
            format!("section [{}] sets `branch` without `remote`", pending.name),
        ));
        return;
    }
    out.targets.push(RepoTarget {
        name: TargetName::from(pending.name),
        path: expand_home(&path, home),
        remote: pending.remote,
        branch: pending.branch,
        url: pending.url,
        origin: origin.to_path_buf(),
    });
}

/// Splits `key = value` / `key: value`. The key must look like an identifier,
/// so a bare path containing `:` or `=` is not mistaken for an option.
fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let pos = line.find(['=', ':'])?;
    let key = line[..pos].trim();
    let is_ident = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !is_ident {
        return None;
    }
    Some((key, line[pos + 1..].trim()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn parse(text: &str) -> ParsedSource {
        parse_source(text, Path::new("/cfg/gitupdater"), Path::new("/home/u"))
    }

    fn reasons(parsed: &ParsedSource) -> Vec<(usize, String)> {
        parsed
            .problems
            .iter()
            .map(|p| match p {
                ConfigError::Malformed { line, reason, .. } => (*line, reason.clone()),
                other => panic!("unexpected problem: {other}"),
            })
            .collect()
    }

    #[test]
    fn sections_and_bare_paths_produce_targets_in_order() {
        let parsed = parse(
            "~/notes\n\
             [dotfiles]\n\
             path = ~/dotfiles\n\
             remote = upstream\n\
             branch = main\n\
             url = git@example.com:me/dotfiles.git\n",
        );
        assert!(parsed.problems.is_empty(), "{:?}", parsed.problems);
        assert_eq!(parsed.targets.len(), 2);
        assert_eq!(parsed.targets[0].name, TargetName::from("~/notes"));
        assert_eq!(parsed.targets[0].path, PathBuf::from("/home/u/notes"));
        let dotfiles = &parsed.targets[1];
        assert_eq!(dotfiles.path, PathBuf::from("/home/u/dotfiles"));
        assert_eq!(dotfiles.remote.as_deref(), Some("upstream"));
        assert_eq!(dotfiles.branch.as_deref(), Some("main"));
        assert_eq!(
            dotfiles.url.as_deref(),
            Some("git@example.com:me/dotfiles.git")
        );
        assert_eq!(dotfiles.origin, PathBuf::from("/cfg/gitupdater"));
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let parsed = parse("# header\n\n; other\n   # indented\n/srv/app\n");
        assert!(parsed.problems.is_empty());
        assert_eq!(parsed.targets.len(), 1);
    }

    #[test]
    fn default_section_and_top_level_set_options() {
        let parsed = parse("jobs = 2\n[Default]\nquiet: yes\nignore_untracked_files = on\n");
        assert!(parsed.problems.is_empty(), "{:?}", parsed.problems);
        assert_eq!(parsed.options.jobs, Some(2));
        assert_eq!(parsed.options.quiet, Some(true));
        assert_eq!(parsed.options.ignore_untracked_files, Some(true));
    }

    #[test]
    fn section_without_path_is_reported_and_skipped() {
        let parsed = parse("[broken]\nremote = origin\n[ok]\npath = /srv/ok\n");
        assert_eq!(parsed.targets.len(), 1);
        assert_eq!(parsed.targets[0].name, TargetName::from("ok"));
        assert_eq!(
            reasons(&parsed),
            vec![(1, "section [broken] has no `path`".to_string())]
        );
    }

    #[test]
    fn malformed_lines_do_not_stop_later_entries() {
        let parsed = parse(
            "jobs = many\n\
             [a]\n\
             path = /a\n\
             colour = red\n\
             just some words\n\
             [b\n\
             path = /ignored\n\
             [c]\n\
             path = /c\n",
        );
        let names: Vec<_> = parsed.targets.iter().map(|t| t.name.0.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        let lines: Vec<_> = reasons(&parsed).into_iter().map(|(l, _)| l).collect();
        assert_eq!(lines, vec![1, 4, 5, 6]);
        assert!(parsed.options.jobs.is_none());
    }

    #[test]
    fn empty_values_are_malformed() {
        let parsed = parse("[a]\npath =\n");
        assert!(parsed.targets.is_empty());
        let r = reasons(&parsed);
        assert_eq!(r[0], (2, "empty value for `path`".to_string()));
        assert_eq!(r[1], (1, "section [a] has no `path`".to_string()));
    }

    #[test]
    fn branch_requires_remote() {
        let parsed = parse("[a]\npath = /a\nbranch = main\n");
        assert!(parsed.targets.is_empty());
        assert_eq!(parsed.problems.len(), 1);
    }

    #[test]
    fn bare_path_with_colon_is_not_an_option() {
        let parsed = parse("/mnt/data:backup\n");
        assert!(parsed.problems.is_empty());
        assert_eq!(parsed.targets[0].path, PathBuf::from("/mnt/data:backup"));
    }
}
