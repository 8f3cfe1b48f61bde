//! `.gitignore` rules
//!
//! Every directory on the way to a path may carry a `.gitignore`. Rules are
//! evaluated from the workspace root downwards and the last matching rule
//! wins. Supported syntax:
//! - Glob patterns (`*.txt`, `docs/**/*.tmp`)
//! - `!pattern` re-includes a previously excluded path
//! - `pattern/` only matches directories
//! - A pattern containing `/` is relative to its `.gitignore`, otherwise it
//!   matches the entry name at any depth
//! - Comments (`#`) and blank lines
//!
//! A path inside an excluded directory stays excluded.

use glob::{MatchOptions, Pattern};
use histkit_core::engine::Result;
use histkit_core::fs::{EngineFs, ReadOptions};
use histkit_core::path::resolve_path;

pub const IGNORE_FILE: &str = ".gitignore";

#[derive(Debug, Clone)]
struct IgnoreRule {
    pattern: Pattern,
    negated: bool,
    dir_only: bool,
    anchored: bool,
}

impl IgnoreRule {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let (negated, line) = match line.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let (dir_only, line) = match line.strip_suffix('/') {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let anchored = line.contains('/');
        let line = line.trim_start_matches('/');
        let pattern = Pattern::new(line).ok()?;
        Some(Self {
            pattern,
            negated,
            dir_only,
            anchored,
        })
    }

    fn matches(&self, rel: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        let opts = MatchOptions {
            require_literal_separator: true,
            ..Default::default()
        };
        if self.anchored {
            self.pattern.matches_with(rel, opts)
        } else {
            let name = rel.rsplit('/').next().unwrap_or(rel);
            self.pattern.matches_with(name, opts)
        }
    }
}

/// Rules of one `.gitignore`
#[derive(Debug, Clone)]
struct IgnoreFile {
    /// Workspace-relative directory holding the file (`""` for the root)
    base: String,
    rules: Vec<IgnoreRule>,
}

impl IgnoreFile {
    /// Path relative to this file's directory, if it lies beneath it
    fn relative<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.base.is_empty() {
            return Some(path);
        }
        path.strip_prefix(self.base.as_str())?.strip_prefix('/')
    }
}

/// Ignore rules applying to one path and its ancestors
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    files: Vec<IgnoreFile>,
}

impl IgnoreRules {
    /// Parse the content of a `.gitignore` located in `base`
    pub fn add(&mut self, base: &str, content: &str) {
        let rules: Vec<IgnoreRule> = content.lines().filter_map(IgnoreRule::parse).collect();
        if !rules.is_empty() {
            self.files.push(IgnoreFile {
                base: base.trim_matches('/').to_string(),
                rules,
            });
        }
    }

    /// Read the `.gitignore` files of every ancestor directory of `filepath`
    pub async fn load(fs: &dyn EngineFs, work_dir: &str, filepath: &str) -> Result<Self> {
        let mut rules = Self::default();
        let mut bases = vec![String::new()];
        let components: Vec<&str> = filepath.split('/').filter(|c| !c.is_empty()).collect();
        for i in 1..components.len() {
            bases.push(components[..i].join("/"));
        }
        for base in bases {
            let path = resolve_path(&[work_dir, base.as_str(), IGNORE_FILE]);
            match fs.read_file(&path, ReadOptions::utf8()).await {
                Ok(content) => rules.add(&base, &content.into_text()),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(rules)
    }

    fn decide(&self, path: &str, is_dir: bool) -> bool {
        let mut ignored = false;
        for file in &self.files {
            let Some(rel) = file.relative(path) else {
                continue;
            };
            for rule in &file.rules {
                if rule.matches(rel, is_dir) {
                    ignored = !rule.negated;
                }
            }
        }
        ignored
    }

    /// Whether a workspace-relative path is excluded
    pub fn is_ignored(&self, filepath: &str, is_dir: bool) -> bool {
        let components: Vec<&str> = filepath.split('/').filter(|c| !c.is_empty()).collect();
        if components.is_empty() {
            return false;
        }
        for i in 1..components.len() {
            if self.decide(&components[..i].join("/"), true) {
                return true;
            }
        }
        self.decide(&components.join("/"), is_dir)
    }
}
