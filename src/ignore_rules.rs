//! Per-directory ignore rules
//!
//! Every directory may hold a `.treesealignore` file with one rule per line.
//! Rules apply to the bare names of that directory's direct children:
//!
//! - a line without wildcard characters matches one exact filename
//! - a line containing `*` or `?` is a pattern searched anywhere inside the
//!   filename (`*` matches any run of characters, `?` exactly one)
//!
//! The repository's own metadata directory and common version-control
//! directories are always skipped, with or without a rule file.
//!
//! ```text
//! # .treesealignore
//! Thumbs.db
//! *.tmp
//! build
//! ```

use regex::Regex;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Name of the per-directory rule file
pub const IGNORE_FILE_NAME: &str = ".treesealignore";

/// Directory holding repository metadata
pub const METADATA_DIR_NAME: &str = ".treeseal";

/// Directory names that are never scanned
pub const RESERVED_DIRECTORIES: &[&str] = &[METADATA_DIR_NAME, ".git", ".svn", ".cvs", ".hg"];

/// One parsed line of a rule file
#[derive(Debug, Clone)]
enum Rule {
    Literal(String),
    Pattern(Regex),
}

impl Rule {
    fn parse(line: &str) -> Rule {
        if !line.contains(['*', '?']) {
            return Rule::Literal(line.to_string());
        }

        match Regex::new(&wildcard_to_regex(line)) {
            Ok(regex) => Rule::Pattern(regex),
            Err(e) => {
                warn!("Invalid ignore pattern '{}', matching it literally: {}", line, e);
                Rule::Literal(line.to_string())
            }
        }
    }

    fn matches(&self, file_name: &str) -> bool {
        match self {
            Rule::Literal(name) => name == file_name,
            Rule::Pattern(regex) => regex.is_match(file_name),
        }
    }
}

/// Translate a wildcard line into an unanchored regular expression
fn wildcard_to_regex(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + 8);
    let mut literal = String::new();
    for c in line.chars() {
        match c {
            '*' | '?' => {
                out.push_str(&regex::escape(&literal));
                literal.clear();
                out.push_str(if c == '*' { ".*" } else { "." });
            }
            _ => literal.push(c),
        }
    }
    out.push_str(&regex::escape(&literal));
    out
}

/// Rules loaded from one directory's rule file
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    rules: Vec<Rule>,
}

impl IgnoreRules {
    /// Load the rules of `dir`
    ///
    /// A missing rule file yields no rules. An unreadable one is logged and
    /// treated as empty.
    pub fn load(dir: &Path) -> IgnoreRules {
        let path = dir.join(IGNORE_FILE_NAME);
        match fs::read_to_string(&path) {
            Ok(content) => {
                let rules = IgnoreRules::parse(&content);
                debug!("Loaded {} ignore rules from {:?}", rules.len(), path);
                rules
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => IgnoreRules::default(),
            Err(e) => {
                warn!("Cannot read ignore file {:?}: {}", path, e);
                IgnoreRules::default()
            }
        }
    }

    /// Parse rule file content
    pub fn parse(content: &str) -> IgnoreRules {
        let rules = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Rule::parse)
            .collect();
        IgnoreRules { rules }
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rule was loaded
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether a child named `file_name` is excluded
    pub fn is_ignored(&self, file_name: &str, is_dir: bool) -> bool {
        (is_dir && is_reserved_directory(file_name))
            || self.rules.iter().any(|rule| rule.matches(file_name))
    }
}

/// Whether `name` is a directory that is never scanned
pub fn is_reserved_directory(name: &str) -> bool {
    RESERVED_DIRECTORIES.contains(&name)
}
