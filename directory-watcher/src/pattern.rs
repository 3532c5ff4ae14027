//! Glob-lite pattern matching.
//!
//! Every glob in the system goes through [`Pattern`], in one of two dialects:
//!
//! - [`MatchStyle::Loose`] is used for ignore rules. `*` matches any run of
//!   characters *including* `/` and `?` matches exactly one character.
//! - [`MatchStyle::PathAware`] is used for the dependency map and watch
//!   targets. `**` matches across separators, while `*` and `?` stay inside a
//!   single path segment.
//!
//! Both dialects are anchored to the whole path and understand `[...]`
//! character classes (`[!...]` or `[^...]` negates).
//!
//! # Known limitation
//!
//! Ignore rules are not gitignore. There is no negation (`!pattern`), a
//! trailing `/` is not a directory marker, and a pattern without a slash does
//! not float to every depth. `node_modules/` therefore does not match
//! `node_modules/x.js`; write `node_modules/*` instead.

use std::path::{Component, Path};

use regex_lite::Regex;

use crate::error::{Result, WatcherError};

/// Glob dialect used when compiling a [`Pattern`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStyle {
    /// `*` crosses path separators.
    Loose,

    /// `**` crosses path separators, `*` does not.
    PathAware,
}

/// A compiled glob-lite pattern over normalized relative paths.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    style: MatchStyle,
    regex: Option<Regex>,
}

impl Pattern {
    /// Compile a pattern. The pattern is normalized the same way paths are.
    pub fn new(pattern: &str, style: MatchStyle) -> Result<Self> {
        let source = normalize_str(pattern);
        if source.is_empty() {
            return Err(invalid(pattern, "empty pattern"));
        }

        let regex = if has_wildcards(&source) {
            let translated = translate(&source, style).map_err(|reason| invalid(pattern, reason))?;
            let regex = Regex::new(&translated).map_err(|e| invalid(pattern, e.to_string()))?;
            Some(regex)
        } else {
            None
        };

        Ok(Self {
            source,
            style,
            regex,
        })
    }

    /// The normalized pattern text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The dialect this pattern was compiled with.
    pub fn style(&self) -> MatchStyle {
        self.style
    }

    /// Whether the pattern contains wildcards (as opposed to a literal path).
    pub fn is_glob(&self) -> bool {
        self.regex.is_some()
    }

    /// Match a normalized relative path against this pattern.
    pub fn matches(&self, path: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(path),
            None => self.source == path,
        }
    }
}

/// One-shot match. Invalid patterns never match.
pub fn matches(pattern: &str, path: &str, style: MatchStyle) -> bool {
    Pattern::new(pattern, style).is_ok_and(|p| p.matches(&normalize_str(path)))
}

/// Whether `s` contains glob metacharacters.
pub fn has_wildcards(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Normalize a path string to forward-slash relative form.
///
/// Backslashes become `/`, empty and `.` segments are dropped, `..` pops the
/// previous segment and a leading `/` is removed.
pub fn normalize_str(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Express `path` relative to `root` in normalized form.
///
/// Relative paths are taken as already relative to `root`. Returns `None` for
/// an absolute path outside `root`.
pub fn normalize_path(root: &Path, path: &Path) -> Option<String> {
    let relative = if path.is_absolute() {
        path.strip_prefix(root).ok()?
    } else {
        path
    };

    let mut segments: Vec<String> = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                segments.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    Some(normalize_str(&segments.join("/")))
}

fn invalid(pattern: &str, reason: impl Into<String>) -> WatcherError {
    WatcherError::PatternInvalid {
        pattern: pattern.to_string(),
        reason: reason.into(),
    }
}

fn translate(pattern: &str, style: MatchStyle) -> std::result::Result<String, String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("^(?:");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                let double = chars.get(i + 1) == Some(&'*');
                match style {
                    MatchStyle::Loose => {
                        out.push_str(".*");
                        i += if double { 2 } else { 1 };
                    }
                    MatchStyle::PathAware if double => {
                        i += 2;
                        // `**/` may also match zero directories.
                        if chars.get(i) == Some(&'/') {
                            out.push_str("(?:.*/)?");
                            i += 1;
                        } else {
                            out.push_str(".*");
                        }
                    }
                    MatchStyle::PathAware => {
                        out.push_str("[^/]*");
                        i += 1;
                    }
                }
            }
            '?' => {
                out.push_str(match style {
                    MatchStyle::Loose => ".",
                    MatchStyle::PathAware => "[^/]",
                });
                i += 1;
            }
            '[' => {
                let (class, next) = translate_class(&chars, i)?;
                out.push_str(&class);
                i = next;
            }
            other => {
                out.push_str(&regex_lite::escape(&other.to_string()));
                i += 1;
            }
        }
    }

    out.push_str(")$");
    Ok(out)
}

/// Translate the class starting at `chars[start] == '['`; returns the regex
/// fragment and the index after the closing `]`.
fn translate_class(chars: &[char], start: usize) -> std::result::Result<(String, usize), String> {
    let mut i = start + 1;
    let mut out = String::from("[");

    if matches!(chars.get(i), Some('!') | Some('^')) {
        out.push('^');
        i += 1;
    }

    let body_start = i;
    // A `]` right after the opening bracket is literal.
    if chars.get(i) == Some(&']') {
        out.push_str("\\]");
        i += 1;
    }

    while i < chars.len() && chars[i] != ']' {
        let c = chars[i];
        if matches!(c, '\\' | '[' | '^' | '&' | '~') {
            out.push('\\');
        }
        out.push(c);
        i += 1;
    }

    if i >= chars.len() {
        return Err("unclosed character class".to_string());
    }
    if i == body_start {
        return Err("empty character class".to_string());
    }

    out.push(']');
    Ok((out, i + 1))
}
