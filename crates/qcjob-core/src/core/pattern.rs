//! Shell-style wildcard matching for file names.
//!
//! Supported syntax:
//! - `*` matches zero or more characters
//! - `?` matches exactly one character
//! - `[abc]` / `[a-z]` matches one character in the set or range
//! - `[!abc]` / `[^abc]` matches one character NOT in the set
//!
//! Patterns are matched against a single file name, never a full path, so `*`
//! freely crosses every character.

use std::cell::Cell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Upper bound on recursive match calls for one name. Patterns such as
/// `*a*a*a*b` backtrack polynomially in the name length; past this budget the
/// name is reported as not matching.
const MAX_MATCH_CALLS: usize = 100_000;

/// Returns true if `pattern` matches the whole of `name`.
///
/// ```
/// use qcjob::core::pattern::wildcard_match;
///
/// assert!(wildcard_match("*.inp", "water.inp"));
/// assert!(wildcard_match("RESTART*", "RESTART.1"));
/// assert!(!wildcard_match("*.inp", "water.out"));
/// ```
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let input: Vec<char> = name.chars().collect();
    let calls = Cell::new(0usize);
    match_from(&pat, 0, &input, 0, &calls)
}

fn match_from(
    pat: &[char],
    mut pi: usize,
    input: &[char],
    mut ii: usize,
    calls: &Cell<usize>,
) -> bool {
    let count = calls.get() + 1;
    calls.set(count);
    if count > MAX_MATCH_CALLS {
        return false;
    }

    while pi < pat.len() {
        match pat[pi] {
            '*' => {
                while pi < pat.len() && pat[pi] == '*' {
                    pi += 1;
                }
                if pi == pat.len() {
                    return true;
                }
                return (ii..=input.len()).any(|start| match_from(pat, pi, input, start, calls));
            }
            '?' => {
                if ii >= input.len() {
                    return false;
                }
                pi += 1;
                ii += 1;
            }
            '[' => {
                if ii >= input.len() {
                    return false;
                }
                match match_class(pat, pi, input[ii]) {
                    Some((true, next)) => {
                        pi = next;
                        ii += 1;
                    }
                    Some((false, _)) => return false,
                    // Unterminated class: treat '[' literally.
                    None => {
                        if input[ii] != '[' {
                            return false;
                        }
                        pi += 1;
                        ii += 1;
                    }
                }
            }
            c => {
                if ii >= input.len() || input[ii] != c {
                    return false;
                }
                pi += 1;
                ii += 1;
            }
        }
    }
    ii == input.len()
}

/// Evaluates the class starting at `pat[start] == '['` against `c`.
/// Returns whether it matched and the index just past the closing `]`.
fn match_class(pat: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negated = matches!(pat.get(i), Some('!') | Some('^'));
    if negated {
        i += 1;
    }

    let mut matched = false;
    let mut first = true;
    while i < pat.len() {
        if pat[i] == ']' && !first {
            return Some((matched != negated, i + 1));
        }
        first = false;
        if i + 2 < pat.len() && pat[i + 1] == '-' && pat[i + 2] != ']' {
            if pat[i] <= c && c <= pat[i + 2] {
                matched = true;
            }
            i += 3;
        } else {
            if pat[i] == c {
                matched = true;
            }
            i += 1;
        }
    }
    None
}

/// Lists the entries directly inside `dir` (files or directories) whose names
/// match `pattern`, sorted by path.
pub fn list_matching(dir: &Path, pattern: &str) -> io::Result<Vec<PathBuf>> {
    let mut matches = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if wildcard_match(pattern, name) {
            matches.push(entry.path());
        }
    }
    matches.sort();
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn literal_and_star_patterns() {
        assert!(wildcard_match("LATEST", "LATEST"));
        assert!(!wildcard_match("LATEST", "LATEST2"));
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("pwscf.*", "pwscf.save"));
        assert!(!wildcard_match("pwscf.*", "pwscf"));
        assert!(wildcard_match("a*b*c", "aXXbYYc"));
        assert!(!wildcard_match("a*b*c", "aXXbYY"));
    }

    #[test]
    fn question_mark_matches_single_character() {
        assert!(wildcard_match("job?.inp", "job1.inp"));
        assert!(!wildcard_match("job?.inp", "job.inp"));
        assert!(!wildcard_match("job?.inp", "job12.inp"));
    }

    #[test]
    fn character_classes_and_negation() {
        assert!(wildcard_match("[abc].inp", "b.inp"));
        assert!(!wildcard_match("[abc].inp", "d.inp"));
        assert!(wildcard_match("mol[0-9]", "mol7"));
        assert!(!wildcard_match("mol[!0-9]", "mol7"));
        assert!(wildcard_match("mol[^0-9]", "molx"));
    }

    #[test]
    fn unterminated_class_is_literal() {
        assert!(wildcard_match("a[b", "a[b"));
        assert!(!wildcard_match("a[b", "ab"));
    }

    #[test]
    fn backtracking_heavy_patterns_stay_bounded() {
        let name = "a".repeat(30);
        let started = std::time::Instant::now();
        assert!(!wildcard_match("*a*a*a*a*a*a*b", &name));
        assert!(!wildcard_match("*a*a*a*a*a*a*a*a*a*a*a*a*b", &name.repeat(4)));
        assert!(started.elapsed() < std::time::Duration::from_secs(2));

        assert!(wildcard_match("a*a*a*a*a*a*a*a", "aaaaaaaaaaaaaaaa"));
        assert!(wildcard_match("*a*b*c", "XXXaYYYbZZZc"));
        assert!(!wildcard_match("*a*b*c", "XXXaYYYcZZZb"));
    }

    #[test]
    fn list_matching_returns_sorted_matches_only() {
        let dir = tempdir().unwrap();
        for name in ["c.inp", "a.inp", "b.out", "b.inp"] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        let found = list_matching(dir.path(), "*.inp").unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.inp", "b.inp", "c.inp"]);
    }
}
