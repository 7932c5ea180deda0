//! Line-oriented editing of keyword-style input decks.
//!
//! Backends that take run-time switches through the input deck (scratch path,
//! restart mode, memory mode) rewrite the copied deck in the working directory
//! before launch. A directive is a keyword line optionally followed by value
//! lines; replacing one means removing the old block and inserting a new one
//! under a section anchor.

use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Deck {
    lines: Vec<String>,
}

impl Deck {
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.to_string())
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.lines.iter().any(|line| line.contains(pattern))
    }

    /// Removes `count` lines starting at the first line containing `keyword`.
    /// Returns true if a block was removed.
    pub fn remove(&mut self, keyword: &str, count: usize) -> bool {
        let Some(start) = self.lines.iter().position(|l| l.contains(keyword)) else {
            return false;
        };
        let end = (start + count).min(self.lines.len());
        self.lines.drain(start..end);
        true
    }

    /// Inserts `block` (possibly multi-line) after every line containing `anchor`.
    /// Returns the number of insertions.
    pub fn insert_after(&mut self, anchor: &str, block: &str) -> usize {
        let block: Vec<String> = block.lines().map(str::to_string).collect();
        let mut out = Vec::with_capacity(self.lines.len() + block.len());
        let mut inserted = 0;
        for line in self.lines.drain(..) {
            let hit = line.contains(anchor);
            out.push(line);
            if hit {
                out.extend(block.iter().cloned());
                inserted += 1;
            }
        }
        self.lines = out;
        inserted
    }

    /// Replaces a directive: drops the old `count`-line block found by
    /// `keyword`, then inserts `block` under `anchor`.
    pub fn replace(&mut self, keyword: &str, count: usize, anchor: &str, block: &str) -> usize {
        self.remove(keyword, count);
        self.insert_after(anchor, block)
    }
}

impl std::fmt::Display for Deck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}
