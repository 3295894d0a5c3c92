//! Ordered keyword tables over free text.
//!
//! Matching is ASCII case-insensitive and whole-word (a trailing plural `s`
//! is allowed). When several rows match, the earliest row wins.

use aho_corasick::{AhoCorasick, MatchKind};

pub struct KeywordTable<T> {
    matcher: AhoCorasick,
    /// pattern index -> row index
    rows: Vec<usize>,
    labels: Vec<T>,
}

impl<T: Copy> KeywordTable<T> {
    pub fn new(table: &[(&[&str], T)]) -> Result<Self, aho_corasick::BuildError> {
        let mut patterns = Vec::new();
        let mut rows = Vec::new();
        for (row, (words, _)) in table.iter().enumerate() {
            for word in *words {
                patterns.push(*word);
                rows.push(row);
            }
        }
        let matcher = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::Standard)
            .build(&patterns)?;
        Ok(Self {
            matcher,
            rows,
            labels: table.iter().map(|(_, label)| *label).collect(),
        })
    }

    /// Label of the earliest matching row.
    pub fn classify(&self, text: &str) -> Option<T> {
        let bytes = text.as_bytes();
        self.matcher
            .find_overlapping_iter(text)
            .filter(|m| is_whole_word(bytes, m.start(), m.end()))
            .map(|m| self.rows[m.pattern().as_usize()])
            .min()
            .map(|row| self.labels[row])
    }

    pub fn matches(&self, text: &str) -> bool {
        self.classify(text).is_some()
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_whole_word(text: &[u8], start: usize, end: usize) -> bool {
    if start > 0 && is_word_byte(text[start - 1]) {
        return false;
    }
    match text.get(end) {
        None => true,
        Some(&b) if !is_word_byte(b) => true,
        Some(b's' | b'S') => text.get(end + 1).is_none_or(|&b| !is_word_byte(b)),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Tag {
        A,
        B,
    }

    fn table() -> KeywordTable<Tag> {
        KeywordTable::new(&[(&["auth", "data loss"], Tag::A), (&["ui", "slow"], Tag::B)]).unwrap()
    }

    #[test]
    fn test_earliest_row_wins() {
        assert_eq!(table().classify("slow AUTH flow"), Some(Tag::A));
        assert_eq!(table().classify("page is slow"), Some(Tag::B));
        assert_eq!(table().classify("risk of data loss"), Some(Tag::A));
    }

    #[test]
    fn test_whole_words_only() {
        assert_eq!(table().classify("build guide"), None);
        assert_eq!(table().classify("author"), None);
        assert_eq!(table().classify("the UIs"), Some(Tag::B));
        assert!(!table().matches(""));
    }
}
