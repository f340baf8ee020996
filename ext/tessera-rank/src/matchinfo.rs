//!
//! Matchinfo Buffer Layouts
//!
//! The buffer is an array of native-endian u32 words. With P phrases and C
//! columns:
//!
//! - `pcx`:    P, C, then 3*C*P phrase statistics
//! - `pcnalx`: P, C, N, C column averages, C row lengths, then 3*C*P statistics
//!
//! Phrase statistics are grouped by phrase, then column:
//! `[hits_in_row, hits_in_all_rows, docs_with_term]` for (p0, c0), (p0, c1), ...
//! The word count is checked against the header before anything is read.
//!

use tessera_core::{decode_words, ExtError, ExtResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `matchinfo(t, 'pcx')`
    Pcx,
    /// `matchinfo(t, 'pcnalx')`
    Pcnalx,
}

impl Layout {
    pub fn format_str(&self) -> &'static str {
        match self {
            Layout::Pcx => "pcx",
            Layout::Pcnalx => "pcnalx",
        }
    }

    fn header_words(&self) -> usize {
        match self {
            Layout::Pcx => 2,
            Layout::Pcnalx => 3,
        }
    }

    /// Total words for `phrases` x `columns`.
    pub fn expected_words(&self, phrases: usize, columns: usize) -> usize {
        let stats = phrases.saturating_mul(columns).saturating_mul(3);
        match self {
            Layout::Pcx => self.header_words().saturating_add(stats),
            Layout::Pcnalx => self
                .header_words()
                .saturating_add(columns.saturating_mul(2))
                .saturating_add(stats),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchInfo {
    layout: Layout,
    phrases: usize,
    columns: usize,
    words: Vec<u32>,
}

impl MatchInfo {
    pub fn parse(buf: &[u8], layout: Layout) -> ExtResult<Self> {
        let words = decode_words(buf)?;
        if words.len() < layout.header_words() {
            return Err(ExtError::Validation(format!(
                "matchinfo buffer too short for '{}': {} words",
                layout.format_str(),
                words.len()
            )));
        }
        let phrases = words[0] as usize;
        let columns = words[1] as usize;
        let expected = layout.expected_words(phrases, columns);
        if words.len() != expected {
            return Err(ExtError::Validation(format!(
                "matchinfo '{}' with {} phrases and {} columns needs {} words, got {}",
                layout.format_str(),
                phrases,
                columns,
                expected,
                words.len()
            )));
        }
        Ok(Self {
            layout,
            phrases,
            columns,
            words,
        })
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn phrases(&self) -> usize {
        self.phrases
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Total rows in the table (`n`), only present in `pcnalx`.
    pub fn total_docs(&self) -> Option<u32> {
        match self.layout {
            Layout::Pcx => None,
            Layout::Pcnalx => Some(self.words[2]),
        }
    }

    /// Average tokens in `column` across all rows (`a`).
    pub fn avg_length(&self, column: usize) -> u32 {
        match self.layout {
            Layout::Pcx => 0,
            Layout::Pcnalx => self.words[3 + column],
        }
    }

    /// Tokens in `column` of the current row (`l`).
    pub fn row_length(&self, column: usize) -> u32 {
        match self.layout {
            Layout::Pcx => 0,
            Layout::Pcnalx => self.words[3 + self.columns + column],
        }
    }

    pub fn hits(&self, phrase: usize, column: usize) -> u32 {
        self.words[self.stat_offset(phrase, column)]
    }

    pub fn global_hits(&self, phrase: usize, column: usize) -> u32 {
        self.words[self.stat_offset(phrase, column) + 1]
    }

    pub fn docs_with_term(&self, phrase: usize, column: usize) -> u32 {
        self.words[self.stat_offset(phrase, column) + 2]
    }

    fn stat_offset(&self, phrase: usize, column: usize) -> usize {
        let base = match self.layout {
            Layout::Pcx => 2,
            Layout::Pcnalx => 3 + 2 * self.columns,
        };
        base + 3 * (column + phrase * self.columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::encode_words;

    #[test]
    fn test_expected_words() {
        assert_eq!(Layout::Pcx.expected_words(1, 1), 5);
        assert_eq!(Layout::Pcx.expected_words(2, 3), 20);
        assert_eq!(Layout::Pcnalx.expected_words(1, 1), 8);
        assert_eq!(Layout::Pcnalx.expected_words(2, 3), 27);
    }

    #[test]
    fn test_parse_pcnalx_accessors() {
        // P=2, C=2, N=50, avg=[10, 4], len=[12, 3], then stats
        let words = [
            2, 2, 50, 10, 4, 12, 3, //
            1, 5, 4, /* p0 c0 */ 0, 2, 2, /* p0 c1 */
            3, 9, 6, /* p1 c0 */ 2, 7, 5, /* p1 c1 */
        ];
        let mi = MatchInfo::parse(&encode_words(&words), Layout::Pcnalx).unwrap();
        assert_eq!(mi.phrases(), 2);
        assert_eq!(mi.columns(), 2);
        assert_eq!(mi.total_docs(), Some(50));
        assert_eq!(mi.avg_length(1), 4);
        assert_eq!(mi.row_length(0), 12);
        assert_eq!(mi.hits(0, 0), 1);
        assert_eq!(mi.global_hits(0, 1), 2);
        assert_eq!(mi.hits(1, 0), 3);
        assert_eq!(mi.docs_with_term(1, 1), 5);
    }

    #[test]
    fn test_parse_pcx_accessors() {
        let words = [1, 2, 3, 10, 4, 0, 6, 2];
        let mi = MatchInfo::parse(&encode_words(&words), Layout::Pcx).unwrap();
        assert_eq!(mi.total_docs(), None);
        assert_eq!(mi.hits(0, 0), 3);
        assert_eq!(mi.global_hits(0, 0), 10);
        assert_eq!(mi.hits(0, 1), 0);
        assert_eq!(mi.docs_with_term(0, 1), 2);
    }

    #[test]
    fn test_rejects_wrong_length() {
        let words = [1, 1, 3, 10];
        let err = MatchInfo::parse(&encode_words(&words), Layout::Pcx).unwrap_err();
        assert!(err.to_string().contains("needs 5 words"));

        // A pcx buffer handed to a pcnalx scorer is rejected too.
        let words = [1, 1, 3, 10, 4];
        assert!(MatchInfo::parse(&encode_words(&words), Layout::Pcnalx).is_err());
    }

    #[test]
    fn test_rejects_short_and_ragged_buffers() {
        assert!(MatchInfo::parse(&[], Layout::Pcx).is_err());
        assert!(MatchInfo::parse(&encode_words(&[1]), Layout::Pcx).is_err());
        assert!(MatchInfo::parse(&[1, 0, 0], Layout::Pcx).is_err());
    }

    #[test]
    fn test_huge_header_does_not_overflow() {
        let words = [u32::MAX, u32::MAX, 0, 0];
        assert!(MatchInfo::parse(&encode_words(&words), Layout::Pcnalx).is_err());
    }
}
