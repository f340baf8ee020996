///
/// tessera-rank - Full-Text Relevance Scoring
///
/// Decodes the FTS `matchinfo()` statistics buffer and computes four
/// relevance scores:
///
/// - `rank`   - hits in row over hits across all rows (`matchinfo(t, 'pcx')`)
/// - `lucene` - Lucene practical scoring (`matchinfo(t, 'pcnalx')`)
/// - `bm25`   - Okapi BM25, k1 = 1.2, b = 0.75 (`'pcnalx'`)
/// - `bm25f`  - BM25 with a document-level length ratio across columns (`'pcnalx'`)
///
/// Every score is returned negated so that `ORDER BY score` sorts the best
/// match first.
///

pub mod matchinfo;
pub mod score;

pub use matchinfo::*;
pub use score::*;
