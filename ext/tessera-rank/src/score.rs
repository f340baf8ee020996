//!
//! Relevance Scores
//!
//! Each scorer parses the matchinfo buffer for its layout, resolves the
//! per-column weights and accumulates a sum over every (phrase, column)
//! pair with a non-zero weight. The negated sum is returned.
//!
//! Weights: none given means 1.0 for every column. Otherwise column `i`
//! takes `weights[i]`, and columns past the end of the list get 0.0.
//!

use tessera_core::ExtResult;

use crate::matchinfo::{Layout, MatchInfo};

pub const BM25_K1: f64 = 1.2;
pub const BM25_B: f64 = 0.75;
/// Lower bound for BM25 idf of terms present in at least half the rows.
pub const BM25_IDF_FLOOR: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scorer {
    Rank,
    Lucene,
    Bm25,
    Bm25f,
}

impl Scorer {
    pub const ALL: [Scorer; 4] = [Scorer::Rank, Scorer::Lucene, Scorer::Bm25, Scorer::Bm25f];

    pub fn layout(&self) -> Layout {
        match self {
            Scorer::Rank => Layout::Pcx,
            _ => Layout::Pcnalx,
        }
    }

    /// Name of the SQL scalar function.
    pub fn sql_name(&self) -> &'static str {
        match self {
            Scorer::Rank => "fts_rank",
            Scorer::Lucene => "fts_lucene",
            Scorer::Bm25 => "fts_bm25",
            Scorer::Bm25f => "fts_bm25f",
        }
    }

    pub fn score(&self, buf: &[u8], weights: &[f64]) -> ExtResult<f64> {
        match self {
            Scorer::Rank => rank(buf, weights),
            Scorer::Lucene => lucene(buf, weights),
            Scorer::Bm25 => bm25(buf, weights),
            Scorer::Bm25f => bm25f(buf, weights),
        }
    }
}

pub fn resolve_weights(columns: usize, raw: &[f64]) -> Vec<f64> {
    if raw.is_empty() {
        return vec![1.0; columns];
    }
    (0..columns)
        .map(|i| raw.get(i).copied().unwrap_or(0.0))
        .collect()
}

pub fn rank(buf: &[u8], weights: &[f64]) -> ExtResult<f64> {
    let mi = MatchInfo::parse(buf, Layout::Pcx)?;
    let weights = resolve_weights(mi.columns(), weights);
    let mut score = 0.0;

    for phrase in 0..mi.phrases() {
        for (column, &weight) in weights.iter().enumerate() {
            if weight == 0.0 {
                continue;
            }
            let hits = mi.hits(phrase, column);
            if hits > 0 {
                let global_hits = mi.global_hits(phrase, column) as f64;
                score += weight * (hits as f64 / global_hits);
            }
        }
    }

    Ok(-score)
}

pub fn lucene(buf: &[u8], weights: &[f64]) -> ExtResult<f64> {
    let mi = MatchInfo::parse(buf, Layout::Pcnalx)?;
    let weights = resolve_weights(mi.columns(), weights);
    let total_docs = mi.total_docs().unwrap_or(0) as f64;
    let mut score = 0.0;

    for phrase in 0..mi.phrases() {
        for (column, &weight) in weights.iter().enumerate() {
            if weight == 0.0 {
                continue;
            }
            let hits = mi.hits(phrase, column);
            // tf = 0 contributes nothing; skipping also avoids 0 * -inf when N = 0.
            if hits == 0 {
                continue;
            }
            let docs_with_term = mi.docs_with_term(phrase, column) as f64;
            let idf = (total_docs / (docs_with_term + 1.0)).ln();
            let tf = (hits as f64).sqrt();
            let norm = 1.0 / (mi.row_length(column).max(1) as f64).sqrt();
            score += weight * idf * tf * norm;
        }
    }

    Ok(-score)
}

pub fn bm25(buf: &[u8], weights: &[f64]) -> ExtResult<f64> {
    let mi = MatchInfo::parse(buf, Layout::Pcnalx)?;
    let weights = resolve_weights(mi.columns(), weights);
    let total_docs = mi.total_docs().unwrap_or(0) as f64;
    let mut score = 0.0;

    for phrase in 0..mi.phrases() {
        for (column, &weight) in weights.iter().enumerate() {
            if weight == 0.0 {
                continue;
            }
            let hits = mi.hits(phrase, column) as f64;
            let docs_with_term = mi.docs_with_term(phrase, column) as f64;

            let mut idf = ((total_docs - docs_with_term + 0.5) / (docs_with_term + 0.5)).ln();
            if idf <= 0.0 {
                idf = BM25_IDF_FLOOR;
            }

            let avg_length = mi.avg_length(column).max(1) as f64;
            let ratio = mi.row_length(column) as f64 / avg_length;

            let num = hits * (BM25_K1 + 1.0);
            let denom = hits + BM25_K1 * (1.0 - BM25_B + BM25_B * ratio);
            score += weight * idf * (num / denom);
        }
    }

    Ok(-score)
}

pub fn bm25f(buf: &[u8], weights: &[f64]) -> ExtResult<f64> {
    let mi = MatchInfo::parse(buf, Layout::Pcnalx)?;
    let weights = resolve_weights(mi.columns(), weights);
    let total_docs = mi.total_docs().unwrap_or(0) as f64;

    let mut avg_length = 0.0;
    let mut doc_length = 0.0;
    for column in 0..mi.columns() {
        avg_length += mi.avg_length(column) as f64;
        doc_length += mi.row_length(column) as f64;
    }

    // The floor is taken from the raw average sum, before the zero guard.
    let epsilon = 1.0 / (total_docs * avg_length);
    if avg_length == 0.0 {
        avg_length = 1.0;
    }
    let ratio = doc_length / avg_length;
    let mut score = 0.0;

    for phrase in 0..mi.phrases() {
        for (column, &weight) in weights.iter().enumerate() {
            if weight == 0.0 {
                continue;
            }
            let hits = mi.hits(phrase, column) as f64;
            let docs_with_term = mi.docs_with_term(phrase, column) as f64;

            let mut idf = ((total_docs - docs_with_term + 0.5) / (docs_with_term + 0.5)).ln();
            if idf <= 0.0 {
                idf = epsilon;
            }

            let num = hits * (BM25_K1 + 1.0);
            let denom = hits + BM25_K1 * (1.0 - BM25_B + BM25_B * ratio);
            score += weight * idf * ((num / denom) + 1.0);
        }
    }

    Ok(-score)
}
