///
/// Ranking functions against real FTS4 `matchinfo()` output.
///

use rusqlite::Connection;
use tessera_core::{ExtensionConfig, SqlValue};
use tessera_rank::Scorer;
use tessera_sqlite::ExtConnection;

fn corpus() -> ExtConnection {
    let conn = ExtConnection::open_in_memory(ExtensionConfig::default()).unwrap();
    conn.execute_batch(
        "CREATE VIRTUAL TABLE docs USING fts4(title, body);
         INSERT INTO docs (rowid, title, body) VALUES
             (1, 'rust rust rust', 'systems programming in rust'),
             (2, 'python', 'a snake named rust'),
             (3, 'cooking', 'pasta recipes');",
    )
    .unwrap();
    conn
}

fn ranked(conn: &Connection, function: &str, format: &str) -> Vec<(i64, f64)> {
    let sql = format!(
        "SELECT rowid, {}(matchinfo(docs, '{}')) AS score
         FROM docs WHERE docs MATCH 'rust' ORDER BY score",
        function, format
    );
    let mut stmt = conn.prepare(&sql).unwrap();
    stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
}

#[test]
fn test_best_match_sorts_first() {
    let conn = corpus();
    for scorer in Scorer::ALL {
        let format = match scorer {
            Scorer::Rank => "pcx",
            _ => "pcnalx",
        };
        let rows = ranked(conn.connection(), scorer.sql_name(), format);
        let ids: Vec<i64> = rows.iter().map(|r| r.0).collect();
        assert_eq!(ids, vec![1, 2], "{}", scorer.sql_name());
        assert!(rows[0].1 < 0.0, "{}", scorer.sql_name());
    }
}

#[test]
fn test_sql_score_matches_library_score() {
    let conn = corpus();
    let mut stmt = conn
        .connection()
        .prepare(
            "SELECT matchinfo(docs, 'pcnalx'), fts_bm25(matchinfo(docs, 'pcnalx'), 2.0, 0.5)
             FROM docs WHERE docs MATCH 'rust'",
        )
        .unwrap();
    let rows: Vec<(SqlValue, f64)> = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(rows.len(), 2);
    for (buf, score) in rows {
        let SqlValue::Blob(buf) = buf else {
            panic!("matchinfo returned {}", buf.type_name());
        };
        let expected = tessera_rank::bm25(&buf, &[2.0, 0.5]).unwrap();
        assert_eq!(score, expected);
    }
}

#[test]
fn test_zero_weight_ignores_column() {
    let conn = corpus();
    let title_only: Vec<f64> = {
        let mut stmt = conn
            .connection()
            .prepare(
                "SELECT fts_rank(matchinfo(docs, 'pcx'), 1.0, 0.0)
                 FROM docs WHERE docs MATCH 'rust' ORDER BY rowid",
            )
            .unwrap();
        stmt.query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    };
    // Row 2 only mentions the term in its body.
    assert!(title_only[0] < 0.0);
    assert_eq!(title_only[1], 0.0);
}

#[test]
fn test_wrong_layout_is_an_error() {
    let conn = corpus();
    let err = conn.connection().query_row(
        "SELECT fts_bm25(matchinfo(docs, 'pcx')) FROM docs WHERE docs MATCH 'rust'",
        [],
        |r| r.get::<_, f64>(0),
    );
    assert!(err.is_err());
}
