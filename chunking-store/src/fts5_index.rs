use crate::sqlite_repo::{record_from_row, SqliteRepo, CHUNK_COLUMNS};
use crate::{SearchHit, StoreError};

/// Build an FTS5 MATCH expression that treats every token as a literal
/// phrase, so operator words and punctuation in queries cannot change the
/// query's meaning. Tokens are implicitly AND-ed.
pub fn fts_match_expression<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// FTS5-backed keyword search over the SQLite primary store.
/// Index maintenance is handled by SQLite triggers in the store.
#[derive(Default)]
pub struct Fts5Index;

impl Fts5Index {
    pub fn new() -> Self { Self }

    /// Best BM25 first. A match expression the FTS parser rejects yields
    /// [`StoreError::Query`] so callers can degrade instead of failing.
    pub fn search(&self, repo: &SqliteRepo, match_expr: &str, limit: usize) -> Result<Vec<SearchHit>, StoreError> {
        if match_expr.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {CHUNK_COLUMNS}, bm25(chunks_fts) AS rank \n\
             FROM chunks_fts \n\
             JOIN chunks c ON c.rowid = chunks_fts.rowid \n\
             WHERE chunks_fts MATCH ?1 \n\
             ORDER BY rank \n\
             LIMIT ?2"
        );
        let query_err = |e: rusqlite::Error| StoreError::Query(e.to_string());
        let mut stmt = repo.conn().prepare(&sql).map_err(query_err)?;
        let rows = stmt
            .query_map(rusqlite::params![match_expr, i64::try_from(limit).unwrap_or(i64::MAX)], |row| {
                let chunk = record_from_row(row)?;
                let rank: f64 = row.get(9)?;
                Ok(SearchHit { chunk, score: rank })
            })
            .map_err(query_err)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r.map_err(query_err)?);
        }
        Ok(out)
    }
}
