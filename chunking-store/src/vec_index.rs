//! KNN search over the `vec0` tables and the vector wire format.
//!
//! Vectors are stored as fixed-width little-endian f32 arrays with no length
//! prefix, in the order the embedder produced them.

use crate::sqlite_repo::{record_from_row, SqliteRepo, CHUNK_COLUMNS};
use crate::{SearchHit, StoreError, VectorSpace};

pub fn encode_vector(v: &[f32]) -> Vec<u8> {
    #[cfg(target_endian = "little")]
    {
        bytemuck::cast_slice::<f32, u8>(v).to_vec()
    }
    #[cfg(not(target_endian = "little"))]
    {
        v.iter().flat_map(|x| x.to_le_bytes()).collect()
    }
}

pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>, StoreError> {
    if bytes.len() % 4 != 0 {
        return Err(StoreError::Backend(format!("vector blob of {} bytes is not f32-aligned", bytes.len())));
    }
    #[cfg(target_endian = "little")]
    {
        Ok(bytemuck::pod_collect_to_vec::<u8, f32>(bytes))
    }
    #[cfg(not(target_endian = "little"))]
    {
        Ok(bytes.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])).collect())
    }
}

/// Largest `k` the `vec0` module accepts in a KNN query.
pub const MAX_KNN_K: usize = 4096;

/// Nearest-neighbour search in one embedding space, nearest first.
#[derive(Default)]
pub struct VecIndex;

impl VecIndex {
    pub fn new() -> Self { Self }

    /// Returns an empty list when vectors are unavailable or `k == 0`.
    /// `k` is capped at [`MAX_KNN_K`].
    pub fn knn_search(
        &self,
        repo: &SqliteRepo,
        space: VectorSpace,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        if !repo.vector_available() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != repo.dimension() {
            return Err(StoreError::Dimension { expected: repo.dimension(), actual: query.len() });
        }
        let sql = format!(
            "WITH knn AS ( \n\
                SELECT rowid, distance FROM {table} WHERE embedding MATCH ?1 AND k = ?2 \n\
             ) \n\
             SELECT {CHUNK_COLUMNS}, knn.distance \n\
             FROM knn JOIN chunks c ON c.rowid = knn.rowid \n\
             ORDER BY knn.distance",
            table = space.table(),
        );
        let mut stmt = repo.conn().prepare(&sql)?;
        let k = k.min(MAX_KNN_K) as i64;
        let rows = stmt.query_map(rusqlite::params![encode_vector(query), k], |row| {
            let chunk = record_from_row(row)?;
            let distance: f64 = row.get(9)?;
            Ok(SearchHit { chunk, score: distance })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}
