use chunk_model::ChunkRecord;
use chunking_store::fts5_index::{fts_match_expression, Fts5Index};
use chunking_store::keywords::{KeywordTokenizer, UnicodeKeywordTokenizer};
use chunking_store::sqlite_repo::SqliteRepo;
use chunking_store::vec_index::{VecIndex, MAX_KNN_K};
use chunking_store::{ChunkPrimaryStore, ChunkVectors, IndexedChunk, StoreError, StoreOptions, VectorMode, VectorSpace};

const DIM: usize = 4;

fn opts(vector: VectorMode) -> StoreOptions {
    StoreOptions { dimension: DIM, vector }
}

fn chunk(path: &str, section: &str, line: u32, content: &str, axis: usize) -> IndexedChunk {
    let record = ChunkRecord::new("doc", path, section, content, line, line + 1)
        .with_keywords(UnicodeKeywordTokenizer.keywords(content))
        .with_updated_at("2026-01-01T00:00:00Z");
    let mut latin = vec![0.0f32; DIM];
    latin[axis % DIM] = 1.0;
    let mut cjk = vec![0.0f32; DIM];
    cjk[(axis + 1) % DIM] = 1.0;
    IndexedChunk { record, vectors: Some(ChunkVectors { latin, cjk }) }
}

fn lexical(repo: &SqliteRepo, query: &str) -> Vec<String> {
    let tokens = UnicodeKeywordTokenizer.tokenize(query);
    Fts5Index::new()
        .search(repo, &fts_match_expression(&tokens), 10)
        .expect("lexical search succeeds")
        .into_iter()
        .map(|h| h.chunk.section)
        .collect()
}

#[test]
fn replacing_a_path_twice_is_idempotent() {
    let mut repo = SqliteRepo::open_in_memory(&opts(VectorMode::Auto)).expect("open store");
    let chunks = vec![
        chunk("docs/a.md", "Install", 1, "install the tool", 0),
        chunk("docs/a.md", "Usage", 5, "use the tool daily", 1),
    ];

    repo.replace_chunks_for_path("docs/a.md", &chunks).expect("first write");
    let first = repo.chunks_for_path("docs/a.md").expect("read back");
    let report = repo.replace_chunks_for_path("docs/a.md", &chunks).expect("second write");
    let second = repo.chunks_for_path("docs/a.md").expect("read back");

    assert_eq!(report.stale_deleted, 2);
    assert_eq!(report.written, 2);
    assert_eq!(first, second);
    assert_eq!(repo.count_chunks().expect("count"), 2);
    assert_eq!(repo.count_vectors(VectorSpace::Latin).expect("count"), if repo.vector_available() { 2 } else { 0 });
}

#[test]
fn replacing_a_path_drops_stale_chunks_everywhere() {
    let mut repo = SqliteRepo::open_in_memory(&opts(VectorMode::Auto)).expect("open store");
    repo.replace_chunks_for_path(
        "docs/a.md",
        &[chunk("docs/a.md", "Old", 1, "legacy wording here", 0), chunk("docs/a.md", "Kept", 9, "stable text", 1)],
    )
    .expect("initial write");

    repo.replace_chunks_for_path("docs/a.md", &[chunk("docs/a.md", "Kept", 9, "stable text", 1)])
        .expect("rewrite");

    assert_eq!(lexical(&repo, "legacy"), Vec::<String>::new());
    assert_eq!(lexical(&repo, "stable"), vec!["Kept".to_string()]);
    assert_eq!(repo.count_chunks().expect("count"), 1);
    if repo.vector_available() {
        assert_eq!(repo.count_vectors(VectorSpace::Cjk).expect("count"), 1);
    }
}

#[test]
fn delete_for_path_leaves_other_paths_alone() {
    let mut repo = SqliteRepo::open_in_memory(&opts(VectorMode::Auto)).expect("open store");
    repo.replace_chunks_for_path("docs/a.md", &[chunk("docs/a.md", "A", 1, "alpha", 0)]).expect("write a");
    repo.replace_chunks_for_path("docs/b.md", &[chunk("docs/b.md", "B", 1, "beta", 1)]).expect("write b");

    assert_eq!(repo.delete_chunks_for_path("docs/a.md").expect("delete"), 1);
    assert_eq!(repo.delete_chunks_for_path("docs/missing.md").expect("delete"), 0);

    assert_eq!(repo.indexed_paths("docs/").expect("paths"), vec!["docs/b.md".to_string()]);
    assert!(lexical(&repo, "alpha").is_empty());
    assert_eq!(lexical(&repo, "beta"), vec!["B".to_string()]);
}

#[test]
fn upsert_with_same_identity_overwrites_in_place() {
    let mut repo = SqliteRepo::open_in_memory(&opts(VectorMode::Auto)).expect("open store");
    let original = chunk("docs/a.md", "Intro", 3, "first draft", 0);
    repo.upsert_chunks(vec![original.clone()]).expect("insert");

    let mut edited = chunk("docs/a.md", "Intro", 3, "second draft", 2);
    edited.record.line_end = 8;
    assert_eq!(edited.record.chunk_id, original.record.chunk_id);
    repo.upsert_chunk(&edited).expect("overwrite");

    let stored = repo.get_chunk_by_id(&original.record.chunk_id).expect("lookup").expect("present");
    assert_eq!(stored.content, "second draft");
    assert_eq!(stored.line_end, 8);
    assert_eq!(repo.count_chunks().expect("count"), 1);
    assert!(lexical(&repo, "first").is_empty());
    assert_eq!(lexical(&repo, "second"), vec!["Intro".to_string()]);
}

#[test]
fn malformed_match_expression_is_a_query_error() {
    let mut repo = SqliteRepo::open_in_memory(&opts(VectorMode::Auto)).expect("open store");
    repo.upsert_chunks(vec![chunk("docs/a.md", "A", 1, "alpha", 0)]).expect("insert");

    let err = Fts5Index::new().search(&repo, "\"unterminated", 5).expect_err("syntax error");
    assert!(matches!(err, StoreError::Query(_)), "unexpected error: {err:?}");
}

#[test]
fn knn_search_orders_by_cosine_distance() {
    let mut repo = SqliteRepo::open_in_memory(&opts(VectorMode::Auto)).expect("open store");
    repo.upsert_chunks(vec![
        chunk("docs/a.md", "X", 1, "x axis", 0),
        chunk("docs/a.md", "Y", 4, "y axis", 1),
        chunk("docs/a.md", "Z", 7, "z axis", 2),
    ])
    .expect("insert");

    let hits = VecIndex::new()
        .knn_search(&repo, VectorSpace::Latin, &[0.1, 0.9, 0.0, 0.0], 2)
        .expect("knn");
    if !repo.vector_available() {
        assert!(hits.is_empty());
        return;
    }
    let sections: Vec<&str> = hits.iter().map(|h| h.chunk.section.as_str()).collect();
    assert_eq!(sections, vec!["Y", "X"]);
    assert!(hits[0].score <= hits[1].score);

    let cjk = VecIndex::new()
        .knn_search(&repo, VectorSpace::Cjk, &[0.0, 0.0, 0.0, 1.0], 1)
        .expect("knn");
    assert_eq!(cjk[0].chunk.section, "Z");
}

#[test]
fn knn_k_beyond_the_module_limit_is_capped() {
    let mut repo = SqliteRepo::open_in_memory(&opts(VectorMode::Auto)).expect("open store");
    repo.upsert_chunks(vec![chunk("docs/a.md", "X", 1, "x axis", 0), chunk("docs/a.md", "Y", 4, "y axis", 1)])
        .expect("insert");

    for k in [MAX_KNN_K + 1, 6000, usize::MAX] {
        let hits = VecIndex::new()
            .knn_search(&repo, VectorSpace::Latin, &[1.0, 0.0, 0.0, 0.0], k)
            .expect("oversized k is capped, not rejected");
        assert_eq!(hits.len(), if repo.vector_available() { 2 } else { 0 });
    }
}

#[test]
fn huge_lexical_limit_is_accepted() {
    let mut repo = SqliteRepo::open_in_memory(&opts(VectorMode::Auto)).expect("open store");
    repo.upsert_chunks(vec![chunk("docs/a.md", "A", 1, "alpha", 0)]).expect("insert");
    let hits = Fts5Index::new().search(&repo, "\"alpha\"", usize::MAX).expect("search");
    assert_eq!(hits.len(), 1);
}

#[cfg(feature = "sqlite-vec")]
#[test]
fn bundled_extension_serves_knn_queries() {
    let mut repo = SqliteRepo::open_in_memory(&opts(VectorMode::Auto)).expect("open store");
    assert!(repo.vector_available());
    repo.upsert_chunks(vec![chunk("docs/a.md", "A", 1, "alpha", 0), chunk("docs/b.md", "B", 1, "beta", 2)])
        .expect("insert");

    let hits = VecIndex::new().knn_search(&repo, VectorSpace::Latin, &[0.0, 0.0, 1.0, 0.0], 1).expect("knn");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.section, "B");
}

#[test]
fn disabled_vectors_keep_lexical_data() {
    let mut repo = SqliteRepo::open_in_memory(&opts(VectorMode::Disabled)).expect("open store");
    assert!(!repo.vector_available());

    repo.replace_chunks_for_path("docs/a.md", &[chunk("docs/a.md", "A", 1, "alpha beta", 0)]).expect("write");

    assert_eq!(lexical(&repo, "beta"), vec!["A".to_string()]);
    let hits = VecIndex::new().knn_search(&repo, VectorSpace::Latin, &[1.0, 0.0, 0.0, 0.0], 3).expect("knn");
    assert!(hits.is_empty());
    assert_eq!(repo.count_vectors(VectorSpace::Latin).expect("count"), 0);
}

#[test]
fn wrong_vector_dimension_is_rejected_without_partial_writes() {
    let mut repo = SqliteRepo::open_in_memory(&opts(VectorMode::Auto)).expect("open store");
    let good = chunk("docs/a.md", "Good", 1, "good", 0);
    let mut bad = chunk("docs/a.md", "Bad", 5, "bad", 1);
    bad.vectors = Some(ChunkVectors { latin: vec![1.0; 3], cjk: vec![1.0; DIM] });

    let err = repo.replace_chunks_for_path("docs/a.md", &[good, bad]).expect_err("dimension mismatch");
    assert!(matches!(err, StoreError::Dimension { expected: DIM, actual: 3 }));
    assert_eq!(repo.count_chunks().expect("count"), 0);
}

#[test]
fn replace_rejects_chunks_from_another_path() {
    let mut repo = SqliteRepo::open_in_memory(&opts(VectorMode::Auto)).expect("open store");
    let err = repo
        .replace_chunks_for_path("docs/a.md", &[chunk("docs/b.md", "B", 1, "beta", 0)])
        .expect_err("path mismatch");
    assert!(matches!(err, StoreError::InvalidChunk(_)));
}

#[test]
fn counts_group_by_source_type_and_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("index.db");
    {
        let mut repo = SqliteRepo::open(&db, &opts(VectorMode::Auto)).expect("open store");
        let mut lesson = chunk("docs/l.md", "L", 1, "lesson text", 0);
        lesson.record.source_type = "lesson".into();
        repo.upsert_chunks(vec![chunk("docs/a.md", "A", 1, "doc text", 1), lesson]).expect("insert");
    }

    let repo = SqliteRepo::open(&db, &opts(VectorMode::Auto)).expect("reopen store");
    let by_type = repo.count_by_source_type().expect("counts");
    assert_eq!(by_type.get("doc"), Some(&1));
    assert_eq!(by_type.get("lesson"), Some(&1));
    assert_eq!(repo.count_chunks().expect("count"), 2);
    assert_eq!(lexical(&repo, "lesson"), vec!["L".to_string()]);
}
