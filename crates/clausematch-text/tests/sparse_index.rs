use clausematch_core::error::Error;
use clausematch_core::traits::SparseIndex;
use clausematch_core::types::{Chunk, Field};
use clausematch_text::SparseTextIndex;
use tempfile::TempDir;

fn chunk(id: &str, article: &str, title: &str, body: &str, order: usize) -> Chunk {
    Chunk {
        chunk_id: id.into(),
        article_id: article.into(),
        title: title.into(),
        body_text: body.into(),
        order_index: order,
    }
}

fn corpus() -> Vec<Chunk> {
    vec![
        chunk("a1-1", "a1", "Purpose", "This agreement sets out the purpose of the data transfer", 0),
        chunk("a2-1", "a2", "Term", "The agreement remains in force for one year", 1),
        chunk("a2-2", "a2", "Term", "Renewal of the term requires written notice", 2),
        chunk("a3-1", "a3", "Confidentiality", "Each party keeps confidential information secret", 3),
    ]
}

#[test]
fn title_and_body_are_searched_independently() {
    let idx = SparseTextIndex::build_in_ram(&corpus()).expect("index");

    let title_hits = idx.search("term", Field::Title, 10).expect("title search");
    let ids: Vec<&str> = title_hits.iter().map(|h| h.chunk_id.as_str()).collect();
    assert_eq!(title_hits.len(), 2);
    assert!(ids.contains(&"a2-1") && ids.contains(&"a2-2"));

    let body_hits = idx.search("confidential information", Field::Body, 10).expect("body search");
    assert_eq!(body_hits[0].chunk_id, "a3-1");
    assert!(idx.search("confidentiality", Field::Body, 10).expect("search").is_empty());
}

#[test]
fn stop_word_only_query_is_empty() {
    let idx = SparseTextIndex::build_in_ram(&corpus()).expect("index");
    assert!(matches!(idx.search("the of and", Field::Body, 10), Err(Error::EmptyQuery)));
    assert!(matches!(idx.search("   ", Field::Title, 10), Err(Error::EmptyQuery)));
}

#[test]
fn query_syntax_characters_never_fail() {
    let idx = SparseTextIndex::build_in_ram(&corpus()).expect("index");
    for q in ["term: (one year)", "\"renewal", "notice AND -term", "a2-2 || [x]"] {
        idx.search(q, Field::Body, 5).expect("special characters are plain text");
    }
}

#[test]
fn scores_rank_descending() {
    let idx = SparseTextIndex::build_in_ram(&corpus()).expect("index");
    let hits = idx.search("agreement term renewal", Field::Body, 10).expect("search");
    assert!(hits.len() >= 2);
    assert!(hits.windows(2).all(|w| w[0].raw >= w[1].raw));
    assert!(hits.iter().all(|h| h.raw > 0.0));
}

#[test]
fn disk_index_round_trip() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("sparse");
    let built = SparseTextIndex::build_in_dir(&dir, &corpus()).expect("build");
    assert_eq!(built.num_docs(), 4);
    drop(built);

    let reopened = SparseTextIndex::open_in_dir(&dir).expect("open");
    let hits = reopened.search("renewal", Field::Body, 3).expect("search");
    assert_eq!(hits[0].chunk_id, "a2-2");
}

#[test]
fn missing_index_is_unavailable() {
    let tmp = TempDir::new().unwrap();
    let err = SparseTextIndex::open_in_dir(&tmp.path().join("absent")).err().expect("error");
    assert!(matches!(err, Error::IndexUnavailable(_)));
}

#[test]
fn korean_query_without_particle_matches_text_with_one() {
    let chunks = vec![
        chunk("k1", "k", "개인정보의 처리 목적", "회사는 개인정보를 다음의 목적을 위하여 처리합니다", 0),
        chunk("k2", "k", "보유 기간", "보유 기간이 끝나면 지체 없이 파기합니다", 1),
    ];
    let idx = SparseTextIndex::build_in_ram(&chunks).expect("index");

    for q in ["개인정보", "개인정보는 처리", "목적"] {
        let hits = idx.search(q, Field::Body, 5).expect("search");
        assert_eq!(hits.len(), 1, "query {q:?}");
        assert_eq!(hits[0].chunk_id, "k1");
    }
    let title_hits = idx.search("처리 목적을", Field::Title, 5).expect("title search");
    assert_eq!(title_hits[0].chunk_id, "k1");
    assert!(matches!(idx.search("다음의", Field::Body, 5), Err(Error::EmptyQuery)));
}

#[test]
fn equal_scores_at_cutoff_keep_lowest_chunk_ids() {
    let chunks: Vec<Chunk> = ["c3", "c1", "c4", "c2"]
        .iter()
        .enumerate()
        .map(|(i, id)| chunk(id, "a", "Notice", "written notice of termination", i))
        .collect();
    let idx = SparseTextIndex::build_in_ram(&chunks).expect("index");

    let hits = idx.search("termination notice", Field::Body, 2).expect("search");
    let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
    assert_eq!(ids, ["c1", "c2"]);
}
