use std::fs;

use proptest::prelude::*;
use tempfile::TempDir;

use clausematch_core::config::{Config, EngineSettings, SpecialRouting};
use clausematch_core::corpus::{load_contract, Corpus};
use clausematch_core::types::{Chunk, Clause};
use clausematch_core::{Error, Score};

const CHUNKS_JSON: &str = r#"[
  {"id": "c-2-1", "global_id": "g1", "parent_id": "art-2", "title": "Term", "text_raw": "Raw body", "text_norm": "the term is one year", "order_index": 3},
  {"id": "c-1-1", "parent_id": "art-1", "title": "Purpose", "text_norm": "purpose of this agreement", "order_index": 0},
  {"id": "c-1-2", "parent_id": "art-1", "title": "Purpose", "text_raw": "second paragraph", "order_index": 1},
  {"id": "c-empty", "parent_id": "art-3", "title": "Blank", "text_norm": "  ", "order_index": 5}
]"#;

#[test]
fn loads_chunk_file_with_ingestion_field_names() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("chunks.json");
    fs::write(&path, CHUNKS_JSON).unwrap();

    let corpus = Corpus::load(&path).expect("load");
    assert_eq!(corpus.len(), 3, "blank chunk is skipped");

    let c = corpus.chunk("c-2-1").expect("chunk");
    assert_eq!(c.article_id, "art-2");
    assert_eq!(c.body_text, "the term is one year", "text_norm preferred over text_raw");

    let ids: Vec<&str> = corpus.articles().iter().map(|a| a.article_id.as_str()).collect();
    assert_eq!(ids, ["art-1", "art-2"], "articles ordered by first order_index");
    assert_eq!(corpus.article_chunks("art-1").len(), 2);
    assert!(corpus.article("art-3").is_none());
}

#[test]
fn loads_directory_of_chunk_files() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.json"), CHUNKS_JSON).unwrap();
    fs::write(
        tmp.path().join("b.json"),
        r#"[{"chunk_id": "x-1", "article_id": "art-9", "title": "Other", "body_text": "text", "order_index": 9}]"#,
    )
    .unwrap();
    fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

    let corpus = Corpus::load(tmp.path()).expect("load dir");
    assert_eq!(corpus.len(), 4);
    assert_eq!(corpus.articles().last().map(|a| a.article_id.as_str()), Some("art-9"));
}

#[test]
fn duplicate_chunk_ids_rejected() {
    let chunk = Chunk {
        chunk_id: "dup".into(),
        article_id: "a".into(),
        title: String::new(),
        body_text: "x".into(),
        order_index: 0,
    };
    let err = Corpus::from_chunks(vec![chunk.clone(), chunk]).unwrap_err();
    assert!(matches!(err, Error::Operation(_)));
}

#[test]
fn missing_chunk_source_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let err = Corpus::load(&tmp.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn contract_ids_default_from_number() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("contract.json");
    fs::write(
        &path,
        r#"{"contract_id": "u-1", "contract_type": "provision",
            "clauses": [
              {"number": 1, "title": "Purpose", "text": "", "content": ["① first", "② second"]},
              {"clause_id": "custom", "number": 2, "title": "Term", "text": "two years"}
            ]}"#,
    )
    .unwrap();

    let doc = load_contract(&path).expect("contract");
    assert_eq!(doc.clauses[0].clause_id, "clause-1");
    assert_eq!(doc.clauses[0].sub_items.len(), 2);
    assert_eq!(doc.clauses[1].clause_id, "custom");
    assert!(doc.clauses[1].sub_items.is_empty());
}

#[test]
fn clause_full_text_joins_parts() {
    let clause = Clause {
        clause_id: "c".into(),
        number: 3,
        title: "Payment".into(),
        text: "Fees are due monthly.".into(),
        sub_items: vec!["1. within 10 days".into(), "  ".into()],
    };
    assert_eq!(clause.full_text(), "Article 3 (Payment)\nFees are due monthly.\n1. within 10 days");
}

#[test]
fn config_file_and_defaults_merge() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("config.toml"),
        "[fusion]\nbody_weight = 0.6\ntitle_weight = 0.4\n\n[matcher]\nspecial_routing = \"novel_content\"\n",
    )
    .unwrap();

    let config = Config::load_from(tmp.path()).expect("config");
    let settings = config.settings().expect("settings");
    assert_eq!(settings.fusion.body_weight, 0.6);
    assert_eq!(settings.fusion.dense_weight, 0.85, "unset keys keep defaults");
    assert_eq!(settings.matcher.special_routing, SpecialRouting::NovelContent);
    assert_eq!(settings.adjudication.max_candidates, 5);
}

#[test]
fn invalid_weights_in_config_fail_at_startup() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("config.toml"), "[fusion]\ndense_weight = 0.9\nsparse_weight = 0.3\n").unwrap();
    let config = Config::load_from(tmp.path()).expect("config");
    assert!(config.settings().is_err());
}

#[test]
fn empty_config_is_default() {
    let tmp = TempDir::new().unwrap();
    let config = Config::load_from(tmp.path()).expect("config");
    let settings = config.settings().expect("settings");
    assert_eq!(settings.fusion, EngineSettings::default().fusion);
}

proptest! {
    #[test]
    fn mean_stays_in_unit_range(values in proptest::collection::vec(0.0f64..=1.0, 1..32)) {
        let scores: Vec<Score> = values.iter().copied().map(Score::new).collect();
        let mean = Score::mean(&scores).unwrap();
        prop_assert!((0.0..=1.0).contains(&mean.value()));
        let max = values.iter().copied().fold(0.0, f64::max);
        prop_assert!(mean.value() <= max + 1e-12);
    }
}
