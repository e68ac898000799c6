//! End-to-end matching runs with the built-in hashed embedder

use sponsor_match::{
    build_token_index, compare_matchers, generate_candidates, score_pairs, Entity, EntityMatcher,
    HashedTrigramEmbedder, MatchConfig, MatchStatus, MatchingAlgorithm, ScoringConfig, TextField,
    Tokenizer,
};

fn sponsors() -> Vec<Entity> {
    vec![
        Entity::new("Pfizer", "Pfizer"),
        Entity::new("Merck Sharp & Dohme LLC", "Merck Sharp & Dohme LLC"),
        Entity::new("Vertex Pharmaceuticals Incorporated", "Vertex Pharmaceuticals Incorporated"),
        Entity::new("Gilead Sciences", "Gilead Sciences"),
        Entity::new("National Cancer Institute (NCI)", "National Cancer Institute (NCI)"),
    ]
}

fn tickers() -> Vec<Entity> {
    vec![
        Entity::new("PFE", "Pfizer Inc.").with_attribute("market", Some("stocks")),
        Entity::new("MRK", "Merck & Co., Inc."),
        Entity::new("VRTX", "Vertex Pharmaceuticals Incorporated"),
        Entity::new("GILD", "Gilead Sciences, Inc."),
        Entity::new("AMGN", "Amgen Inc."),
    ]
}

#[test]
fn blocking_then_scoring_then_matching() {
    let matcher = EntityMatcher::new(MatchConfig::default()).unwrap();
    let run = matcher
        .run(&sponsors(), &tickers(), &HashedTrigramEmbedder::default())
        .unwrap();

    // Every candidate shares a significant token
    assert!(run.blocking.candidate_pairs < run.blocking.naive_pairs);
    assert!(run.blocking.reduction_pct > 50.0);

    assert_eq!(run.matches.right_for("Pfizer"), Some("PFE"));
    assert_eq!(
        run.matches.right_for("Vertex Pharmaceuticals Incorporated"),
        Some("VRTX")
    );
    assert_eq!(run.matches.right_for("Gilead Sciences"), Some("GILD"));
    assert_eq!(run.matches.right_for("National Cancer Institute (NCI)"), None);

    let identical = run
        .scored
        .iter()
        .find(|p| p.right_id == "VRTX")
        .unwrap();
    assert_eq!(identical.confidence, 1.0);
    assert_eq!(identical.status, MatchStatus::Approved);

    for pair in &run.scored {
        assert!((0.0..=1.0).contains(&pair.confidence));
        assert!(pair.reason.starts_with("embedding_similarity="));
    }
}

#[test]
fn runs_are_reproducible() {
    let matcher = EntityMatcher::new(MatchConfig::default()).unwrap();
    let embedder = HashedTrigramEmbedder::default();

    let first = matcher.run(&sponsors(), &tickers(), &embedder).unwrap();
    let second = matcher.run(&sponsors(), &tickers(), &embedder).unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.scored, second.scored);
    assert_eq!(first.matches, second.matches);
}

#[test]
fn greedy_and_optimal_agree_without_conflicts() {
    let mut config = MatchConfig::default();
    config.matching.algorithm = MatchingAlgorithm::Greedy;
    let greedy = EntityMatcher::new(config)
        .unwrap()
        .run(&sponsors(), &tickers(), &HashedTrigramEmbedder::default())
        .unwrap();

    let comparison = compare_matchers(&greedy.scored, MatchConfig::default().min_match_confidence());
    assert_eq!(comparison.greedy, greedy.matches);
    assert!(comparison.optimal_total_score >= comparison.greedy_total_score - 1e-9);
}

#[test]
fn stages_compose_by_hand() {
    let tokenizer = Tokenizer::default();
    let index = build_token_index(&tickers(), &TextField::Text, &tokenizer);
    let candidates = generate_candidates(&sponsors(), &index, &tokenizer);

    assert!(candidates.contains("Pfizer", "PFE"));
    assert!(candidates.get("National Cancer Institute (NCI)").is_none());

    let scored = score_pairs(
        &sponsors(),
        &tickers(),
        &candidates,
        &HashedTrigramEmbedder::default(),
        &ScoringConfig::default(),
    )
    .unwrap();
    assert_eq!(scored.len(), candidates.pair_count());
    assert!(scored
        .windows(2)
        .all(|w| w[0].confidence >= w[1].confidence));
}

#[test]
fn scored_pairs_serialize_as_output_rows() {
    let matcher = EntityMatcher::new(MatchConfig::default()).unwrap();
    let run = matcher
        .run(&sponsors(), &tickers(), &HashedTrigramEmbedder::default())
        .unwrap();

    let json = serde_json::to_value(&run).unwrap();
    let row = &json["matches"]["pairs"][0];
    for field in ["left_id", "right_id", "confidence", "status", "reason"] {
        assert!(row.get(field).is_some(), "missing {field}");
    }
    assert!(json["run_id"].is_string());
    assert_eq!(json["algorithm"], "optimal");
}

#[test]
fn config_file_drives_the_run() {
    let yaml = "matching:\n  algorithm: greedy\n  min_confidence: 0.99\n";
    let config = MatchConfig::from_yaml(yaml).unwrap();
    let run = EntityMatcher::new(config)
        .unwrap()
        .run(&sponsors(), &tickers(), &HashedTrigramEmbedder::default())
        .unwrap();

    assert_eq!(run.algorithm, MatchingAlgorithm::Greedy);
    assert!(run.matches.pairs().iter().all(|p| p.confidence >= 0.99));
    assert!(run.matches.contains("Vertex Pharmaceuticals Incorporated", "VRTX"));
}
