//! End-to-end engine tests: train, persist, reload, and reproduce.

use spendpal::classify::{AdaptiveClassifier, Method, TrainOutcome};
use spendpal::persist;
use spendpal::records::TransactionRecord;
use spendpal::rules::RuleSet;
use tempfile::tempdir;

const RULES: &str = r#"
unknown_threshold = 0.3
review_threshold = 0.5

[categories.Healthcare]
keywords = ["pharmacy", "doctor", "prescription", "hospital"]
weight = 1.5

[categories.Groceries]
keywords = ["walmart", "grocery", "supermarket", "produce"]

[categories.Transportation]
keywords = ["uber", "lyft", "taxi", "transit"]
"#;

fn engine() -> AdaptiveClassifier {
    AdaptiveClassifier::new(RuleSet::from_toml_str(RULES).expect("rules parse"))
        .expect("rules compile")
}

fn training_records() -> Vec<TransactionRecord> {
    let rows: [(&str, f64); 14] = [
        ("cvs pharmacy prescription pickup", 45.0),
        ("walgreens pharmacy medicine", 30.0),
        ("doctor visit copay", 120.0),
        ("prescription refill pharmacy", 25.0),
        ("hospital lab work", 310.0),
        ("walmart grocery shopping", 125.5),
        ("grocery run walmart", 60.0),
        ("supermarket weekly produce", 90.0),
        ("walmart supermarket trip", 70.0),
        ("produce and grocery haul", 55.0),
        ("uber ride downtown", 28.0),
        ("lyft ride airport", 42.0),
        ("taxi uber night ride", 18.0),
        ("transit pass renewal", 65.0),
    ];
    rows.iter()
        .map(|(narration, amount)| TransactionRecord::new(*narration, Some(*amount)))
        .collect()
}

fn probe_records() -> Vec<TransactionRecord> {
    vec![
        TransactionRecord::new("cvs pharmacy prescription pickup", Some(45.0)),
        TransactionRecord::new("payment to acme corp", Some(100.0)),
        TransactionRecord::new("prescription pickup at that little corner store downtown", Some(12.0)),
        TransactionRecord::new("walmart grocery shopping", Some(80.0)),
        TransactionRecord::new("weekly produce from the market stall on fifth", Some(23.0)),
    ]
}

#[test]
fn trained_engine_round_trips_through_bundle() {
    let dir = tempdir().unwrap();
    let bundle_path = dir.path().join("bundle.json");

    let mut engine = engine();
    let records = training_records();
    let labeled = engine.classify_batch(&records);
    let outcome = engine.train_fallback(&labeled).expect("training succeeds");
    assert!(matches!(outcome, TrainOutcome::Trained { .. }));

    let probes = probe_records();
    let before = engine.classify_batch(&probes);

    persist::save_engine(&bundle_path, &engine).expect("save bundle");
    let mut reloaded = persist::load_engine(&bundle_path).expect("load bundle");
    assert!(reloaded.has_model());

    let after = reloaded.classify_batch(&probes);
    assert_eq!(before, after);
}

#[test]
fn fallback_only_touches_low_confidence_rows() {
    let mut engine = engine();
    let records = training_records();
    let labeled = engine.classify_batch(&records);
    engine.train_fallback(&labeled).expect("training succeeds");

    let results = engine.classify_batch(&records);
    // All training rows match confidently, so the fallback stays out.
    for (before, after) in labeled.iter().zip(&results) {
        assert_eq!(after.method, Method::RuleBased);
        assert_eq!(after.category, before.category);
    }

    let probes = probe_records();
    let probe_results = engine.classify_batch(&probes);
    assert_eq!(probe_results.len(), probes.len());
    // The confident rule match is untouched; the vague narration is
    // delegated to the fallback.
    assert_eq!(probe_results[0].method, Method::RuleBased);
    assert_eq!(probe_results[0].category, "Healthcare");
    assert_eq!(probe_results[2].method, Method::MlBased);
    assert!(probe_results[2].confidence >= 0.0 && probe_results[2].confidence <= 1.0);
}

#[test]
fn batch_without_model_never_raises_for_odd_data() {
    let mut engine = engine();
    let records = vec![
        TransactionRecord::new("", None),
        TransactionRecord::new("    ", None),
        TransactionRecord::new("zzz qqq vvv", Some(-50.0)),
    ];
    let results = engine.classify_batch(&records);
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.is_unknown()));
    assert!(results.iter().all(|r| r.confidence == 0.0));
    assert!(results.iter().all(|r| r.needs_review));
}

#[test]
fn discovery_runs_over_unknown_subset() {
    let mut engine = engine();
    let mut records = training_records();
    for narration in [
        "spotify premium subscription",
        "spotify premium subscription renewal",
        "spotify monthly subscription",
        "chewy pet food delivery",
        "chewy pet food order",
        "chewy dog food delivery",
    ] {
        records.push(TransactionRecord::new(narration, Some(15.0)));
    }

    let results = engine.classify_batch(&records);
    let unknown: Vec<String> = results
        .iter()
        .filter(|r| r.is_unknown())
        .map(|r| r.narration.clone())
        .collect();
    assert!(unknown.len() >= 5);

    let discovered = engine.discover_new_categories(&unknown).expect("discovery");
    assert!(!discovered.is_empty());
    for category in discovered.values() {
        assert!(category.size >= 2);
        assert!(!category.sample_texts.is_empty());
    }
}
