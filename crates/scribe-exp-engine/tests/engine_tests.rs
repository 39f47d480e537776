//! End-to-end engine behavior over the in-memory store

use chrono::{Duration as ChronoDuration, Utc};
use scribe_exp_engine::{EngineConfig, ExperimentClient};
use scribe_exp_store::{ExperimentStore, MemoryStore};
use scribe_exp_types::{
    Assignment, AssignmentContext, Experiment, ExperimentStatus, ResultsStatus, TargetAudience,
    UserId, UserProfile, UserTier, Variant, VariantConfig,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

fn two_arm_experiment(feature: &str, allocation: f64, splits: (f64, f64)) -> Experiment {
    let mut exp = Experiment::new(
        "warmer suggestions",
        feature,
        "draft_completed",
        vec![
            Variant::control(
                "control",
                splits.0,
                VariantConfig::custom([("tone", json!("neutral"))]),
            ),
            Variant::new(
                "warmer",
                splits.1,
                VariantConfig::custom([("tone", json!("warm"))]),
            ),
        ],
    )
    .with_traffic_allocation(allocation);
    exp.transition_to(ExperimentStatus::Running).unwrap();
    exp
}

fn client_over(store: &Arc<MemoryStore>) -> ExperimentClient {
    ExperimentClient::new(Arc::clone(store) as _, EngineConfig::new())
}

fn seed_profile(store: &MemoryStore, user: &UserId) {
    store.put_profile(
        user.clone(),
        UserProfile::new(UserTier::Free, Utc::now() - ChronoDuration::days(90)),
    );
}

#[tokio::test]
async fn repeated_lookups_return_the_persisted_variant() {
    let store = Arc::new(MemoryStore::new());
    let exp = two_arm_experiment("editor_model", 100.0, (50.0, 50.0));
    store.put_experiment(exp.clone());
    let client = client_over(&store);

    let user = UserId::from("writer-1");
    seed_profile(&store, &user);

    let first = client.variant_for(&user, exp.id).await.unwrap().unwrap();
    for _ in 0..5 {
        let again = client.variant_for(&user, exp.id).await.unwrap().unwrap();
        assert_eq!(again.id, first.id);
    }
    assert_eq!(store.assignment_count(exp.id), 1);
}

#[tokio::test]
async fn half_allocation_includes_about_half_the_users() {
    let store = Arc::new(MemoryStore::new());
    let exp = two_arm_experiment("editor_model", 50.0, (50.0, 50.0));
    store.put_experiment(exp.clone());
    let client = client_over(&store);

    let n = 4_000;
    let mut included = 0usize;
    for i in 0..n {
        let user = UserId::from(format!("writer-{i}").as_str());
        seed_profile(&store, &user);
        if client.variant_for(&user, exp.id).await.unwrap().is_some() {
            included += 1;
        }
    }

    let fraction = included as f64 / n as f64;
    assert!(
        (fraction - 0.5).abs() < 0.04,
        "included fraction {fraction} far from 0.5"
    );
    // Excluded users leave no rows behind.
    assert_eq!(store.assignment_count(exp.id), included);
}

#[tokio::test]
async fn variant_split_matches_configuration() {
    let store = Arc::new(MemoryStore::new());
    let exp = two_arm_experiment("editor_model", 100.0, (70.0, 30.0));
    store.put_experiment(exp.clone());
    let client = client_over(&store);

    let control_id = exp.variants[0].id;
    let n = 4_000;
    let mut control = 0usize;
    for i in 0..n {
        let user = UserId::from(format!("writer-{i}").as_str());
        seed_profile(&store, &user);
        let variant = client.variant_for(&user, exp.id).await.unwrap().unwrap();
        if variant.id == control_id {
            control += 1;
        }
    }

    let fraction = control as f64 / n as f64;
    assert!(
        (fraction - 0.7).abs() < 0.04,
        "control fraction {fraction} far from 0.7"
    );
}

#[tokio::test]
async fn concurrent_first_assignments_agree() {
    let store = Arc::new(MemoryStore::new());
    let exp = two_arm_experiment("editor_model", 100.0, (50.0, 50.0));
    store.put_experiment(exp.clone());
    let client = client_over(&store);

    let user = UserId::from("racer");
    seed_profile(&store, &user);

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let client = client.clone();
        let user = user.clone();
        let experiment_id = exp.id;
        tasks.push(tokio::spawn(async move {
            client.variant_for(&user, experiment_id).await.unwrap()
        }));
    }

    let mut winners = Vec::new();
    for task in tasks {
        winners.push(task.await.unwrap().unwrap().id);
    }

    assert_eq!(store.assignment_count(exp.id), 1);
    assert!(winners.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn unqualified_tier_never_gets_an_assignment() {
    let store = Arc::new(MemoryStore::new());
    let mut exp = two_arm_experiment("paywall_copy", 100.0, (50.0, 50.0));
    exp.target_audience = TargetAudience::everyone().with_tiers(vec![UserTier::Plus]);
    store.put_experiment(exp.clone());
    let client = client_over(&store);

    let user = UserId::from("free-writer");
    seed_profile(&store, &user); // Free tier

    for _ in 0..3 {
        assert!(client.variant_for(&user, exp.id).await.unwrap().is_none());
    }
    assert_eq!(store.assignment_count(exp.id), 0);
}

#[tokio::test]
async fn goal_event_converts_once_but_appends_every_time() {
    let store = Arc::new(MemoryStore::new());
    let exp = two_arm_experiment("editor_model", 100.0, (50.0, 50.0));
    store.put_experiment(exp.clone());
    let client = client_over(&store);

    let user = UserId::from("writer-1");
    seed_profile(&store, &user);
    client.variant_for(&user, exp.id).await.unwrap().unwrap();

    client
        .track_event(&user, "draft_completed", BTreeMap::new(), 12.0)
        .await
        .unwrap();
    let first = store.assignment(&user, exp.id).await.unwrap().unwrap();
    assert!(first.converted);

    client
        .track_event(&user, "draft_completed", BTreeMap::new(), 12.0)
        .await
        .unwrap();
    let second = store.assignment(&user, exp.id).await.unwrap().unwrap();

    assert!(second.converted);
    assert_eq!(second.converted_at, first.converted_at);
    assert_eq!(second.conversion_value, 12.0);
    assert_eq!(store.event_count(exp.id), 2);
}

/// Seed `participants` assignments, the first `conversions` of them converted
async fn seed_arm(
    store: &MemoryStore,
    exp: &Experiment,
    variant_index: usize,
    prefix: &str,
    participants: usize,
    conversions: usize,
) {
    for i in 0..participants {
        let mut assignment = Assignment::new(
            UserId::from(format!("{prefix}-{i}").as_str()),
            exp.id,
            exp.variants[variant_index].id,
            AssignmentContext::default(),
        );
        if i < conversions {
            assignment.converted = true;
            assignment.converted_at = Some(assignment.assigned_at);
        }
        store.create_assignment_if_absent(assignment).await.unwrap();
    }
}

#[tokio::test]
async fn clear_lift_is_reported_as_significant_winner() {
    let store = Arc::new(MemoryStore::new());
    let exp = two_arm_experiment("editor_model", 100.0, (50.0, 50.0));
    store.put_experiment(exp.clone());
    let client = client_over(&store);

    // 7.14% control vs 8.81% treatment, large enough to clear alpha = 0.05.
    seed_arm(&store, &exp, 0, "c", 2494, 178).await;
    seed_arm(&store, &exp, 1, "t", 2406, 212).await;

    let results = client.compute_results(exp.id).await.unwrap();

    let control = &results.variants[0];
    let treatment = &results.variants[1];
    assert!(control.is_control);
    assert!((control.conversion_rate - 0.0714).abs() < 0.0005);
    assert!((treatment.conversion_rate - 0.0881).abs() < 0.0005);
    assert!(control.confidence_interval.lower < control.conversion_rate);
    assert!(control.conversion_rate < control.confidence_interval.upper);

    assert!((results.effect - 23.4).abs() < 0.5, "effect {}", results.effect);
    assert!(results.p_value < 0.05, "p = {}", results.p_value);
    assert_eq!(results.status, ResultsStatus::SignificantWinner);
    assert_eq!(results.winning_variant, Some(exp.variants[1].id));
    assert!(results.confidence > 95.0);

    // Daily series re-derives the same totals.
    let daily_participants: u64 = results
        .daily
        .iter()
        .flat_map(|d| d.variants.values())
        .map(|c| c.participants)
        .sum();
    assert_eq!(daily_participants, 4900);
}

#[tokio::test]
async fn modest_sample_with_same_rates_is_not_significant() {
    let store = Arc::new(MemoryStore::new());
    let exp = two_arm_experiment("editor_model", 100.0, (50.0, 50.0));
    store.put_experiment(exp.clone());
    let client = client_over(&store);

    // Same rates at half the sample: the lift is real but unproven.
    seed_arm(&store, &exp, 0, "c", 1247, 89).await;
    seed_arm(&store, &exp, 1, "t", 1203, 106).await;

    let results = client.compute_results(exp.id).await.unwrap();
    assert_eq!(results.status, ResultsStatus::NoSignificantDifference);
    assert!(results.effect > 20.0);
    assert!(results.p_value > 0.05);
    assert!(results.winning_variant.is_none());
}

#[tokio::test]
async fn control_only_data_is_insufficient() {
    let store = Arc::new(MemoryStore::new());
    let exp = two_arm_experiment("editor_model", 100.0, (50.0, 50.0));
    store.put_experiment(exp.clone());
    let client = client_over(&store);

    seed_arm(&store, &exp, 0, "c", 500, 40).await;

    let results = client.compute_results(exp.id).await.unwrap();
    assert_eq!(results.status, ResultsStatus::InsufficientData);
    assert_eq!(results.confidence, 0.0);
    assert_eq!(results.p_value, 1.0);
    assert_eq!(results.effect, 0.0);
}

#[tokio::test]
async fn regression_is_reported_as_significant_loser() {
    let store = Arc::new(MemoryStore::new());
    let exp = two_arm_experiment("editor_model", 100.0, (50.0, 50.0));
    store.put_experiment(exp.clone());
    let client = client_over(&store);

    seed_arm(&store, &exp, 0, "c", 3000, 300).await;
    seed_arm(&store, &exp, 1, "t", 3000, 180).await;

    let results = client.compute_results(exp.id).await.unwrap();
    assert_eq!(results.status, ResultsStatus::SignificantLoser);
    assert!(results.effect < 0.0);
    assert!(results.winning_variant.is_none());
}

#[tokio::test]
async fn store_outage_degrades_config_to_default() {
    let store = Arc::new(MemoryStore::new());
    let exp = two_arm_experiment("editor_model", 100.0, (50.0, 50.0));
    store.put_experiment(exp.clone());
    let client = client_over(&store);

    let user = UserId::from("writer-1");
    seed_profile(&store, &user);
    store.set_unavailable(true);

    let default = VariantConfig::custom([("tone", json!("neutral"))]);
    let resolved = client.config_for(&user, "editor_model", &default).await;
    assert_eq!(resolved, default);

    assert!(!client.is_enabled(&user, "beta_toolbar", false).await);
    assert!(client.is_enabled(&user, "beta_toolbar", true).await);
}

#[tokio::test]
async fn variant_override_merges_onto_default() {
    let store = Arc::new(MemoryStore::new());
    let exp = two_arm_experiment("editor_model", 100.0, (0.0, 100.0));
    store.put_experiment(exp.clone());
    let client = client_over(&store);

    let user = UserId::from("writer-1");
    seed_profile(&store, &user);

    let default = VariantConfig::custom([
        ("tone", json!("neutral")),
        ("show_hints", json!(true)),
    ]);
    let resolved = client.config_for(&user, "editor_model", &default).await;

    let VariantConfig::Custom(map) = resolved else {
        panic!("expected custom payload");
    };
    // Everyone lands in the 100%-split treatment: tone overridden,
    // untouched keys preserved.
    assert_eq!(map["tone"], json!("warm"));
    assert_eq!(map["show_hints"], json!(true));
}

#[tokio::test]
async fn paused_experiment_stops_new_assignments_but_keeps_rows() {
    let store = Arc::new(MemoryStore::new());
    let mut exp = two_arm_experiment("editor_model", 100.0, (50.0, 50.0));
    store.put_experiment(exp.clone());
    let client = client_over(&store);

    let assigned = UserId::from("early-bird");
    seed_profile(&store, &assigned);
    client.variant_for(&assigned, exp.id).await.unwrap().unwrap();

    exp.transition_to(ExperimentStatus::Paused).unwrap();
    store.put_experiment(exp.clone());
    client.invalidate_definitions();

    let late = UserId::from("late-comer");
    seed_profile(&store, &late);
    assert!(client.variant_for(&late, exp.id).await.unwrap().is_none());

    // The early assignment survives for analysis.
    assert_eq!(store.assignment_count(exp.id), 1);
}
