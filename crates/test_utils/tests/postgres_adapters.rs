//! PostgreSQL adapter tests
//!
//! Each test starts its own container; run with `cargo test -- --ignored`.

use std::sync::Arc;

use chrono::Utc;
use core_kernel::{Amount, EffectiveWindow, PortError, TenantId};
use domain_adjudication::{AdjudicationEngine, AuditPort, EngineConfig, EvaluationRequest};
use domain_rules::{RuleSet, RuleStatus, RuleStorePort, RuleTransition};
use infra_db::{PostgresAuditRecorder, PostgresRuleStore};
use test_utils::{
    assert_logs_match_audit, assert_outcome, db_test, ClaimFixtures, ReferenceRules,
    TemporalFixtures,
};

async fn activate(store: &PostgresRuleStore, tenant: TenantId, code: &str, version: u32) {
    store
        .transition(
            tenant,
            code,
            version,
            RuleTransition::Activate {
                approved_by: "medical-director".into(),
            },
            None,
        )
        .await
        .expect("activate");
}

async fn publish_trio(store: &PostgresRuleStore, tenant: TenantId) {
    for request in ReferenceRules::trio() {
        let draft = store.create_version(tenant, request, None).await.expect("create");
        activate(store, tenant, &draft.code, draft.version).await;
    }
}

db_test!(test_versions_increment_and_latest_moves, |db| {
    let (tenant, store) = db.tenant_store().await.unwrap();

    let v1 = store
        .create_version(tenant, ReferenceRules::coverage_limit(), None)
        .await
        .unwrap();
    let v2 = store
        .create_version(tenant, ReferenceRules::coverage_limit().with_salience(20), None)
        .await
        .unwrap();

    assert_eq!((v1.version, v2.version), (1, 2));
    assert_eq!(v2.previous_version_id, Some(v1.id));
    assert_eq!(v2.status, RuleStatus::Draft);

    let versions = store.list_versions(tenant, "COVERAGE_LIMIT", None).await.unwrap();
    let latest: Vec<_> = versions.iter().map(|r| (r.version, r.is_latest)).collect();
    assert_eq!(latest, vec![(1, false), (2, true)]);
    assert!(versions.iter().all(|r| r.verify_checksum()));
});

db_test!(test_concurrent_versions_are_distinct, |db| {
    let (tenant, store) = db.tenant_store().await.unwrap();
    let store = Arc::new(store);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .create_version(tenant, ReferenceRules::calculate_franchise(), None)
                    .await
            })
        })
        .collect();

    let mut versions = Vec::new();
    for handle in handles {
        versions.push(handle.await.unwrap().unwrap().version);
    }
    versions.sort_unstable();
    assert_eq!(versions, (1..=8).collect::<Vec<u32>>());

    let listed = store
        .list_versions(tenant, "CALCULATE_FRANCHISE", None)
        .await
        .unwrap();
    assert_eq!(listed.iter().filter(|r| r.is_latest).count(), 1);
});

db_test!(test_effective_rules_respect_status_and_window, |db| {
    let (tenant, store) = db.tenant_store().await.unwrap();

    let windowed = store
        .create_version(
            tenant,
            ReferenceRules::coverage_limit().with_effective(
                EffectiveWindow::bounded(
                    TemporalFixtures::rule_year_start(),
                    TemporalFixtures::rule_year_end(),
                )
                .unwrap(),
            ),
            None,
        )
        .await
        .unwrap();
    activate(&store, tenant, &windowed.code, windowed.version).await;
    store
        .create_version(tenant, ReferenceRules::emergency_bonus(), None)
        .await
        .unwrap();

    let mid_year = store
        .get_effective_rules(tenant, TemporalFixtures::mid_year(), None)
        .await
        .unwrap();
    assert_eq!(
        mid_year.iter().map(|r| r.code.as_str()).collect::<Vec<_>>(),
        vec!["COVERAGE_LIMIT"]
    );

    let at_end = store
        .get_effective_rules(tenant, TemporalFixtures::rule_year_end(), None)
        .await
        .unwrap();
    assert_eq!(at_end.len(), 1);

    let before = store
        .get_effective_rules(tenant, TemporalFixtures::before_rule_year(), None)
        .await
        .unwrap();
    assert!(before.is_empty());
});

db_test!(test_highest_active_version_wins, |db| {
    let (tenant, store) = db.tenant_store().await.unwrap();
    for salience in [10, 30] {
        let draft = store
            .create_version(tenant, ReferenceRules::coverage_limit().with_salience(salience), None)
            .await
            .unwrap();
        activate(&store, tenant, &draft.code, draft.version).await;
    }

    let rules = store.get_effective_rules(tenant, Utc::now(), None).await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!((rules[0].version, rules[0].salience), (2, 30));
});

db_test!(test_invalid_transition_is_rejected, |db| {
    let (tenant, store) = db.tenant_store().await.unwrap();
    let draft = store
        .create_version(tenant, ReferenceRules::coverage_limit(), None)
        .await
        .unwrap();

    let err = store
        .transition(tenant, &draft.code, draft.version, RuleTransition::Deprecate, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::Validation { .. }));

    activate(&store, tenant, &draft.code, draft.version).await;
    let archived = store
        .transition(tenant, &draft.code, draft.version, RuleTransition::Archive, None)
        .await
        .unwrap();
    assert_eq!(archived.status, RuleStatus::Archived);
    assert_eq!(archived.approved_by.as_deref(), Some("medical-director"));
});

db_test!(test_unknown_tenant_is_not_found, |db| {
    let store = PostgresRuleStore::new(db.pool().clone());

    let err = store
        .get_effective_rules(TenantId::new(), Utc::now(), None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = store
        .create_version(TenantId::new(), ReferenceRules::coverage_limit(), None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
});

db_test!(test_rule_sets_round_trip_in_member_order, |db| {
    let (tenant, store) = db.tenant_store().await.unwrap();
    let codes = vec!["EMERGENCY_BONUS".to_string(), "COVERAGE_LIMIT".to_string()];

    let saved = store
        .save_rule_set(RuleSet::new(tenant, "outpatient", codes.clone()), None)
        .await
        .unwrap();
    let loaded = store.get_rule_set(tenant, saved.id, None).await.unwrap();
    assert_eq!(loaded.rule_codes, codes);
    assert_eq!(loaded.name, "outpatient");

    let (other_tenant, _) = db.tenant_store().await.unwrap();
    let err = store.get_rule_set(other_tenant, saved.id, None).await.unwrap_err();
    assert!(err.is_not_found());
});

db_test!(test_engine_decisions_persist_and_replay, |db| {
    let (tenant, store) = db.tenant_store().await.unwrap();
    publish_trio(&store, tenant).await;
    let audit = PostgresAuditRecorder::new(db.pool().clone());
    let engine = AdjudicationEngine::new(
        Arc::new(store),
        Arc::new(audit.clone()),
        EngineConfig::default(),
    );

    let outcome = engine
        .evaluate(EvaluationRequest::new(
            tenant,
            ClaimFixtures::over_limit_outpatient(tenant),
        ))
        .await
        .unwrap();
    assert!(outcome.audit_error.is_none(), "{:?}", outcome.audit_error);

    let execution_id = outcome.result.execution_id;
    let stored = audit.get_decision(execution_id, None).await.unwrap();
    let logs = audit.list_execution_logs(execution_id, None).await.unwrap();
    assert_outcome(&stored.financials(), 700_000, 300_000, 140_000, 560_000);
    assert_eq!(stored.requested_amount, Amount::new(1_000_000));
    assert_logs_match_audit(&stored, &logs);

    let report = engine.replay_execution(execution_id, None).await.unwrap();
    assert!(report.matches(), "differences: {:?}", report.differences());
});

db_test!(test_duplicate_decision_is_a_conflict, |db| {
    let (tenant, store) = db.tenant_store().await.unwrap();
    publish_trio(&store, tenant).await;
    let audit = PostgresAuditRecorder::new(db.pool().clone());
    let engine = AdjudicationEngine::new(
        Arc::new(store),
        Arc::new(audit.clone()),
        EngineConfig::default(),
    );

    let outcome = engine
        .evaluate(EvaluationRequest::new(tenant, ClaimFixtures::emergency(tenant)))
        .await
        .unwrap();

    let err = audit.log_decision(&outcome.audit, None).await.unwrap_err();
    assert!(err.is_conflict());

    let decisions = audit
        .list_decisions_for_claim(tenant, outcome.audit.claim_id, None)
        .await
        .unwrap();
    assert_eq!(decisions.len(), 1);
});

db_test!(test_audit_rows_cannot_be_rewritten, |db| {
    let (tenant, store) = db.tenant_store().await.unwrap();
    publish_trio(&store, tenant).await;
    let audit = PostgresAuditRecorder::new(db.pool().clone());
    let engine = AdjudicationEngine::new(Arc::new(store), Arc::new(audit), EngineConfig::default());

    let outcome = engine
        .evaluate(EvaluationRequest::new(
            tenant,
            ClaimFixtures::over_limit_outpatient(tenant),
        ))
        .await
        .unwrap();

    let update = sqlx::query("UPDATE claim_decision_audits SET approved_amount = 0 WHERE execution_id = $1")
        .bind(outcome.result.execution_id.as_uuid())
        .execute(db.pool())
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM rule_execution_logs WHERE execution_id = $1")
        .bind(outcome.result.execution_id.as_uuid())
        .execute(db.pool())
        .await;
    assert!(delete.is_err());
});
