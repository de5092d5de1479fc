//! Sanctions scoring end to end: inputs from cases, evidence and the graph

mod helpers;

use chrono::NaiveDate;

use tnr_tracker::{
    ActorId, CandidateFilter, CaseStatus, DecisionUpdate, EvidenceType, NewCase, NewChainEdge,
    NewEvidence, SanctionStatus, Tracker, TrackerError,
};

use helpers::{create, perpetrator, tracker};

fn verified_on() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
}

async fn add_subordinates(tracker: &Tracker, boss: ActorId, n: usize, from: usize) {
    for i in from..from + n {
        let sub = create(
            tracker,
            perpetrator("tjwg", &format!("S-{i}"), &format!("Sub{i}a Officer{i}b")),
        )
        .await;
        tracker.add_edge(NewChainEdge::new(boss, sub, 0.8)).await.unwrap();
    }
}

/// Case with one verified exhibit, linked to the actor as perpetrator
async fn documented_case(tracker: &Tracker, actor: ActorId, title: &str, severity: u8) -> tnr_tracker::CaseId {
    let case = tracker
        .cases()
        .create_case(NewCase::titled(title).severity(severity))
        .await
        .unwrap();
    tracker.link_actor(case.id, actor, "perpetrator").await.unwrap();
    let exhibit = tracker
        .attach_evidence(NewEvidence::new(case.id, EvidenceType::Document, format!("{title} exhibit")))
        .await
        .unwrap();
    tracker
        .verify_evidence(exhibit.id, "analyst", verified_on())
        .await
        .unwrap();
    case.id
}

#[tokio::test]
async fn test_reference_score_and_priority() {
    let (tracker, _) = tracker();
    let boss = create(&tracker, perpetrator("tjwg", "B-1", "Commander Yun")).await;
    add_subordinates(&tracker, boss, 12, 0).await;
    assert_eq!(tracker.centrality(boss).await.unwrap(), 12);

    documented_case(&tracker, boss, "Abduction in Vladivostok", 8).await;
    documented_case(&tracker, boss, "Forced repatriation", 9).await;
    documented_case(&tracker, boss, "Family intimidation", 7).await;

    let candidate = tracker.scoring().nominate(boss).await.unwrap();
    // 0.5 * 0.5 + 0.3 * 12/22 + 0.2 * 7/9
    assert!((candidate.evidence_strength_score - 0.569_191_919).abs() < 1e-6);
    assert_eq!(candidate.priority_level, 3);
    assert_eq!(candidate.breakdown.verified_evidence, 3);
    assert_eq!(candidate.breakdown.case_count, 3);
    assert_eq!(candidate.breakdown.mean_severity, Some(8.0));
    assert_eq!(candidate.supporting_cases.len(), 3);

    let before = candidate.evidence_strength_score;
    documented_case(&tracker, boss, "Surveillance abroad", 8).await;
    let after = tracker.scoring().get_candidate(boss).await.unwrap();
    assert!(after.evidence_strength_score > before);
    assert_eq!(after.breakdown.verified_evidence, 4);
    assert!(tracker.scoring().rederive(boss).await.unwrap().matches);
}

#[tokio::test]
async fn test_unverified_evidence_dilutes_until_verified() {
    let (tracker, _) = tracker();
    let actor = create(&tracker, perpetrator("tjwg", "P-1", "Jon Il Chun")).await;
    let case_id = documented_case(&tracker, actor, "Detention of a student", 6).await;
    let base = tracker.scoring().nominate(actor).await.unwrap().evidence_strength_score;

    let pending = tracker
        .attach_evidence(NewEvidence::new(case_id, EvidenceType::Testimony, "Unconfirmed account"))
        .await
        .unwrap();
    let diluted = tracker.scoring().get_candidate(actor).await.unwrap();
    assert!(diluted.evidence_strength_score < base);
    assert!(tracker.scoring().rederive(actor).await.unwrap().matches);

    tracker.verify_evidence(pending.id, "analyst", verified_on()).await.unwrap();
    let confirmed = tracker.scoring().get_candidate(actor).await.unwrap();
    assert!(confirmed.evidence_strength_score > base);
}

#[tokio::test]
async fn test_archived_case_drops_out_of_score() {
    let (tracker, _) = tracker();
    let actor = create(&tracker, perpetrator("tjwg", "P-1", "Kang Phyo Yong")).await;
    documented_case(&tracker, actor, "Harassment of relatives", 4).await;
    let severe = documented_case(&tracker, actor, "Kidnapping attempt", 10).await;
    let with_both = tracker.scoring().nominate(actor).await.unwrap();

    tracker
        .advance_case_status(severe, CaseStatus::Archived)
        .await
        .unwrap();
    let without = tracker.scoring().get_candidate(actor).await.unwrap();
    assert!(without.evidence_strength_score < with_both.evidence_strength_score);
    assert_eq!(without.breakdown.case_count, 1);
    assert_eq!(without.breakdown.mean_severity, Some(4.0));
    assert!(tracker.scoring().rederive(actor).await.unwrap().matches);

    tracker.reopen_case(severe).await.unwrap();
    let restored = tracker.scoring().get_candidate(actor).await.unwrap();
    assert_eq!(restored.breakdown.case_count, 2);
    assert!((restored.evidence_strength_score - with_both.evidence_strength_score).abs() < 1e-9);
    assert!(tracker.scoring().rederive(actor).await.unwrap().matches);
}

#[tokio::test]
async fn test_new_subordinate_rescores_superiors() {
    let (tracker, _) = tracker();
    let top = create(&tracker, perpetrator("tjwg", "T-1", "Marshal Pak")).await;
    let middle = create(&tracker, perpetrator("tjwg", "T-2", "Colonel Ri")).await;
    tracker.add_edge(NewChainEdge::new(top, middle, 0.9)).await.unwrap();
    let top_before = tracker.scoring().nominate(top).await.unwrap();
    let middle_before = tracker.scoring().nominate(middle).await.unwrap();

    add_subordinates(&tracker, middle, 2, 100).await;

    let top_after = tracker.scoring().get_candidate(top).await.unwrap();
    let middle_after = tracker.scoring().get_candidate(middle).await.unwrap();
    assert_eq!(top_after.breakdown.centrality, 3);
    assert_eq!(middle_after.breakdown.centrality, 2);
    assert!(top_after.evidence_strength_score > top_before.evidence_strength_score);
    assert!(middle_after.evidence_strength_score > middle_before.evidence_strength_score);

    let edges = tracker.graph().edge_history(middle).await.unwrap();
    let link = edges.iter().find(|e| e.superior_id == top).unwrap();
    tracker
        .deactivate_edge(link.id, chrono::Utc::now().date_naive())
        .await
        .unwrap();
    assert_eq!(
        tracker.scoring().get_candidate(top).await.unwrap().breakdown.centrality,
        0
    );
}

#[tokio::test]
async fn test_candidate_workflow() {
    let (tracker, _) = tracker();
    let actor = create(&tracker, perpetrator("tjwg", "W-1", "Choe Hui")).await;
    documented_case(&tracker, actor, "Threats via messenger", 5).await;
    tracker.scoring().nominate(actor).await.unwrap();
    let scoring = tracker.scoring();

    let proposed = scoring
        .transition(actor, SanctionStatus::Proposed, DecisionUpdate::default())
        .await
        .unwrap();
    assert!(proposed.recommendation_date.is_some());
    assert!(matches!(
        scoring
            .transition(actor, SanctionStatus::Candidate, DecisionUpdate::default())
            .await,
        Err(TrackerError::IllegalTransition { .. })
    ));

    scoring
        .transition(actor, SanctionStatus::UnderReview, DecisionUpdate::default())
        .await
        .unwrap();
    let sanctioned = scoring
        .transition(
            actor,
            SanctionStatus::Sanctioned,
            DecisionUpdate {
                reviewing_body: Some("EU Council".into()),
                legal_basis: Some("Regulation 2020/1998".into()),
                proposed_sanctions: Some(vec!["asset freeze".into(), "travel ban".into()]),
                ..DecisionUpdate::notes("Designated")
            },
        )
        .await
        .unwrap();
    assert!(sanctioned.decision_date.is_some());
    assert_eq!(sanctioned.proposed_sanctions.len(), 2);
    assert!(scoring
        .transition(actor, SanctionStatus::Rejected, DecisionUpdate::default())
        .await
        .is_err());

    let reopened = scoring.reopen(actor, "new exculpatory evidence").await.unwrap();
    assert_eq!(reopened.status, SanctionStatus::UnderReview);
    assert!(reopened.decision_date.is_none());
    assert_eq!(reopened.reviewing_body.as_deref(), Some("EU Council"));
    assert!(scoring.reopen(actor, "again").await.is_err());
}

#[tokio::test]
async fn test_candidate_list_ranking_and_filters() {
    let (tracker, _) = tracker();
    let strong = create(&tracker, perpetrator("tjwg", "L-1", "Kim Yong Chol")).await;
    add_subordinates(&tracker, strong, 30, 200).await;
    for (i, severity) in [10u8, 10, 9, 10, 10, 9].into_iter().enumerate() {
        documented_case(&tracker, strong, &format!("Operation {i}"), severity).await;
    }
    let weak = create(&tracker, perpetrator("tjwg", "L-2", "Ho Chang Ok")).await;
    documented_case(&tracker, weak, "Single threat", 2).await;
    let unscored = create(&tracker, perpetrator("tjwg", "L-3", "Yang Hyong Sop")).await;

    for actor in [weak, unscored, strong] {
        tracker.scoring().nominate(actor).await.unwrap();
    }

    let ranked = tracker.candidate_list(&CandidateFilter::default()).await.unwrap();
    let order: Vec<ActorId> = ranked.iter().map(|c| c.actor_id).collect();
    assert_eq!(order, vec![strong, weak, unscored]);
    assert!(ranked.windows(2).all(|w| w[0].priority_level <= w[1].priority_level));

    let top = tracker
        .candidate_list(&CandidateFilter {
            max_priority_level: Some(ranked[0].priority_level),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(top.len(), 1);

    let page = tracker
        .candidate_list(&CandidateFilter {
            offset: 1,
            limit: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].actor_id, weak);
}
