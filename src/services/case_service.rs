//! Cases, their actor links and evidence
//!
//! Case rows are rewritten by actor merges, so every case write joins the
//! merge queue.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::locks::WriteLocks;
use crate::error::{Result, TrackerError};
use crate::models::*;
use crate::store::TrackerStore;

const MIN_SEVERITY: u8 = 1;
const MAX_SEVERITY: u8 = 10;

pub struct CaseService {
    store: Arc<dyn TrackerStore>,
    locks: Arc<WriteLocks>,
}

impl CaseService {
    pub fn new(store: Arc<dyn TrackerStore>, locks: Arc<WriteLocks>) -> Self {
        Self { store, locks }
    }

    #[instrument(skip(self, new), fields(title = %new.title))]
    pub async fn create_case(&self, new: NewCase) -> Result<Case> {
        let reject = |reason: String| {
            Err(TrackerError::validation(
                "case",
                new.case_number.clone().unwrap_or_default(),
                reason,
            ))
        };
        if new.title.trim().is_empty() {
            return reject("title is empty".into());
        }
        if let Some(severity) = new.severity {
            if !(MIN_SEVERITY..=MAX_SEVERITY).contains(&severity) {
                return reject(format!(
                    "severity {} outside [{}, {}]",
                    severity, MIN_SEVERITY, MAX_SEVERITY
                ));
            }
        }

        let now = Utc::now();
        let case = Case {
            id: Uuid::new_v4(),
            title: new.title.trim().to_string(),
            title_korean: new.title_korean,
            case_number: new.case_number,
            status: CaseStatus::Open,
            tnr_type: new.tnr_type,
            date_occurred: new.date_occurred,
            country: new.country,
            summary: new.summary,
            severity: new.severity,
            tags: new.tags,
            actors: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let _queue = self.locks.merge().await;
        self.store.insert_case(case.clone()).await?;
        info!(case_id = %case.id, severity = ?case.severity, "Case created");
        Ok(case)
    }

    pub async fn get_case(&self, case_id: CaseId) -> Result<Case> {
        self.store
            .get_case(case_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("case", case_id))
    }

    /// Move a case forward through its status machine
    pub async fn advance_case_status(&self, case_id: CaseId, next: CaseStatus) -> Result<Case> {
        let _queue = self.locks.merge().await;
        let mut case = self.get_case(case_id).await?;
        if !case.status.can_advance_to(next) {
            return Err(TrackerError::IllegalTransition {
                entity: "case",
                from: case.status.to_string(),
                to: next.to_string(),
            });
        }
        let from = case.status;
        case.status = next;
        case.updated_at = Utc::now();
        self.store.update_case(case.clone()).await?;
        info!(case_id = %case_id, from = %from, to = %next, "Case status advanced");
        Ok(case)
    }

    /// Explicit reopen: closed or archived back to open
    pub async fn reopen_case(&self, case_id: CaseId) -> Result<Case> {
        let _queue = self.locks.merge().await;
        let mut case = self.get_case(case_id).await?;
        if !case.status.can_reopen() {
            return Err(TrackerError::IllegalTransition {
                entity: "case",
                from: case.status.to_string(),
                to: CaseStatus::Open.to_string(),
            });
        }
        let from = case.status;
        case.status = CaseStatus::Open;
        case.updated_at = Utc::now();
        self.store.update_case(case.clone()).await?;
        info!(case_id = %case_id, from = %from, "Case reopened");
        Ok(case)
    }

    /// Link an actor to a case in a role. Linking the same pair and role
    /// again is a no-op; the flag tells whether anything changed.
    #[instrument(skip(self, description))]
    pub async fn link_actor(
        &self,
        case_id: CaseId,
        actor_id: ActorId,
        role: &str,
        description: Option<String>,
    ) -> Result<(Case, bool)> {
        let role = role.trim();
        if role.is_empty() {
            return Err(TrackerError::validation(
                "case",
                case_id.to_string(),
                "actor role is empty",
            ));
        }

        let _queue = self.locks.merge().await;
        let mut case = self.get_case(case_id).await?;
        let actor = self
            .store
            .get_actor(actor_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("actor", actor_id))?;
        if actor.is_archived() {
            return Err(TrackerError::IllegalTransition {
                entity: "actor",
                from: "archived".into(),
                to: "linked to case".into(),
            });
        }
        if case
            .actors
            .iter()
            .any(|a| a.actor_id == actor_id && a.role == role)
        {
            return Ok((case, false));
        }

        case.actors.push(CaseActor {
            actor_id,
            role: role.to_string(),
            description,
        });
        case.updated_at = Utc::now();
        self.store.update_case(case.clone()).await?;
        info!(case_id = %case_id, actor_id = %actor_id, role, "Actor linked to case");
        Ok((case, true))
    }

    pub async fn attach_evidence(&self, new: NewEvidence) -> Result<Evidence> {
        if new.title.trim().is_empty() {
            return Err(TrackerError::validation(
                "evidence",
                new.case_id.to_string(),
                "title is empty",
            ));
        }
        if let Some(score) = new.authenticity_score {
            if !crate::models::raw::in_unit_range(score) {
                return Err(TrackerError::validation(
                    "evidence",
                    new.case_id.to_string(),
                    format!("authenticity score {} outside [0, 1]", score),
                ));
            }
        }
        let evidence = Evidence {
            id: Uuid::new_v4(),
            case_id: new.case_id,
            evidence_type: new.evidence_type,
            title: new.title.trim().to_string(),
            description: new.description,
            source_name: new.source_name,
            source_url: new.source_url,
            file_hash: new.file_hash,
            authenticity_score: new.authenticity_score,
            is_verified: false,
            verified_by: None,
            verification_date: None,
            created_at: Utc::now(),
        };
        self.store.insert_evidence(evidence.clone()).await?;
        info!(evidence_id = %evidence.id, case_id = %evidence.case_id, "Evidence attached");
        Ok(evidence)
    }

    /// Mark evidence verified; verifying twice keeps the first verifier
    pub async fn verify_evidence(
        &self,
        evidence_id: EvidenceId,
        verifier: &str,
        date: NaiveDate,
    ) -> Result<(Evidence, bool)> {
        let mut evidence = self
            .store
            .get_evidence(evidence_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("evidence", evidence_id))?;
        if evidence.is_verified {
            return Ok((evidence, false));
        }
        evidence.is_verified = true;
        evidence.verified_by = Some(verifier.to_string());
        evidence.verification_date = Some(date);
        self.store.update_evidence(evidence.clone()).await?;
        info!(evidence_id = %evidence_id, verifier, "Evidence verified");
        Ok((evidence, true))
    }

    pub async fn evidence_for_case(&self, case_id: CaseId) -> Result<Vec<Evidence>> {
        self.store.evidence_for_case(case_id).await
    }

    pub async fn cases_for_actor(&self, actor_id: ActorId) -> Result<Vec<Case>> {
        self.store.cases_for_actor(actor_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn service() -> (CaseService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (CaseService::new(store.clone(), Arc::new(WriteLocks::new())), store)
    }

    #[tokio::test]
    async fn test_create_case_validates_severity() {
        let (cases, _) = service();
        assert!(cases
            .create_case(NewCase::titled("Abduction in Vladivostok").severity(11))
            .await
            .is_err());
        let case = cases
            .create_case(NewCase::titled("Abduction in Vladivostok").severity(8))
            .await
            .unwrap();
        assert_eq!(case.status, CaseStatus::Open);
    }

    #[tokio::test]
    async fn test_status_forward_only_with_reopen() {
        let (cases, _) = service();
        let case = cases.create_case(NewCase::titled("Forced return")).await.unwrap();
        cases
            .advance_case_status(case.id, CaseStatus::Documented)
            .await
            .unwrap();
        assert!(matches!(
            cases
                .advance_case_status(case.id, CaseStatus::UnderInvestigation)
                .await,
            Err(TrackerError::IllegalTransition { .. })
        ));
        assert!(cases.reopen_case(case.id).await.is_err());
        cases
            .advance_case_status(case.id, CaseStatus::Closed)
            .await
            .unwrap();
        let reopened = cases.reopen_case(case.id).await.unwrap();
        assert_eq!(reopened.status, CaseStatus::Open);
    }

    #[tokio::test]
    async fn test_verify_evidence_once() {
        let (cases, _) = service();
        let case = cases.create_case(NewCase::titled("Threats by phone")).await.unwrap();
        let evidence = cases
            .attach_evidence(NewEvidence::new(case.id, EvidenceType::Testimony, "Witness A"))
            .await
            .unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        let (verified, changed) = cases.verify_evidence(evidence.id, "analyst-1", date).await.unwrap();
        assert!(changed && verified.is_verified);
        let (again, changed) = cases.verify_evidence(evidence.id, "analyst-2", date).await.unwrap();
        assert!(!changed);
        assert_eq!(again.verified_by.as_deref(), Some("analyst-1"));
    }

    #[tokio::test]
    async fn test_attach_evidence_to_unknown_case() {
        let (cases, _) = service();
        assert!(matches!(
            cases
                .attach_evidence(NewEvidence::new(Uuid::new_v4(), EvidenceType::Document, "Memo"))
                .await,
            Err(TrackerError::NotFound { .. })
        ));
    }
}
