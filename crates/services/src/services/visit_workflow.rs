//! The service-visit workflow: a linear four-step state machine that
//! accumulates one aggregate [`VisitRecord`] and hands it to a persistence
//! collaborator when the final step is submitted.
//!
//! Step order is fixed: check-in, water parameters, product applications,
//! needs assessment. A step payload is validated before anything is merged
//! into the record, so a failed submission never corrupts the aggregate and
//! never advances the step pointer.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use db::models::{
    client::Client,
    product::Product,
    visit::{
        ApplicationEntry, AssessmentRecord, CheckInRecord, Parameter, Recommendation,
        RecommendationPriority, VisitRecord, VisitStatus,
    },
};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use thiserror::Error;
use tracing::{info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::water_chemistry::{self, WaterParametersInput};

/// One of the four ordered workflow phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Step {
    CheckIn,
    Parameters,
    Products,
    Assessment,
}

impl Step {
    pub fn index(self) -> u8 {
        match self {
            Step::CheckIn => 1,
            Step::Parameters => 2,
            Step::Products => 3,
            Step::Assessment => 4,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(Step::CheckIn),
            2 => Some(Step::Parameters),
            3 => Some(Step::Products),
            4 => Some(Step::Assessment),
            _ => None,
        }
    }

    fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    fn previous(self) -> Option<Self> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }
}

/// Validation failure for a single step submission. The aggregate record is
/// untouched when one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepValidationError {
    #[error("parameter '{0}' is required")]
    MissingParameter(Parameter),
    #[error("parameter '{0}' must be numeric")]
    NonNumericValue(Parameter),
    #[error("parameter '{parameter}' = {value} is outside the valid range {valid_min}–{valid_max}")]
    OutOfRange {
        parameter: Parameter,
        value: f64,
        valid_min: f64,
        valid_max: f64,
    },
    #[error("product '{0}' not found in catalog")]
    MissingProduct(String),
    #[error("quantity must be greater than zero (got {0})")]
    InvalidQuantity(f64),
    #[error("application reason is required")]
    MissingReason,
    #[error("at least one product application is required")]
    NoApplications,
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("client not found: {0}")]
    ClientNotFound(Uuid),
    #[error("step {} submitted out of sequence (current step is {})", got.index(), expected.index())]
    OutOfSequence { expected: Step, got: Step },
    #[error(transparent)]
    Validation(#[from] StepValidationError),
    #[error("visit is already completed")]
    AlreadyCompleted,
    #[error("visit is not completed yet")]
    NotCompleted,
    #[error("failed to save completed visit: {0}")]
    Persistence(String),
    #[error("collaborator error: {0}")]
    Collaborator(String),
}

/// Resolves client references. Backed by the clients table in production.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    async fn resolve_client(&self, client_id: Uuid) -> anyhow::Result<Option<Client>>;
}

/// Resolves product references for application validation and unit display.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn resolve_product(&self, slug: &str) -> anyhow::Result<Option<Product>>;
}

/// Receives the finalized visit record exactly once per completed visit.
#[async_trait]
pub trait VisitSink: Send + Sync {
    async fn save_completed_visit(&self, record: &VisitRecord) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct CheckInInput {
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationInput {
    pub product_slug: String,
    pub quantity: f64,
    pub reason: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentInput {
    pub urgent_issues: Vec<String>,
    pub recommendations: Vec<Recommendation>,
    pub client_approval: BTreeMap<String, bool>,
    pub general_notes: Option<String>,
    pub next_visit_notes: Option<String>,
}

/// Typed step payload. The variant determines which step is being
/// submitted; product applications are staged individually beforehand, so
/// that step's submission carries no data of its own.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "step", rename_all = "lowercase")]
pub enum StepPayload {
    CheckIn(CheckInInput),
    Parameters(WaterParametersInput),
    Products,
    Assessment(AssessmentInput),
}

impl StepPayload {
    pub fn step(&self) -> Step {
        match self {
            StepPayload::CheckIn(_) => Step::CheckIn,
            StepPayload::Parameters(_) => Step::Parameters,
            StepPayload::Products => Step::Products,
            StepPayload::Assessment(_) => Step::Assessment,
        }
    }
}

/// Point-in-time view of an in-flight workflow, for the presentation layer.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSnapshot {
    pub record: VisitRecord,
    pub step: Step,
    pub step_index: u8,
    pub staged_applications: Vec<ApplicationEntry>,
    pub saved: bool,
}

/// Sum of estimated costs over exactly the approved recommendations.
pub fn total_approved_cost(
    recommendations: &[Recommendation],
    client_approval: &BTreeMap<String, bool>,
) -> f64 {
    recommendations
        .iter()
        .filter(|rec| client_approval.get(&rec.id).copied().unwrap_or(false))
        .map(|rec| rec.estimated_cost)
        .sum()
}

/// Predefined follow-up recommendations shown on the assessment step.
pub fn recommendation_catalog() -> Vec<Recommendation> {
    fn rec(
        id: &str,
        title: &str,
        description: &str,
        priority: RecommendationPriority,
        estimated_cost: f64,
    ) -> Recommendation {
        Recommendation {
            id: id.to_string(),
            title: title.to_string(),
            description: Some(description.to_string()),
            priority,
            estimated_cost,
        }
    }

    vec![
        rec(
            "equipment-maintenance",
            "Manutenção de Equipamentos",
            "Limpeza e verificação de bombas, filtros e skimmers",
            RecommendationPriority::Medium,
            150.0,
        ),
        rec(
            "chemical-balance",
            "Balanceamento Químico Completo",
            "Ajuste completo de pH, cloro e alcalinidade",
            RecommendationPriority::High,
            80.0,
        ),
        rec(
            "deep-cleaning",
            "Limpeza Profunda",
            "Escovação completa, aspiração e limpeza de bordas",
            RecommendationPriority::Medium,
            200.0,
        ),
        rec(
            "algae-treatment",
            "Tratamento Anti-Algas",
            "Aplicação de algicida e tratamento preventivo",
            RecommendationPriority::High,
            120.0,
        ),
        rec(
            "filter-replacement",
            "Troca de Filtro",
            "Substituição do elemento filtrante",
            RecommendationPriority::Low,
            300.0,
        ),
        rec(
            "tile-cleaning",
            "Limpeza de Azulejos",
            "Remoção de calcário e manchas dos azulejos",
            RecommendationPriority::Low,
            180.0,
        ),
    ]
}

/// Predefined urgent-issue tags for the assessment step.
pub fn urgent_issue_catalog() -> Vec<&'static str> {
    vec![
        "Água turva ou com coloração anormal",
        "Equipamento com defeito",
        "Vazamento identificado",
        "Presença de algas visíveis",
        "Odor forte de cloro ou químicos",
        "pH muito alto ou muito baixo",
        "Problema na circulação da água",
    ]
}

/// Controller for one in-flight visit. Owns the aggregate record; all
/// operations are in-memory except the persistence call triggered by the
/// final step.
pub struct VisitWorkflow {
    catalog: Arc<dyn ProductCatalog>,
    sink: Arc<dyn VisitSink>,
    record: VisitRecord,
    step: Step,
    staged_applications: Vec<ApplicationEntry>,
    saved: bool,
}

impl VisitWorkflow {
    /// Open a workflow for a client. Fails if the client reference does not
    /// resolve in the directory.
    pub async fn start(
        directory: Arc<dyn ClientDirectory>,
        catalog: Arc<dyn ProductCatalog>,
        sink: Arc<dyn VisitSink>,
        client_id: Uuid,
        technician: String,
    ) -> Result<Self, WorkflowError> {
        let client = directory
            .resolve_client(client_id)
            .await
            .map_err(|e| WorkflowError::Collaborator(e.to_string()))?
            .ok_or(WorkflowError::ClientNotFound(client_id))?;

        let id = Uuid::new_v4();
        info!(visit_id = %id, client_id = %client.id, technician, "Starting visit workflow");

        Ok(Self {
            catalog,
            sink,
            record: VisitRecord::new(id, client.id, technician, Utc::now()),
            step: Step::CheckIn,
            staged_applications: Vec::new(),
            saved: false,
        })
    }

    pub fn record(&self) -> &VisitRecord {
        &self.record
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn staged_applications(&self) -> &[ApplicationEntry] {
        &self.staged_applications
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            record: self.record.clone(),
            step: self.step,
            step_index: self.step.index(),
            staged_applications: self.staged_applications.clone(),
            saved: self.saved,
        }
    }

    /// Validate one candidate application entry and append it to the staged
    /// list. The aggregate record is only touched when step 3 is submitted.
    pub async fn stage_application(
        &mut self,
        input: ApplicationInput,
    ) -> Result<ApplicationEntry, WorkflowError> {
        self.ensure_step(Step::Products)?;

        if !input.quantity.is_finite() || input.quantity <= 0.0 {
            return Err(StepValidationError::InvalidQuantity(input.quantity).into());
        }
        if input.reason.trim().is_empty() {
            return Err(StepValidationError::MissingReason.into());
        }

        let product = self
            .catalog
            .resolve_product(&input.product_slug)
            .await
            .map_err(|e| WorkflowError::Collaborator(e.to_string()))?
            .ok_or_else(|| StepValidationError::MissingProduct(input.product_slug.clone()))?;

        let entry = ApplicationEntry {
            id: Uuid::new_v4(),
            product_slug: product.slug,
            product_name: product.name,
            unit: product.unit,
            quantity: input.quantity,
            reason: input.reason.trim().to_string(),
            note: input.note.filter(|n| !n.trim().is_empty()),
            applied_at: Utc::now(),
        };
        self.staged_applications.push(entry.clone());
        Ok(entry)
    }

    /// Remove a staged entry. Pure list operation, no validation.
    pub fn remove_application(&mut self, entry_id: Uuid) -> bool {
        let before = self.staged_applications.len();
        self.staged_applications.retain(|entry| entry.id != entry_id);
        self.staged_applications.len() < before
    }

    /// Submit the current step. On success the payload is merged into the
    /// record and the step pointer advances; submitting the final step also
    /// finalizes the visit and invokes the persistence collaborator.
    pub async fn submit_step(
        &mut self,
        payload: StepPayload,
    ) -> Result<&VisitRecord, WorkflowError> {
        if self.record.status == VisitStatus::Completed {
            return Err(WorkflowError::AlreadyCompleted);
        }
        self.ensure_step(payload.step())?;

        match payload {
            StepPayload::CheckIn(input) => {
                self.record.check_in = Some(CheckInRecord {
                    checked_in_at: Utc::now(),
                    note: input.note.filter(|n| !n.trim().is_empty()),
                    technician: self.record.technician.clone(),
                });
                self.record.status = VisitStatus::InProgress;
                self.advance();
            }
            StepPayload::Parameters(input) => {
                let readings = water_chemistry::validate_readings(&input, Utc::now())?;
                self.record.water_parameters = Some(readings);
                self.advance();
            }
            StepPayload::Products => {
                if self.staged_applications.is_empty() {
                    return Err(StepValidationError::NoApplications.into());
                }
                self.record.product_applications = std::mem::take(&mut self.staged_applications);
                self.advance();
            }
            StepPayload::Assessment(input) => {
                let total = total_approved_cost(&input.recommendations, &input.client_approval);
                self.record.needs_assessment = Some(AssessmentRecord {
                    urgent_issues: input.urgent_issues,
                    recommendations: input.recommendations,
                    client_approval: input.client_approval,
                    general_notes: input.general_notes,
                    next_visit_notes: input.next_visit_notes,
                    total_approved_cost: total,
                    recorded_at: Utc::now(),
                });
                self.record.status = VisitStatus::Completed;
                self.record.ended_at = Some(Utc::now());

                info!(
                    visit_id = %self.record.id,
                    client_id = %self.record.client_id,
                    "Visit completed, saving"
                );
                self.save().await?;
            }
        }

        Ok(&self.record)
    }

    /// Step back for review. Earlier-step data stays in the record and
    /// later-step data is not invalidated; no-op on the first step.
    pub fn previous_step(&mut self) -> Result<&VisitRecord, WorkflowError> {
        if self.record.status == VisitStatus::Completed {
            return Err(WorkflowError::AlreadyCompleted);
        }
        if let Some(previous) = self.step.previous() {
            self.step = previous;
        }
        Ok(&self.record)
    }

    /// Discard the in-progress record. No save occurs.
    pub fn abandon(self) {
        info!(
            visit_id = %self.record.id,
            client_id = %self.record.client_id,
            step = %self.step,
            "Visit abandoned, discarding record"
        );
    }

    /// Retry the persistence call after a `Persistence` failure. The record
    /// is already finalized; nothing is recomputed.
    pub async fn retry_save(&mut self) -> Result<&VisitRecord, WorkflowError> {
        if self.record.status != VisitStatus::Completed {
            return Err(WorkflowError::NotCompleted);
        }
        if !self.saved {
            self.save().await?;
        }
        Ok(&self.record)
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    fn ensure_step(&self, got: Step) -> Result<(), WorkflowError> {
        if got != self.step {
            return Err(WorkflowError::OutOfSequence {
                expected: self.step,
                got,
            });
        }
        Ok(())
    }

    fn advance(&mut self) {
        if let Some(next) = self.step.next() {
            self.step = next;
        }
    }

    async fn save(&mut self) -> Result<(), WorkflowError> {
        match self.sink.save_completed_visit(&self.record).await {
            Ok(()) => {
                self.saved = true;
                Ok(())
            }
            Err(e) => {
                warn!(visit_id = %self.record.id, error = %e, "Failed to save completed visit");
                Err(WorkflowError::Persistence(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use db::models::client::{ClientStatus, PoolType, VisitDay};
    use db::models::visit::ReadingStatus;

    use super::*;

    struct FakeDirectory {
        clients: Vec<Client>,
    }

    #[async_trait]
    impl ClientDirectory for FakeDirectory {
        async fn resolve_client(&self, client_id: Uuid) -> anyhow::Result<Option<Client>> {
            Ok(self.clients.iter().find(|c| c.id == client_id).cloned())
        }
    }

    struct FakeCatalog {
        products: Vec<Product>,
    }

    #[async_trait]
    impl ProductCatalog for FakeCatalog {
        async fn resolve_product(&self, slug: &str) -> anyhow::Result<Option<Product>> {
            Ok(self.products.iter().find(|p| p.slug == slug).cloned())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        saves: Mutex<Vec<VisitRecord>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl VisitSink for RecordingSink {
        async fn save_completed_visit(&self, record: &VisitRecord) -> anyhow::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.saves.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn test_client(id: Uuid) -> Client {
        Client {
            id,
            name: "Maria Silva Santos".to_string(),
            address: "Rua das Flores, 123".to_string(),
            city: "São Paulo".to_string(),
            state: "SP".to_string(),
            zip_code: Some("01310-100".to_string()),
            phone: "(11) 98765-4321".to_string(),
            email: None,
            visit_day: VisitDay::Monday,
            pool_type: PoolType::Residential,
            status: ClientStatus::Active,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn test_product(slug: &str) -> Product {
        Product {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            name: "Cloro Granulado".to_string(),
            description: None,
            category: "Sanitizante".to_string(),
            unit: "kg".to_string(),
            current_stock: 20.0,
            min_stock: 5.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    struct Harness {
        workflow: VisitWorkflow,
        sink: Arc<RecordingSink>,
        client_id: Uuid,
    }

    async fn start_workflow() -> Harness {
        let client_id = Uuid::new_v4();
        let directory = Arc::new(FakeDirectory {
            clients: vec![test_client(client_id)],
        });
        let catalog = Arc::new(FakeCatalog {
            products: vec![test_product("cloro-granulado")],
        });
        let sink = Arc::new(RecordingSink::default());

        let workflow = VisitWorkflow::start(
            directory,
            catalog,
            sink.clone(),
            client_id,
            "João Silva".to_string(),
        )
        .await
        .unwrap();

        Harness {
            workflow,
            sink,
            client_id,
        }
    }

    fn ideal_parameters() -> WaterParametersInput {
        WaterParametersInput {
            ph: Some("7.4".into()),
            chlorine: Some("2.0".into()),
            alkalinity: Some("100".into()),
            calcium_hardness: Some("300".into()),
            cyanuric_acid: Some("40".into()),
            temperature: Some("26".into()),
        }
    }

    fn routine_application() -> ApplicationInput {
        ApplicationInput {
            product_slug: "cloro-granulado".to_string(),
            quantity: 0.5,
            reason: "rotina".to_string(),
            note: None,
        }
    }

    #[tokio::test]
    async fn start_fails_for_unknown_client() {
        let directory = Arc::new(FakeDirectory { clients: vec![] });
        let catalog = Arc::new(FakeCatalog { products: vec![] });
        let sink = Arc::new(RecordingSink::default());
        let unknown = Uuid::new_v4();

        let result = VisitWorkflow::start(directory, catalog, sink, unknown, "João".to_string())
            .await;
        assert!(matches!(
            result,
            Err(WorkflowError::ClientNotFound(id)) if id == unknown
        ));
    }

    #[tokio::test]
    async fn full_visit_reaches_completed_and_saves_once() {
        let mut h = start_workflow().await;

        h.workflow
            .submit_step(StepPayload::CheckIn(CheckInInput {
                note: Some("gate code 1234".to_string()),
            }))
            .await
            .unwrap();
        assert_eq!(h.workflow.record().status, VisitStatus::InProgress);
        assert_eq!(h.workflow.step(), Step::Parameters);

        h.workflow
            .submit_step(StepPayload::Parameters(ideal_parameters()))
            .await
            .unwrap();

        h.workflow
            .stage_application(routine_application())
            .await
            .unwrap();
        h.workflow
            .submit_step(StepPayload::Products)
            .await
            .unwrap();
        assert_eq!(h.workflow.step(), Step::Assessment);

        h.workflow
            .submit_step(StepPayload::Assessment(AssessmentInput::default()))
            .await
            .unwrap();

        let record = h.workflow.record();
        assert_eq!(record.status, VisitStatus::Completed);
        assert!(record.ended_at.unwrap() >= record.started_at);

        let saves = h.sink.saves.lock().unwrap();
        assert_eq!(saves.len(), 1);
        let saved = &saves[0];
        assert_eq!(saved.client_id, h.client_id);
        assert_eq!(
            saved.check_in.as_ref().unwrap().note.as_deref(),
            Some("gate code 1234")
        );
        let readings = &saved.water_parameters.as_ref().unwrap().readings;
        assert_eq!(readings.len(), 6);
        assert!(
            readings
                .values()
                .all(|r| r.status == ReadingStatus::Ideal)
        );
        assert_eq!(saved.product_applications.len(), 1);
        assert_eq!(saved.product_applications[0].quantity, 0.5);
        assert_eq!(
            saved.needs_assessment.as_ref().unwrap().total_approved_cost,
            0.0
        );
    }

    #[tokio::test]
    async fn out_of_sequence_submission_is_rejected_without_mutation() {
        let mut h = start_workflow().await;
        let before = h.workflow.record().clone();

        let result = h
            .workflow
            .submit_step(StepPayload::Parameters(ideal_parameters()))
            .await;
        assert!(matches!(
            result,
            Err(WorkflowError::OutOfSequence {
                expected: Step::CheckIn,
                got: Step::Parameters,
            })
        ));
        assert_eq!(h.workflow.step(), Step::CheckIn);
        assert_eq!(*h.workflow.record(), before);
    }

    #[tokio::test]
    async fn out_of_range_ph_is_rejected_and_step_unchanged() {
        let mut h = start_workflow().await;
        h.workflow
            .submit_step(StepPayload::CheckIn(CheckInInput::default()))
            .await
            .unwrap();

        let mut parameters = ideal_parameters();
        parameters.ph = Some("8.6".into());
        let before = h.workflow.record().clone();

        let result = h
            .workflow
            .submit_step(StepPayload::Parameters(parameters))
            .await;
        match result {
            Err(WorkflowError::Validation(StepValidationError::OutOfRange {
                parameter,
                value,
                valid_min,
                valid_max,
            })) => {
                assert_eq!(parameter, Parameter::Ph);
                assert_eq!(value, 8.6);
                assert_eq!(valid_min, 6.0);
                assert_eq!(valid_max, 8.5);
            }
            other => panic!("expected OutOfRange, got {other:?}"),
        }
        assert_eq!(h.workflow.step(), Step::Parameters);
        assert_eq!(*h.workflow.record(), before);
    }

    #[tokio::test]
    async fn products_step_requires_at_least_one_application() {
        let mut h = start_workflow().await;
        h.workflow
            .submit_step(StepPayload::CheckIn(CheckInInput::default()))
            .await
            .unwrap();
        h.workflow
            .submit_step(StepPayload::Parameters(ideal_parameters()))
            .await
            .unwrap();

        let result = h.workflow.submit_step(StepPayload::Products).await;
        assert!(matches!(
            result,
            Err(WorkflowError::Validation(StepValidationError::NoApplications))
        ));
        assert_eq!(h.workflow.step(), Step::Products);

        h.workflow
            .stage_application(routine_application())
            .await
            .unwrap();
        h.workflow
            .submit_step(StepPayload::Products)
            .await
            .unwrap();
        assert_eq!(h.workflow.step(), Step::Assessment);
    }

    #[tokio::test]
    async fn stage_application_validates_entries() {
        let mut h = start_workflow().await;
        h.workflow
            .submit_step(StepPayload::CheckIn(CheckInInput::default()))
            .await
            .unwrap();
        h.workflow
            .submit_step(StepPayload::Parameters(ideal_parameters()))
            .await
            .unwrap();

        let mut input = routine_application();
        input.quantity = 0.0;
        assert!(matches!(
            h.workflow.stage_application(input).await,
            Err(WorkflowError::Validation(StepValidationError::InvalidQuantity(q))) if q == 0.0
        ));

        let mut input = routine_application();
        input.reason = "  ".to_string();
        assert!(matches!(
            h.workflow.stage_application(input).await,
            Err(WorkflowError::Validation(StepValidationError::MissingReason))
        ));

        let mut input = routine_application();
        input.product_slug = "barrilha".to_string();
        assert!(matches!(
            h.workflow.stage_application(input).await,
            Err(WorkflowError::Validation(StepValidationError::MissingProduct(slug))) if slug == "barrilha"
        ));

        assert!(h.workflow.staged_applications().is_empty());
    }

    #[tokio::test]
    async fn staged_applications_can_be_removed_before_submit() {
        let mut h = start_workflow().await;
        h.workflow
            .submit_step(StepPayload::CheckIn(CheckInInput::default()))
            .await
            .unwrap();
        h.workflow
            .submit_step(StepPayload::Parameters(ideal_parameters()))
            .await
            .unwrap();

        let entry_id = h
            .workflow
            .stage_application(routine_application())
            .await
            .unwrap()
            .id;
        assert_eq!(h.workflow.staged_applications().len(), 1);

        assert!(h.workflow.remove_application(entry_id));
        assert!(h.workflow.staged_applications().is_empty());
        assert!(!h.workflow.remove_application(entry_id));
    }

    #[test]
    fn total_approved_cost_sums_exactly_the_approved_subset() {
        let recommendations = recommendation_catalog();
        let mut approval = BTreeMap::new();
        approval.insert("chemical-balance".to_string(), true);
        approval.insert("filter-replacement".to_string(), true);
        approval.insert("deep-cleaning".to_string(), false);

        let total = total_approved_cost(&recommendations, &approval);
        assert_eq!(total, 80.0 + 300.0);

        // recomputation is idempotent
        assert_eq!(total_approved_cost(&recommendations, &approval), total);

        assert_eq!(total_approved_cost(&recommendations, &BTreeMap::new()), 0.0);
        assert_eq!(total_approved_cost(&[], &approval), 0.0);
    }

    #[tokio::test]
    async fn previous_step_preserves_collected_data() {
        let mut h = start_workflow().await;
        h.workflow
            .submit_step(StepPayload::CheckIn(CheckInInput {
                note: Some("portão lateral".to_string()),
            }))
            .await
            .unwrap();
        h.workflow
            .submit_step(StepPayload::Parameters(ideal_parameters()))
            .await
            .unwrap();
        assert_eq!(h.workflow.step(), Step::Products);

        h.workflow.previous_step().unwrap();
        assert_eq!(h.workflow.step(), Step::Parameters);
        assert!(h.workflow.record().check_in.is_some());
        assert!(h.workflow.record().water_parameters.is_some());

        h.workflow.previous_step().unwrap();
        h.workflow.previous_step().unwrap(); // no-op at step 1
        assert_eq!(h.workflow.step(), Step::CheckIn);

        // amending check-in overwrites only that slice
        h.workflow
            .submit_step(StepPayload::CheckIn(CheckInInput {
                note: Some("portão principal".to_string()),
            }))
            .await
            .unwrap();
        assert_eq!(
            h.workflow.record().check_in.as_ref().unwrap().note.as_deref(),
            Some("portão principal")
        );
        assert!(h.workflow.record().water_parameters.is_some());
    }

    #[tokio::test]
    async fn persistence_failure_keeps_record_completed_and_allows_retry() {
        let mut h = start_workflow().await;
        h.workflow
            .submit_step(StepPayload::CheckIn(CheckInInput::default()))
            .await
            .unwrap();
        h.workflow
            .submit_step(StepPayload::Parameters(ideal_parameters()))
            .await
            .unwrap();
        h.workflow
            .stage_application(routine_application())
            .await
            .unwrap();
        h.workflow
            .submit_step(StepPayload::Products)
            .await
            .unwrap();

        h.sink.fail.store(true, Ordering::SeqCst);
        let result = h
            .workflow
            .submit_step(StepPayload::Assessment(AssessmentInput::default()))
            .await;
        assert!(matches!(result, Err(WorkflowError::Persistence(_))));
        assert_eq!(h.workflow.record().status, VisitStatus::Completed);
        assert!(h.workflow.record().ended_at.is_some());
        assert!(!h.workflow.is_saved());

        // resubmitting the finished workflow is rejected
        assert!(matches!(
            h.workflow
                .submit_step(StepPayload::Assessment(AssessmentInput::default()))
                .await,
            Err(WorkflowError::AlreadyCompleted)
        ));

        h.sink.fail.store(false, Ordering::SeqCst);
        h.workflow.retry_save().await.unwrap();
        assert!(h.workflow.is_saved());
        assert_eq!(h.sink.saves.lock().unwrap().len(), 1);

        // retry after success does not save again
        h.workflow.retry_save().await.unwrap();
        assert_eq!(h.sink.saves.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retry_save_requires_a_completed_visit() {
        let mut h = start_workflow().await;
        assert!(matches!(
            h.workflow.retry_save().await,
            Err(WorkflowError::NotCompleted)
        ));
    }

    #[tokio::test]
    async fn abandon_discards_without_saving() {
        let mut h = start_workflow().await;
        h.workflow
            .submit_step(StepPayload::CheckIn(CheckInInput::default()))
            .await
            .unwrap();

        h.workflow.abandon();
        assert!(h.sink.saves.lock().unwrap().is_empty());
    }
}
