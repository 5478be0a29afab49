use crate::config::AppConfig;
use crate::imaging::{ImageNormalizer, delta};
use crate::internal::InternalClient;
use crate::marketplace::quotation::submission_payload;
use crate::marketplace::{ChatMessage, MarketplaceClient, NonQuotableError};
use crate::matcher::{ProductMatcher, ResolutionError};
use crate::models::{FeedbackCode, IdField, QuoteLine, StatusUpdate, TaskRecord, parse_quote_lines};
use crate::reconcile::{self, ReconcileError};
use std::future::Future;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

/// Orchestrates one task from resolution through feedback. Owns the
/// clients for both remote systems; stages run strictly in order with
/// no fan-out, images included.
pub struct Pipeline {
    internal: InternalClient,
    marketplace: MarketplaceClient,
    normalizer: ImageNormalizer,
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
    status_note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    /// Task record unusable; aborts without a feedback write.
    Validation,
    Resolution,
    Reconciliation,
    Submission,
    /// Price already committed; only the message side failed.
    PostSubmission,
}

impl PipelineErrorKind {
    pub fn feedback(self) -> Option<FeedbackCode> {
        match self {
            PipelineErrorKind::Validation => None,
            PipelineErrorKind::Resolution
            | PipelineErrorKind::Reconciliation
            | PipelineErrorKind::Submission => Some(FeedbackCode::AckedFailure),
            PipelineErrorKind::PostSubmission => Some(FeedbackCode::PricedOkMessageFailed),
        }
    }
}

impl PipelineError {
    fn new(kind: PipelineErrorKind, stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind,
            status_note: None,
        }
    }

    fn with_note(mut self, note: impl Into<String>) -> Self {
        self.status_note = Some(note.into());
        self
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }
}

#[derive(Debug)]
struct ValidatedQuotation {
    title: String,
    keer_product_id: i64,
    lines: Vec<QuoteLine>,
}

struct ValidatedTask {
    title: String,
    keer_product_id: i64,
}

struct QuotationReport {
    drift: Option<String>,
}

impl Pipeline {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            internal: InternalClient::new(config),
            marketplace: MarketplaceClient::new(config),
            normalizer: ImageNormalizer::new(),
        }
    }

    pub fn internal(&self) -> &InternalClient {
        &self.internal
    }

    /// Process one quotation task end to end. Returns whether the task
    /// reached the success outcome; every terminal state past
    /// validation writes its feedback code and finalizes.
    pub async fn process_quotation(&self, task: &TaskRecord) -> bool {
        let validated = match validate_quotation(task) {
            Ok(validated) => validated,
            Err(err) => {
                warn!(
                    target = "quotesync.pipeline",
                    error = %err,
                    "quotation task rejected at validation"
                );
                return false;
            }
        };
        info!(
            target = "quotesync.pipeline",
            title = %validated.title,
            keer_product_id = validated.keer_product_id,
            lines = validated.lines.len(),
            "quotation task started"
        );

        let result = self.run_quotation(&validated).await;
        self.settle(
            validated.keer_product_id,
            "quotation",
            result.map(|report| report.drift),
        )
        .await
    }

    /// Process one mark-unquotable task.
    pub async fn process_non_quotable(&self, task: &TaskRecord) -> bool {
        let validated = match validate_basic(task) {
            Ok(validated) => validated,
            Err(err) => {
                warn!(
                    target = "quotesync.pipeline",
                    error = %err,
                    "non-quotable task rejected at validation"
                );
                return false;
            }
        };
        info!(
            target = "quotesync.pipeline",
            title = %validated.title,
            keer_product_id = validated.keer_product_id,
            "non-quotable task started"
        );

        let result = self.run_non_quotable(&validated).await;
        self.settle(validated.keer_product_id, "non_quotable", result.map(|_| None))
            .await
    }

    /// Terminal bookkeeping shared by both pipelines: write the
    /// feedback code (with any annotation) and call the finalization
    /// sink. Finalization runs for every task that passed validation,
    /// success or failure.
    async fn settle(
        &self,
        keer_product_id: i64,
        kind: &'static str,
        result: Result<Option<String>, PipelineError>,
    ) -> bool {
        match result {
            Ok(annotation) => {
                let mut update = StatusUpdate::feedback(FeedbackCode::AckedSuccess);
                if let Some(note) = annotation {
                    info!(
                        target = "quotesync.pipeline",
                        note = %note,
                        "success carries a status annotation"
                    );
                    update = update.with_note(note);
                }
                self.internal
                    .save_task_status(keer_product_id, &update)
                    .await;
                self.internal.finalize_task(keer_product_id).await;
                info!(
                    target = "quotesync.pipeline",
                    keer_product_id = keer_product_id,
                    kind = kind,
                    "task completed"
                );
                true
            }
            Err(err) => {
                warn!(
                    target = "quotesync.pipeline",
                    keer_product_id = keer_product_id,
                    kind = kind,
                    stage = err.stage(),
                    error = %err,
                    "task failed"
                );
                if let Some(code) = err.kind().feedback() {
                    let mut update = StatusUpdate::feedback(code);
                    if let Some(note) = err.status_note.clone() {
                        update = update.with_note(note);
                    }
                    self.internal
                        .save_task_status(keer_product_id, &update)
                        .await;
                    self.internal.finalize_task(keer_product_id).await;
                }
                false
            }
        }
    }

    async fn run_quotation(
        &self,
        task: &ValidatedQuotation,
    ) -> Result<QuotationReport, PipelineError> {
        let matcher = ProductMatcher {
            internal: &self.internal,
            marketplace: &self.marketplace,
        };

        let resolution = self
            .stage("resolving_product", async {
                matcher
                    .resolve(task.keer_product_id, true)
                    .await
                    .map_err(resolution_failure)
            })
            .await?;

        let shopify_product_id = resolution
            .detail
            .product_shopify_id
            .as_ref()
            .and_then(IdField::as_i64)
            .ok_or_else(|| {
                PipelineError::new(
                    PipelineErrorKind::Submission,
                    "submitting_quote",
                    "product detail carries no shopify id",
                )
                .with_note("shopify product id missing")
            })?;

        let reconciliation = self
            .stage("reconciling_variants", async {
                reconcile::build(&resolution.detail.quotation_information, &task.lines).map_err(
                    |err| {
                        let failure = PipelineError::new(
                            PipelineErrorKind::Reconciliation,
                            "reconciling_variants",
                            err.to_string(),
                        );
                        match err {
                            ReconcileError::AllPricesZero => {
                                failure.with_note("all quoted prices are zero")
                            }
                            _ => failure,
                        }
                    },
                )
            })
            .await?;
        info!(
            target = "quotesync.pipeline",
            price_params = reconciliation.price_params.len(),
            deletions = reconciliation.delete_variants.len(),
            skipped_zero_price = reconciliation.skipped_zero_price,
            skipped_unmatched = reconciliation.skipped_unmatched,
            "variants reconciled"
        );

        self.stage("submitting_quote", async {
            let payload =
                submission_payload(resolution.product_id, shopify_product_id, &reconciliation);
            self.marketplace
                .submit_quotation(&payload)
                .await
                .map_err(|err| {
                    PipelineError::new(
                        PipelineErrorKind::Submission,
                        "submitting_quote",
                        err.to_string(),
                    )
                })
        })
        .await?;

        // The quotation id is minted by the submission itself, hence
        // the second detail fetch.
        let detail = self
            .stage("refetching_detail_for_message", async {
                self.marketplace
                    .product_detail(resolution.product_id, true)
                    .await
                    .map_err(|err| {
                        PipelineError::new(
                            PipelineErrorKind::PostSubmission,
                            "refetching_detail_for_message",
                            err.to_string(),
                        )
                    })?
                    .ok_or_else(|| {
                        PipelineError::new(
                            PipelineErrorKind::PostSubmission,
                            "refetching_detail_for_message",
                            "detail response was empty after submission",
                        )
                    })
            })
            .await?;

        let (description, ledger, pending) = self
            .stage("composing_message", async {
                let description = self
                    .internal
                    .fetch_message_content(task.keer_product_id)
                    .await;
                let ledger = self
                    .internal
                    .fetch_uploaded_ledger(task.keer_product_id)
                    .await;
                let all_images = self
                    .internal
                    .fetch_product_images(task.keer_product_id)
                    .await;
                let pending = delta::pending(&all_images, &ledger);
                info!(
                    target = "quotesync.pipeline",
                    pending = pending.len(),
                    "image delta computed"
                );
                Ok((description, ledger, pending))
            })
            .await?;

        let uploaded_urls = self
            .stage("dispatching_message", async {
                let mut attachments = Vec::new();
                let mut uploaded_urls = Vec::new();
                for (offset, url) in pending.iter().enumerate() {
                    match self.normalizer.normalize(url, offset + 1).await {
                        Some(encoded) => {
                            attachments.push(encoded);
                            uploaded_urls.push(url.clone());
                        }
                        None => {
                            warn!(
                                target = "quotesync.pipeline",
                                url = %url,
                                "image dropped from dispatch"
                            );
                        }
                    }
                }
                if !pending.is_empty() && attachments.is_empty() {
                    return Err(PipelineError::new(
                        PipelineErrorKind::PostSubmission,
                        "dispatching_message",
                        "every pending image failed to normalize",
                    ));
                }

                let message = ChatMessage {
                    product_id: resolution.product_id,
                    quotation_id: id_or_zero(&detail.quotation_id),
                    client_account_id: id_or_zero(&detail.client_account_id),
                    client_user_id: id_or_zero(&detail.client_user_id),
                    quotation_request_id: id_or_zero(&detail.quotation_request_id),
                    is_quotation_product: 2,
                    shopify_product_id,
                    description,
                    attachments,
                };
                // On dispatch failure the ledger stays untouched so no
                // image is marked sent that was not.
                self.marketplace
                    .send_chat_message(&message)
                    .await
                    .map_err(|err| {
                        PipelineError::new(
                            PipelineErrorKind::PostSubmission,
                            "dispatching_message",
                            err.to_string(),
                        )
                    })?;
                Ok(uploaded_urls)
            })
            .await?;

        if !uploaded_urls.is_empty() {
            self.stage("updating_image_ledger", async {
                let updated = delta::record(&ledger, &uploaded_urls);
                let update = StatusUpdate {
                    shi_image_note: Some(updated),
                    ..StatusUpdate::default()
                };
                // A lost ledger write is logged by the client; the
                // images were delivered, so the task still succeeds.
                self.internal
                    .save_task_status(task.keer_product_id, &update)
                    .await;
                info!(
                    target = "quotesync.pipeline",
                    uploaded = uploaded_urls.len(),
                    "image ledger extended"
                );
                Ok(())
            })
            .await?;
        }

        Ok(QuotationReport {
            drift: resolution.drift,
        })
    }

    async fn run_non_quotable(&self, task: &ValidatedTask) -> Result<(), PipelineError> {
        let matcher = ProductMatcher {
            internal: &self.internal,
            marketplace: &self.marketplace,
        };

        let resolution = self
            .stage("resolving_product", async {
                matcher
                    .resolve(task.keer_product_id, false)
                    .await
                    .map_err(resolution_failure)
            })
            .await?;

        let shopify_product_id = resolution
            .detail
            .product_shopify_id
            .as_ref()
            .and_then(IdField::as_i64)
            .ok_or_else(|| {
                PipelineError::new(
                    PipelineErrorKind::Submission,
                    "marking_non_quotable",
                    "product detail carries no shopify id",
                )
                .with_note("shopify product id missing")
            })?;

        self.stage("marking_non_quotable", async {
            self.marketplace
                .mark_non_quotable(resolution.product_id, shopify_product_id)
                .await
                .map_err(|err| match err {
                    NonQuotableError::AlreadyQuoted(message) => PipelineError::new(
                        PipelineErrorKind::Submission,
                        "marking_non_quotable",
                        message.clone(),
                    )
                    .with_note(message),
                    NonQuotableError::Exhausted => PipelineError::new(
                        PipelineErrorKind::Submission,
                        "marking_non_quotable",
                        err.to_string(),
                    )
                    .with_note("failed to mark product non-quotable"),
                })
        })
        .await
    }

    async fn stage<T, Fut>(&self, name: &'static str, fut: Fut) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let started = Instant::now();
        let value = fut.await?;
        crate::metrics::stage_elapsed(name, started.elapsed().as_millis());
        Ok(value)
    }
}

fn resolution_failure(err: ResolutionError) -> PipelineError {
    match &err {
        ResolutionError::LookupFailed(_) => PipelineError::new(
            PipelineErrorKind::Resolution,
            "resolving_product",
            err.to_string(),
        )
        .with_note("product lookup failed"),
        ResolutionError::DetailUnavailable(_) => PipelineError::new(
            PipelineErrorKind::Resolution,
            "fetching_detail",
            err.to_string(),
        )
        .with_note("failed to fetch product detail"),
    }
}

fn id_or_zero(field: &Option<IdField>) -> i64 {
    field.as_ref().and_then(IdField::as_i64).unwrap_or(0)
}

fn validate_basic(task: &TaskRecord) -> Result<ValidatedTask, PipelineError> {
    let invalid = |message: &'static str| {
        PipelineError::new(PipelineErrorKind::Validation, "validating", message)
    };
    let title = task
        .client_product_title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .ok_or_else(|| invalid("missing product title"))?
        .to_string();
    let keer_product_id = task
        .keer_product_id
        .as_ref()
        .and_then(IdField::as_i64)
        .ok_or_else(|| invalid("missing internal product id"))?;
    Ok(ValidatedTask {
        title,
        keer_product_id,
    })
}

fn validate_quotation(task: &TaskRecord) -> Result<ValidatedQuotation, PipelineError> {
    let basic = validate_basic(task)?;
    let raw_lines = task.quotation_result.as_deref().ok_or_else(|| {
        PipelineError::new(
            PipelineErrorKind::Validation,
            "validating",
            "missing quotation result",
        )
    })?;
    let lines = parse_quote_lines(raw_lines).map_err(|err| {
        PipelineError::new(
            PipelineErrorKind::Validation,
            "validating",
            format!("quotation result unparseable: {err}"),
        )
    })?;
    Ok(ValidatedQuotation {
        title: basic.title,
        keer_product_id: basic.keer_product_id,
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quotation_task() -> TaskRecord {
        TaskRecord {
            client_product_title: Some("Enamel Mug".to_string()),
            store_code: Some("SQQ-SP00001-pqf5ud-v0".to_string()),
            keer_product_id: Some(IdField::Number(42)),
            quotation_result: Some(
                r#"[{"nation":"GB","quantity":50,"price":10.0,"profit":1.0}]"#.to_string(),
            ),
        }
    }

    #[test]
    fn validation_accepts_complete_task() {
        let validated = validate_quotation(&quotation_task()).unwrap();
        assert_eq!(validated.title, "Enamel Mug");
        assert_eq!(validated.keer_product_id, 42);
        assert_eq!(validated.lines.len(), 1);
    }

    #[test]
    fn validation_accepts_string_ids() {
        let mut task = quotation_task();
        task.keer_product_id = Some(IdField::Text(" 42 ".to_string()));
        assert_eq!(validate_quotation(&task).unwrap().keer_product_id, 42);
    }

    #[test]
    fn validation_rejects_missing_fields_without_feedback() {
        let mut no_title = quotation_task();
        no_title.client_product_title = None;
        let err = validate_quotation(&no_title).unwrap_err();
        assert_eq!(err.kind(), PipelineErrorKind::Validation);
        assert!(err.kind().feedback().is_none());

        let mut no_id = quotation_task();
        no_id.keer_product_id = None;
        assert!(validate_quotation(&no_id).is_err());

        let mut no_result = quotation_task();
        no_result.quotation_result = None;
        assert!(validate_quotation(&no_result).is_err());

        let mut bad_json = quotation_task();
        bad_json.quotation_result = Some("not json".to_string());
        assert!(validate_quotation(&bad_json).is_err());
    }

    #[test]
    fn basic_validation_ignores_quotation_result() {
        let mut task = quotation_task();
        task.quotation_result = None;
        assert!(validate_basic(&task).is_ok());
    }

    #[test]
    fn error_kinds_map_to_feedback_codes() {
        assert_eq!(PipelineErrorKind::Validation.feedback(), None);
        assert_eq!(
            PipelineErrorKind::Resolution.feedback(),
            Some(FeedbackCode::AckedFailure)
        );
        assert_eq!(
            PipelineErrorKind::Reconciliation.feedback(),
            Some(FeedbackCode::AckedFailure)
        );
        assert_eq!(
            PipelineErrorKind::Submission.feedback(),
            Some(FeedbackCode::AckedFailure)
        );
        assert_eq!(
            PipelineErrorKind::PostSubmission.feedback(),
            Some(FeedbackCode::PricedOkMessageFailed)
        );
    }

    #[test]
    fn resolution_failures_name_their_stage() {
        let lookup = resolution_failure(ResolutionError::LookupFailed("boom".to_string()));
        assert_eq!(lookup.stage(), "resolving_product");
        assert_eq!(lookup.kind(), PipelineErrorKind::Resolution);

        let detail = resolution_failure(ResolutionError::DetailUnavailable("gone".to_string()));
        assert_eq!(detail.stage(), "fetching_detail");
        assert_eq!(detail.kind(), PipelineErrorKind::Resolution);
    }

    #[test]
    fn id_or_zero_defaults_missing_identifiers() {
        assert_eq!(id_or_zero(&None), 0);
        assert_eq!(id_or_zero(&Some(IdField::Number(7))), 7);
        assert_eq!(id_or_zero(&Some(IdField::Text("bad".to_string()))), 0);
    }
}
