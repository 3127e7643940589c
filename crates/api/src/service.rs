//! Invoice use cases of the public API
//!
//! `InvoiceService` owns the repository, the blob store and the publisher and
//! is shared by the HTTP handlers and the result ingestion consumer. Every
//! status change goes through [`InvoiceService::apply_event`].

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use invoiceflow_common::{
    db::{
        models::{Invoice, InvoiceType, Tag},
        InvoiceDetails, InvoiceFilter, InvoiceRepository, InvoiceUpdate, NewInvoice, NewTag, Page,
        StatusSummary, TagUpdate, TagUsage,
    },
    errors::{AppError, Result},
    metrics,
    queue::{Message, ProcessInvoice, Publisher},
    storage::{self, BlobStore},
    transition, InvoiceStatus, WorkflowEvent,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use validator::Validate;

/// MIME types accepted for upload
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Attempts at a compare-and-set before giving up on a racing writer
const MAX_TRANSITION_ATTEMPTS: usize = 3;

/// File received with an upload request
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Metadata received with an upload request
#[derive(Debug, Clone, Validate)]
pub struct CreateInvoiceInput {
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: String,
    pub date: Option<String>,
    pub invoice_type: String,
    pub tag_ids: Vec<i32>,
}

/// Partial update of invoice metadata
#[derive(Debug, Clone, Default, Validate)]
pub struct UpdateInvoiceInput {
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: Option<String>,
    pub date: Option<String>,
    pub invoice_type: Option<String>,
    pub tag_ids: Option<Vec<i32>>,
}

/// One page of invoices
#[derive(Debug, Clone)]
pub struct InvoicePage {
    pub invoices: Vec<InvoiceDetails>,
    pub total: u64,
    pub page: Page,
}

impl InvoicePage {
    pub fn total_pages(&self) -> u64 {
        self.page.total_pages(self.total)
    }
}

/// Parse a `tagIds` form field: a JSON array (`[1,2]`) or a comma separated
/// list (`1, 2`). Unparsable entries are skipped.
pub fn parse_tag_ids(raw: &str) -> Vec<i32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    if let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(raw) {
        return values
            .iter()
            .filter_map(|v| match v {
                serde_json::Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
                serde_json::Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .collect();
    }

    raw.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC)
pub fn parse_invoice_date(raw: &str) -> Result<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Ok(date);
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().fixed_offset())
        .ok_or_else(|| AppError::Validation {
            message: format!("invalid date: {}", raw),
            field: Some("date".to_string()),
        })
}

fn parse_invoice_type(raw: &str) -> Result<InvoiceType> {
    raw.parse().map_err(|message| AppError::Validation {
        message,
        field: Some("type".to_string()),
    })
}

fn validate_tag_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AppError::Validation {
            message: "tag name is required".to_string(),
            field: Some("name".to_string()),
        });
    }
    Ok(())
}

pub struct InvoiceService {
    repo: Arc<dyn InvoiceRepository>,
    blobs: Arc<dyn BlobStore>,
    publisher: Arc<dyn Publisher>,
    max_upload_bytes: usize,
}

impl InvoiceService {
    pub fn new(
        repo: Arc<dyn InvoiceRepository>,
        blobs: Arc<dyn BlobStore>,
        publisher: Arc<dyn Publisher>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            repo,
            blobs,
            publisher,
            max_upload_bytes,
        }
    }

    pub fn repository(&self) -> &Arc<dyn InvoiceRepository> {
        &self.repo
    }

    pub fn publisher(&self) -> &Arc<dyn Publisher> {
        &self.publisher
    }

    fn validate_file(&self, file: &UploadedFile) -> Result<()> {
        if !ALLOWED_MIME_TYPES.contains(&file.content_type.as_str()) {
            return Err(AppError::UnsupportedMediaType {
                mime_type: file.content_type.clone(),
            });
        }

        if file.bytes.len() > self.max_upload_bytes {
            return Err(AppError::PayloadTooLarge {
                size: file.bytes.len(),
                limit: self.max_upload_bytes,
            });
        }

        Ok(())
    }

    async fn store_file(&self, user_id: i32, file: UploadedFile) -> Result<String> {
        let key = storage::object_key(user_id, &file.file_name);
        self.blobs.put(file.bytes, &key, &file.content_type).await
    }

    /// Best-effort removal of a file no row points to
    async fn discard_file(&self, locator: &str) {
        if let Err(e) = self.blobs.delete(locator).await {
            warn!(locator, error = %e, "Failed to delete invoice file");
        }
    }

    /// Store the file, record the invoice and hand it to the OCR service.
    ///
    /// The invoice is PROCESSING before `process_invoice` is published. If it
    /// cannot be moved to PROCESSING or the publish fails, the invoice is moved
    /// to ERROR and returned as such. A failed insert leaves no stored file.
    #[instrument(skip(self, input, file))]
    pub async fn create_invoice(
        &self,
        input: CreateInvoiceInput,
        user_id: i32,
        file: Option<UploadedFile>,
    ) -> Result<Invoice> {
        let file = file
            .filter(|f| !f.bytes.is_empty())
            .ok_or_else(|| AppError::InvalidInput {
                message: "File is required for invoice creation".to_string(),
            })?;

        input.validate()?;
        let invoice_type = parse_invoice_type(&input.invoice_type)?;
        let date = match input.date.as_deref() {
            Some(raw) if !raw.trim().is_empty() => parse_invoice_date(raw)?,
            _ => Utc::now().fixed_offset(),
        };
        self.validate_file(&file)?;

        let key = storage::object_key(user_id, &file.file_name);
        let locator = self
            .blobs
            .put(file.bytes.clone(), &key, &file.content_type)
            .await?;

        let created = self
            .repo
            .create_invoice(NewInvoice {
                user_id,
                name: input.name,
                file_path: Some(locator.clone()),
                date,
                invoice_type,
                tag_ids: input.tag_ids,
            })
            .await;
        let invoice = match created {
            Ok(invoice) => invoice,
            Err(e) => {
                self.discard_file(&locator).await;
                return Err(e);
            }
        };
        metrics::record_invoice_uploaded(&file.content_type);
        info!(invoice_id = invoice.id, "Invoice uploaded");

        let status = match self.apply_event(invoice.id, WorkflowEvent::Dispatched).await {
            Ok(status) => status,
            Err(e) => {
                warn!(invoice_id = invoice.id, error = %e, "Failed to move invoice to PROCESSING");
                return match self.apply_event(invoice.id, WorkflowEvent::Failed).await {
                    Ok(status) => Ok(Invoice {
                        status: status.to_string(),
                        ..invoice
                    }),
                    Err(fail_err) => {
                        error!(invoice_id = invoice.id, error = %fail_err, "Failed to mark invoice as failed");
                        Err(e)
                    }
                };
            }
        };

        let message = Message::ProcessInvoice(ProcessInvoice::new(
            invoice.id,
            &file.bytes,
            file.file_name,
        ));

        let status = match self.publisher.publish(message).await {
            Ok(()) => status,
            Err(e) => {
                warn!(invoice_id = invoice.id, error = %e, "Failed to dispatch invoice to OCR");
                self.apply_event(invoice.id, WorkflowEvent::Failed).await?
            }
        };

        Ok(Invoice {
            status: status.to_string(),
            ..invoice
        })
    }

    /// Apply a workflow event to the stored status with compare-and-set.
    ///
    /// Returns the new status, `InvalidTransition` when the event is not
    /// allowed from the current status, or `InvoiceNotFound`.
    #[instrument(skip(self))]
    pub async fn apply_event(&self, invoice_id: i32, event: WorkflowEvent) -> Result<InvoiceStatus> {
        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let invoice = self
                .repo
                .find_invoice(invoice_id)
                .await?
                .ok_or(AppError::InvoiceNotFound { id: invoice_id })?;

            let current = invoice.invoice_status().map_err(|e| AppError::Internal {
                message: e.to_string(),
            })?;
            let next = transition(current, event)?;

            if self
                .repo
                .compare_and_set_status(invoice_id, current, next)
                .await?
            {
                metrics::record_transition(next.as_str());
                info!(from = %current, to = %next, "Invoice status changed");
                return Ok(next);
            }
        }

        Err(AppError::Conflict {
            message: format!("Invoice {} status changed concurrently", invoice_id),
        })
    }

    /// Invoice owned by `user_id`, with data and tags
    pub async fn find_one(&self, id: i32, user_id: i32) -> Result<InvoiceDetails> {
        self.repo
            .invoice_details(id)
            .await?
            .filter(|d| d.invoice.user_id == user_id)
            .ok_or(AppError::InvoiceNotFound { id })
    }

    pub async fn find_all(
        &self,
        user_id: i32,
        page: Page,
        tag_ids: Vec<i32>,
    ) -> Result<InvoicePage> {
        let filter = InvoiceFilter {
            status: None,
            tag_ids,
        };
        let (invoices, total) = self.repo.list_invoices(user_id, &filter, page).await?;
        Ok(InvoicePage {
            invoices,
            total,
            page,
        })
    }

    /// Every invoice of the user in `status`, newest first
    pub async fn find_by_status(
        &self,
        user_id: i32,
        status: InvoiceStatus,
        tag_ids: Vec<i32>,
    ) -> Result<Vec<InvoiceDetails>> {
        let filter = InvoiceFilter {
            status: Some(status),
            tag_ids,
        };

        let mut all = Vec::new();
        let mut page = Page::new(Some(1), Some(Page::MAX_LIMIT));
        loop {
            let (batch, total) = self.repo.list_invoices(user_id, &filter, page).await?;
            let done = batch.is_empty() || (all.len() + batch.len()) as u64 >= total;
            all.extend(batch);
            if done {
                return Ok(all);
            }
            page.page += 1;
        }
    }

    pub async fn processing_count(&self, user_id: i32) -> Result<u64> {
        Ok(self.repo.status_summary(user_id).await?.processing)
    }

    pub async fn status_summary(&self, user_id: i32) -> Result<StatusSummary> {
        self.repo.status_summary(user_id).await
    }

    /// Edit metadata and optionally replace the stored file.
    ///
    /// The status is never touched here. A new file is stored before the row
    /// points to it; the old file is deleted only once the row is updated.
    #[instrument(skip(self, input, file))]
    pub async fn update(
        &self,
        id: i32,
        user_id: i32,
        input: UpdateInvoiceInput,
        file: Option<UploadedFile>,
    ) -> Result<InvoiceDetails> {
        input.validate()?;
        let existing = self.find_one(id, user_id).await?;

        let date = input.date.as_deref().map(parse_invoice_date).transpose()?;
        let invoice_type = input
            .invoice_type
            .as_deref()
            .map(parse_invoice_type)
            .transpose()?;

        let new_locator = match file.filter(|f| !f.bytes.is_empty()) {
            Some(file) => {
                self.validate_file(&file)?;
                Some(self.store_file(user_id, file).await?)
            }
            None => None,
        };

        let update = InvoiceUpdate {
            name: input.name,
            date,
            invoice_type,
            tag_ids: input.tag_ids,
            file_path: new_locator.clone(),
        };

        let updated = self
            .repo
            .update_invoice(id, update)
            .await
            .and_then(|invoice| invoice.ok_or(AppError::InvoiceNotFound { id }));

        if let Err(e) = updated {
            if let Some(locator) = new_locator.as_deref() {
                self.discard_file(locator).await;
            }
            return Err(e);
        }

        if new_locator.is_some() {
            if let Some(old) = existing.invoice.file_path.as_deref() {
                self.discard_file(old).await;
            }
            info!("Invoice file replaced");
        }

        self.find_one(id, user_id).await
    }

    /// Delete the stored file, the analysis data, tag links and the invoice
    #[instrument(skip(self))]
    pub async fn remove(&self, id: i32, user_id: i32) -> Result<()> {
        let details = self.find_one(id, user_id).await?;

        if let Some(locator) = details.invoice.file_path.as_deref() {
            self.blobs.delete(locator).await?;
        }

        self.repo.delete_invoice(id).await?;
        info!("Invoice deleted");
        Ok(())
    }

    pub async fn create_tag(&self, new: NewTag) -> Result<Tag> {
        validate_tag_name(&new.name)?;
        self.repo.create_tag(new).await
    }

    pub async fn list_tags(&self, user_id: i32) -> Result<Vec<Tag>> {
        self.repo.list_tags(user_id).await
    }

    pub async fn find_tag(&self, id: i32, user_id: i32) -> Result<Tag> {
        self.repo
            .find_tag(id, user_id)
            .await?
            .ok_or(AppError::TagNotFound { id })
    }

    pub async fn update_tag(&self, id: i32, user_id: i32, update: TagUpdate) -> Result<Tag> {
        if let Some(name) = update.name.as_deref() {
            validate_tag_name(name)?;
        }
        self.repo
            .update_tag(id, user_id, update)
            .await?
            .ok_or(AppError::TagNotFound { id })
    }

    /// Tags with the number of invoices carrying each
    pub async fn tags_with_usage(&self, user_id: i32) -> Result<Vec<TagUsage>> {
        self.repo.tag_usage(user_id).await
    }

    pub async fn delete_tag(&self, id: i32, user_id: i32) -> Result<()> {
        if self.repo.delete_tag(id, user_id).await? {
            Ok(())
        } else {
            Err(AppError::TagNotFound { id })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invoiceflow_common::{
        db::InMemoryInvoiceRepository,
        queue::InMemoryPublisher,
        storage::InMemoryBlobStore,
    };

    struct Fixture {
        repo: Arc<InMemoryInvoiceRepository>,
        blobs: Arc<InMemoryBlobStore>,
        publisher: Arc<InMemoryPublisher>,
        service: InvoiceService,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryInvoiceRepository::new());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let publisher = Arc::new(InMemoryPublisher::new());
        let service = InvoiceService::new(repo.clone(), blobs.clone(), publisher.clone(), 1024);
        Fixture {
            repo,
            blobs,
            publisher,
            service,
        }
    }

    fn input() -> CreateInvoiceInput {
        CreateInvoiceInput {
            name: "Facture EDF".to_string(),
            date: Some("2024-03-01".to_string()),
            invoice_type: "RECEIVED".to_string(),
            tag_ids: vec![],
        }
    }

    fn pdf() -> UploadedFile {
        UploadedFile {
            file_name: "facture.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            bytes: b"%PDF-1.4 fake".to_vec(),
        }
    }

    #[test]
    fn test_parse_tag_ids() {
        assert_eq!(parse_tag_ids("[1, 2, 3]"), vec![1, 2, 3]);
        assert_eq!(parse_tag_ids(r#"["4", 5]"#), vec![4, 5]);
        assert_eq!(parse_tag_ids("1, x, 3"), vec![1, 3]);
        assert!(parse_tag_ids("").is_empty());
    }

    #[test]
    fn test_parse_invoice_date() {
        let date = parse_invoice_date("2024-03-01").unwrap();
        assert_eq!(date.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert!(parse_invoice_date("2024-03-01T10:00:00+01:00").is_ok());
        assert!(parse_invoice_date("01/03/2024").is_err());
    }

    #[tokio::test]
    async fn test_create_dispatches_and_returns_processing() {
        let f = fixture();

        let invoice = f.service.create_invoice(input(), 1, Some(pdf())).await.unwrap();
        assert_eq!(invoice.status, "PROCESSING");

        let stored = f.repo.find_invoice(invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "PROCESSING");
        assert_eq!(f.blobs.len().await, 1);

        let published = f.publisher.messages().await;
        assert_eq!(published.len(), 1);
        match &published[0] {
            Message::ProcessInvoice(msg) => {
                assert_eq!(msg.invoice_id, invoice.id);
                assert_eq!(msg.file_name, "facture.pdf");
                assert_eq!(msg.decode_content().unwrap(), b"%PDF-1.4 fake");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_without_file_persists_nothing() {
        let f = fixture();

        let err = f.service.create_invoice(input(), 1, None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { .. }));

        let empty = UploadedFile { bytes: vec![], ..pdf() };
        let err = f.service.create_invoice(input(), 1, Some(empty)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { .. }));

        assert!(f.blobs.is_empty().await);
        assert!(f.publisher.messages().await.is_empty());
        assert_eq!(f.repo.status_summary(1).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_create_rejects_disallowed_type_and_size() {
        let f = fixture();

        let zip = UploadedFile {
            content_type: "application/zip".to_string(),
            ..pdf()
        };
        let err = f.service.create_invoice(input(), 1, Some(zip)).await.unwrap_err();
        assert!(matches!(err, AppError::UnsupportedMediaType { .. }));

        let big = UploadedFile {
            bytes: vec![b'x'; 2048],
            ..pdf()
        };
        let err = f.service.create_invoice(input(), 1, Some(big)).await.unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge { size: 2048, limit: 1024 }));
    }

    #[tokio::test]
    async fn test_publish_failure_moves_invoice_to_error() {
        let f = fixture();
        f.publisher.set_failing(true);

        let invoice = f.service.create_invoice(input(), 1, Some(pdf())).await.unwrap();
        assert_eq!(invoice.status, "ERROR");

        let stored = f.repo.find_invoice(invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "ERROR");
    }

    #[tokio::test]
    async fn test_failed_insert_removes_stored_file() {
        let f = fixture();
        f.repo.set_fail_invoice_inserts(true);

        let err = f.service.create_invoice(input(), 1, Some(pdf())).await.unwrap_err();

        assert!(matches!(err, AppError::PersistenceFailed { .. }));
        assert!(f.blobs.is_empty().await);
        assert!(f.publisher.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_failure_moves_invoice_to_error() {
        let f = fixture();
        f.repo.fail_next_status_writes(1);

        let invoice = f.service.create_invoice(input(), 1, Some(pdf())).await.unwrap();
        assert_eq!(invoice.status, "ERROR");

        let stored = f.repo.find_invoice(invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "ERROR");
        assert!(f.publisher.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_replaces_stored_file() {
        let f = fixture();
        let invoice = f.service.create_invoice(input(), 1, Some(pdf())).await.unwrap();
        let old_path = invoice.file_path.clone().unwrap();

        let png = UploadedFile {
            file_name: "scan.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![0x89, 0x50, 0x4E, 0x47],
        };
        let updated = f
            .service
            .update(invoice.id, 1, UpdateInvoiceInput::default(), Some(png))
            .await
            .unwrap();

        let new_path = updated.invoice.file_path.unwrap();
        assert_ne!(new_path, old_path);
        assert!(new_path.ends_with(".png"));
        assert_eq!(f.blobs.len().await, 1);
        assert!(f.blobs.get(&old_path).await.is_none());
        assert_eq!(
            f.blobs.get(&new_path).await,
            Some((vec![0x89, 0x50, 0x4E, 0x47], "image/png".to_string()))
        );
        assert_eq!(updated.invoice.status, "PROCESSING");
    }

    #[tokio::test]
    async fn test_update_rejects_disallowed_file_and_keeps_old_one() {
        let f = fixture();
        let invoice = f.service.create_invoice(input(), 1, Some(pdf())).await.unwrap();

        let zip = UploadedFile {
            content_type: "application/zip".to_string(),
            ..pdf()
        };
        let err = f
            .service
            .update(invoice.id, 1, UpdateInvoiceInput::default(), Some(zip))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::UnsupportedMediaType { .. }));
        let stored = f.repo.find_invoice(invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.file_path, invoice.file_path);
        assert_eq!(f.blobs.len().await, 1);
    }

    #[tokio::test]
    async fn test_tag_update_and_usage() {
        let f = fixture();
        let tag = f
            .service
            .create_tag(NewTag { user_id: 1, name: "eau".into(), description: None, colors: None })
            .await
            .unwrap();
        f.service
            .create_invoice(CreateInvoiceInput { tag_ids: vec![tag.id], ..input() }, 1, Some(pdf()))
            .await
            .unwrap();

        let blank = TagUpdate {
            name: Some("  ".into()),
            ..Default::default()
        };
        assert!(matches!(
            f.service.update_tag(tag.id, 1, blank).await,
            Err(AppError::Validation { .. })
        ));

        let rename = TagUpdate {
            name: Some("Eau".into()),
            ..Default::default()
        };
        assert!(matches!(
            f.service.update_tag(tag.id, 2, rename.clone()).await,
            Err(AppError::TagNotFound { .. })
        ));
        assert_eq!(f.service.update_tag(tag.id, 1, rename).await.unwrap().name, "Eau");

        let usage = f.service.tags_with_usage(1).await.unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].usage_count, 1);
        assert_eq!(f.service.find_tag(tag.id, 1).await.unwrap().name, "Eau");
    }

    #[tokio::test]
    async fn test_apply_event_rejects_invalid_transition() {
        let f = fixture();
        let invoice = f.service.create_invoice(input(), 1, Some(pdf())).await.unwrap();

        let err = f
            .service
            .apply_event(invoice.id, WorkflowEvent::Dispatched)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));

        let err = f
            .service
            .apply_event(999, WorkflowEvent::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvoiceNotFound { id: 999 }));
    }

    #[tokio::test]
    async fn test_find_one_hides_other_users_invoices() {
        let f = fixture();
        let invoice = f.service.create_invoice(input(), 1, Some(pdf())).await.unwrap();

        assert!(f.service.find_one(invoice.id, 1).await.is_ok());
        assert!(matches!(
            f.service.find_one(invoice.id, 2).await,
            Err(AppError::InvoiceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_remove_deletes_blob_and_row() {
        let f = fixture();
        let invoice = f.service.create_invoice(input(), 1, Some(pdf())).await.unwrap();

        f.service.remove(invoice.id, 1).await.unwrap();

        assert!(f.blobs.is_empty().await);
        assert!(f.repo.find_invoice(invoice.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_keeps_status() {
        let f = fixture();
        let invoice = f.service.create_invoice(input(), 1, Some(pdf())).await.unwrap();

        let updated = f
            .service
            .update(
                invoice.id,
                1,
                UpdateInvoiceInput {
                    name: Some("Facture EDF mars".to_string()),
                    invoice_type: Some("issued".to_string()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(updated.invoice.name, "Facture EDF mars");
        assert_eq!(updated.invoice.invoice_type, "ISSUED");
        assert_eq!(updated.invoice.status, "PROCESSING");
    }

    #[tokio::test]
    async fn test_find_by_status_and_summary() {
        let f = fixture();
        f.service.create_invoice(input(), 1, Some(pdf())).await.unwrap();
        f.publisher.set_failing(true);
        f.service.create_invoice(input(), 1, Some(pdf())).await.unwrap();

        let processing = f
            .service
            .find_by_status(1, InvoiceStatus::Processing, vec![])
            .await
            .unwrap();
        assert_eq!(processing.len(), 1);

        let summary = f.service.status_summary(1).await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.processing, 1);
        assert_eq!(summary.error, 1);
        assert_eq!(f.service.processing_count(1).await.unwrap(), 1);
    }
}
