//! In-memory `InvoiceRepository` for tests and local wiring

use super::models::*;
use super::repository::{
    InvoiceDetails, InvoiceFilter, InvoiceRepository, InvoiceUpdate, NewInvoice, NewTag, Page,
    StatusSummary, TagUpdate, TagUsage,
};
use crate::errors::{AppError, Result};
use crate::workflow::InvoiceStatus;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    invoices: BTreeMap<i32, Invoice>,
    data: Vec<InvoiceData>,
    tags: BTreeMap<i32, Tag>,
    /// (invoice_id, tag_id)
    links: BTreeSet<(i32, i32)>,
    next_invoice_id: i32,
    next_data_id: i32,
    next_tag_id: i32,
}

impl State {
    fn details(&self, invoice: &Invoice) -> InvoiceDetails {
        InvoiceDetails {
            invoice: invoice.clone(),
            data: self
                .data
                .iter()
                .filter(|d| d.invoice_id == invoice.id)
                .cloned()
                .collect(),
            tags: self
                .links
                .iter()
                .filter(|(invoice_id, _)| *invoice_id == invoice.id)
                .filter_map(|(_, tag_id)| self.tags.get(tag_id).cloned())
                .collect(),
        }
    }

    fn link_owned_tags(&mut self, invoice_id: i32, user_id: i32, tag_ids: &[i32]) {
        for tag_id in tag_ids {
            if self.tags.get(tag_id).is_some_and(|t| t.user_id == user_id) {
                self.links.insert((invoice_id, *tag_id));
            }
        }
    }
}

#[derive(Default)]
pub struct InMemoryInvoiceRepository {
    state: RwLock<State>,
    fail_data_writes: AtomicBool,
    fail_invoice_inserts: AtomicBool,
    failing_status_writes: AtomicUsize,
    conflicting_attaches: AtomicBool,
}

fn rejected(what: &str) -> AppError {
    AppError::PersistenceFailed {
        message: format!("{} rejected", what),
    }
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `create_invoice` fail as if the insert was rejected
    pub fn set_fail_invoice_inserts(&self, fail: bool) {
        self.fail_invoice_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make the next `count` status writes fail
    pub fn fail_next_status_writes(&self, count: usize) {
        self.failing_status_writes.store(count, Ordering::SeqCst);
    }

    /// Make `attach_data` lose its status check as if another writer got there first
    pub fn set_conflicting_attaches(&self, conflict: bool) {
        self.conflicting_attaches.store(conflict, Ordering::SeqCst);
    }

    fn take_status_write_failure(&self) -> bool {
        self.failing_status_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Make `attach_data` fail as if the database rejected the write
    pub fn set_fail_data_writes(&self, fail: bool) {
        self.fail_data_writes.store(fail, Ordering::SeqCst);
    }

    /// Every data row stored for an invoice
    pub async fn data_for(&self, invoice_id: i32) -> Vec<InvoiceData> {
        self.state
            .read()
            .await
            .data
            .iter()
            .filter(|d| d.invoice_id == invoice_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryInvoiceRepository {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn create_invoice(&self, new: NewInvoice) -> Result<Invoice> {
        if self.fail_invoice_inserts.load(Ordering::SeqCst) {
            return Err(rejected("invoice insert"));
        }

        let mut state = self.state.write().await;
        state.next_invoice_id += 1;

        let invoice = Invoice {
            id: state.next_invoice_id,
            user_id: new.user_id,
            name: new.name,
            file_path: new.file_path,
            created_at: chrono::Utc::now().into(),
            date: new.date,
            invoice_type: new.invoice_type.as_str().to_string(),
            status: InvoiceStatus::Uploaded.to_string(),
        };

        state.invoices.insert(invoice.id, invoice.clone());
        state.link_owned_tags(invoice.id, new.user_id, &new.tag_ids);
        Ok(invoice)
    }

    async fn find_invoice(&self, id: i32) -> Result<Option<Invoice>> {
        Ok(self.state.read().await.invoices.get(&id).cloned())
    }

    async fn invoice_details(&self, id: i32) -> Result<Option<InvoiceDetails>> {
        let state = self.state.read().await;
        Ok(state.invoices.get(&id).map(|invoice| state.details(invoice)))
    }

    async fn list_invoices(
        &self,
        user_id: i32,
        filter: &InvoiceFilter,
        page: Page,
    ) -> Result<(Vec<InvoiceDetails>, u64)> {
        let state = self.state.read().await;

        let mut matching: Vec<&Invoice> = state
            .invoices
            .values()
            .filter(|i| i.user_id == user_id)
            .filter(|i| filter.status.is_none_or(|s| i.status == s.as_str()))
            .filter(|i| {
                filter.tag_ids.is_empty()
                    || filter
                        .tag_ids
                        .iter()
                        .any(|tag_id| state.links.contains(&(i.id, *tag_id)))
            })
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = matching.len() as u64;

        let items = matching
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit).unwrap_or(usize::MAX))
            .map(|invoice| state.details(invoice))
            .collect();

        Ok((items, total))
    }

    async fn update_invoice(&self, id: i32, update: InvoiceUpdate) -> Result<Option<Invoice>> {
        let mut state = self.state.write().await;

        let Some(invoice) = state.invoices.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = update.name {
            invoice.name = name;
        }
        if let Some(date) = update.date {
            invoice.date = date;
        }
        if let Some(invoice_type) = update.invoice_type {
            invoice.invoice_type = invoice_type.as_str().to_string();
        }
        if let Some(file_path) = update.file_path {
            invoice.file_path = Some(file_path);
        }
        let invoice = invoice.clone();

        if let Some(tag_ids) = update.tag_ids.filter(|ids| !ids.is_empty()) {
            state.links.retain(|(invoice_id, _)| *invoice_id != id);
            state.link_owned_tags(id, invoice.user_id, &tag_ids);
        }

        Ok(Some(invoice))
    }

    async fn compare_and_set_status(
        &self,
        id: i32,
        expected: InvoiceStatus,
        next: InvoiceStatus,
    ) -> Result<bool> {
        if self.take_status_write_failure() {
            return Err(rejected("status update"));
        }

        let mut state = self.state.write().await;
        match state.invoices.get_mut(&id) {
            Some(invoice) if invoice.status == expected.as_str() => {
                invoice.status = next.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn attach_data(
        &self,
        id: i32,
        expected: InvoiceStatus,
        next: InvoiceStatus,
        content: String,
        amount: f64,
    ) -> Result<bool> {
        if self.fail_data_writes.load(Ordering::SeqCst) {
            return Err(rejected("invoice_data insert"));
        }
        if self.conflicting_attaches.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let mut state = self.state.write().await;
        match state.invoices.get_mut(&id) {
            Some(invoice) if invoice.status == expected.as_str() => {
                invoice.status = next.to_string();
            }
            _ => return Ok(false),
        }

        state.next_data_id += 1;
        let row = InvoiceData {
            id: state.next_data_id,
            content,
            amount,
            invoice_id: id,
        };
        state.data.push(row);
        Ok(true)
    }

    async fn status_summary(&self, user_id: i32) -> Result<StatusSummary> {
        let state = self.state.read().await;
        let mut summary = StatusSummary::default();

        for invoice in state.invoices.values().filter(|i| i.user_id == user_id) {
            if let Ok(status) = invoice.invoice_status() {
                summary.add(status, 1);
            }
        }

        Ok(summary)
    }

    async fn delete_invoice(&self, id: i32) -> Result<bool> {
        let mut state = self.state.write().await;
        state.data.retain(|d| d.invoice_id != id);
        state.links.retain(|(invoice_id, _)| *invoice_id != id);
        Ok(state.invoices.remove(&id).is_some())
    }

    async fn create_tag(&self, new: NewTag) -> Result<Tag> {
        let mut state = self.state.write().await;
        state.next_tag_id += 1;

        let tag = Tag {
            id: state.next_tag_id,
            user_id: new.user_id,
            name: new.name,
            description: new.description.unwrap_or_default(),
            colors: new.colors.unwrap_or_else(|| DEFAULT_TAG_COLOR.to_string()),
            created_at: chrono::Utc::now().into(),
        };

        state.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    async fn list_tags(&self, user_id: i32) -> Result<Vec<Tag>> {
        let state = self.state.read().await;
        let mut tags: Vec<Tag> = state
            .tags
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn find_tag(&self, id: i32, user_id: i32) -> Result<Option<Tag>> {
        Ok(self
            .state
            .read()
            .await
            .tags
            .get(&id)
            .filter(|t| t.user_id == user_id)
            .cloned())
    }

    async fn update_tag(&self, id: i32, user_id: i32, update: TagUpdate) -> Result<Option<Tag>> {
        let mut state = self.state.write().await;
        let Some(tag) = state.tags.get_mut(&id).filter(|t| t.user_id == user_id) else {
            return Ok(None);
        };

        if let Some(name) = update.name {
            tag.name = name;
        }
        if let Some(description) = update.description {
            tag.description = description;
        }
        if let Some(colors) = update.colors {
            tag.colors = colors;
        }
        Ok(Some(tag.clone()))
    }

    async fn tag_usage(&self, user_id: i32) -> Result<Vec<TagUsage>> {
        let tags = self.list_tags(user_id).await?;
        let state = self.state.read().await;

        Ok(tags
            .into_iter()
            .map(|tag| TagUsage {
                usage_count: state.links.iter().filter(|(_, t)| *t == tag.id).count() as u64,
                tag,
            })
            .collect())
    }

    async fn delete_tag(&self, id: i32, user_id: i32) -> Result<bool> {
        let mut state = self.state.write().await;
        if !state.tags.get(&id).is_some_and(|t| t.user_id == user_id) {
            return Ok(false);
        }
        state.links.retain(|(_, tag_id)| *tag_id != id);
        state.tags.remove(&id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_invoice(user_id: i32, tag_ids: Vec<i32>) -> NewInvoice {
        NewInvoice {
            user_id,
            name: "Facture EDF".to_string(),
            file_path: Some("s3://memory/invoices/1/a.pdf".to_string()),
            date: chrono::Utc::now().into(),
            invoice_type: InvoiceType::Received,
            tag_ids,
        }
    }

    #[tokio::test]
    async fn test_create_starts_uploaded_and_links_owned_tags_only() {
        let repo = InMemoryInvoiceRepository::new();
        let mine = repo
            .create_tag(NewTag { user_id: 1, name: "energie".into(), description: None, colors: None })
            .await
            .unwrap();
        let theirs = repo
            .create_tag(NewTag { user_id: 2, name: "autre".into(), description: None, colors: None })
            .await
            .unwrap();

        let invoice = repo
            .create_invoice(new_invoice(1, vec![mine.id, theirs.id, 999]))
            .await
            .unwrap();
        assert_eq!(invoice.status, "UPLOADED");

        let details = repo.invoice_details(invoice.id).await.unwrap().unwrap();
        assert_eq!(details.tags, vec![mine.clone()]);
        assert_eq!(mine.colors, DEFAULT_TAG_COLOR);
    }

    #[tokio::test]
    async fn test_compare_and_set_rejects_stale_expectation() {
        let repo = InMemoryInvoiceRepository::new();
        let invoice = repo.create_invoice(new_invoice(1, vec![])).await.unwrap();

        assert!(repo
            .compare_and_set_status(invoice.id, InvoiceStatus::Uploaded, InvoiceStatus::Processing)
            .await
            .unwrap());
        assert!(!repo
            .compare_and_set_status(invoice.id, InvoiceStatus::Uploaded, InvoiceStatus::Error)
            .await
            .unwrap());

        let stored = repo.find_invoice(invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "PROCESSING");
    }

    #[tokio::test]
    async fn test_attach_data_writes_nothing_on_status_mismatch() {
        let repo = InMemoryInvoiceRepository::new();
        let invoice = repo.create_invoice(new_invoice(1, vec![])).await.unwrap();

        let attached = repo
            .attach_data(
                invoice.id,
                InvoiceStatus::Processing,
                InvoiceStatus::Completed,
                "x".into(),
                1.0,
            )
            .await
            .unwrap();

        assert!(!attached);
        assert!(repo.data_for(invoice.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_and_paginates_newest_first() {
        let repo = InMemoryInvoiceRepository::new();
        let tag = repo
            .create_tag(NewTag { user_id: 1, name: "t".into(), description: None, colors: None })
            .await
            .unwrap();

        let first = repo.create_invoice(new_invoice(1, vec![tag.id])).await.unwrap();
        let second = repo.create_invoice(new_invoice(1, vec![])).await.unwrap();
        repo.create_invoice(new_invoice(2, vec![])).await.unwrap();

        let (items, total) = repo
            .list_invoices(1, &InvoiceFilter::default(), Page::new(Some(1), Some(1)))
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(items[0].invoice.id, second.id);

        let filter = InvoiceFilter { status: None, tag_ids: vec![tag.id] };
        let (items, total) = repo.list_invoices(1, &filter, Page::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].invoice.id, first.id);

        let filter = InvoiceFilter { status: Some(InvoiceStatus::Completed), tag_ids: vec![] };
        let (_, total) = repo.list_invoices(1, &filter, Page::default()).await.unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_tag_update_is_owner_scoped() {
        let repo = InMemoryInvoiceRepository::new();
        let tag = repo
            .create_tag(NewTag { user_id: 1, name: "eau".into(), description: None, colors: None })
            .await
            .unwrap();

        let update = TagUpdate {
            colors: Some("#10B981".into()),
            ..Default::default()
        };
        assert!(repo.update_tag(tag.id, 2, update.clone()).await.unwrap().is_none());

        let updated = repo.update_tag(tag.id, 1, update).await.unwrap().unwrap();
        assert_eq!(updated.name, "eau");
        assert_eq!(updated.colors, "#10B981");
        assert_eq!(repo.find_tag(tag.id, 1).await.unwrap(), Some(updated));
        assert!(repo.find_tag(tag.id, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tag_usage_counts_links() {
        let repo = InMemoryInvoiceRepository::new();
        let used = repo
            .create_tag(NewTag { user_id: 1, name: "a".into(), description: None, colors: None })
            .await
            .unwrap();
        let unused = repo
            .create_tag(NewTag { user_id: 1, name: "b".into(), description: None, colors: None })
            .await
            .unwrap();
        repo.create_invoice(new_invoice(1, vec![used.id])).await.unwrap();
        repo.create_invoice(new_invoice(1, vec![used.id])).await.unwrap();

        let usage = repo.tag_usage(1).await.unwrap();
        assert_eq!(
            usage,
            vec![
                TagUsage { tag: used, usage_count: 2 },
                TagUsage { tag: unused, usage_count: 0 },
            ]
        );
    }

    #[tokio::test]
    async fn test_status_write_failures_are_one_shot() {
        let repo = InMemoryInvoiceRepository::new();
        let invoice = repo.create_invoice(new_invoice(1, vec![])).await.unwrap();
        repo.fail_next_status_writes(1);

        let err = repo
            .compare_and_set_status(invoice.id, InvoiceStatus::Uploaded, InvoiceStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PersistenceFailed { .. }));
        assert!(repo
            .compare_and_set_status(invoice.id, InvoiceStatus::Uploaded, InvoiceStatus::Processing)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let repo = InMemoryInvoiceRepository::new();
        let invoice = repo.create_invoice(new_invoice(1, vec![])).await.unwrap();
        repo.compare_and_set_status(invoice.id, InvoiceStatus::Uploaded, InvoiceStatus::Processing)
            .await
            .unwrap();
        repo.attach_data(invoice.id, InvoiceStatus::Processing, InvoiceStatus::Completed, "x".into(), 2.0)
            .await
            .unwrap();

        assert!(repo.delete_invoice(invoice.id).await.unwrap());
        assert!(repo.data_for(invoice.id).await.is_empty());
        assert!(!repo.delete_invoice(invoice.id).await.unwrap());
    }
}
