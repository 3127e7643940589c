//! Repository pattern for invoice persistence
//!
//! `InvoiceRepository` is the capability handed to the public API. Status
//! writes are compare-and-set on the previous status so a stale handler can
//! never overwrite a newer status.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::workflow::InvoiceStatus;
use async_trait::async_trait;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, Statement, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Invoice to create (always starts as UPLOADED)
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub user_id: i32,
    pub name: String,
    pub file_path: Option<String>,
    pub date: DateTimeWithTimeZone,
    pub invoice_type: InvoiceType,
    pub tag_ids: Vec<i32>,
}

/// Editable invoice fields; `None` leaves the field untouched
#[derive(Debug, Clone, Default)]
pub struct InvoiceUpdate {
    pub name: Option<String>,
    pub date: Option<DateTimeWithTimeZone>,
    pub invoice_type: Option<InvoiceType>,
    /// Replaces every tag link when present and non-empty
    pub tag_ids: Option<Vec<i32>>,
    /// Locator of a replacement file
    pub file_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewTag {
    pub user_id: i32,
    pub name: String,
    pub description: Option<String>,
    pub colors: Option<String>,
}

/// Editable tag fields; `None` leaves the field untouched
#[derive(Debug, Clone, Default)]
pub struct TagUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub colors: Option<String>,
}

/// Tag with the number of invoices linked to it
#[derive(Debug, Clone, PartialEq)]
pub struct TagUsage {
    pub tag: Tag,
    pub usage_count: u64,
}

/// Invoice with its analysis results and tags
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceDetails {
    pub invoice: Invoice,
    pub data: Vec<InvoiceData>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    /// Keep invoices carrying at least one of these tags
    pub tag_ids: Vec<i32>,
}

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u64,
    pub limit: u64,
}

impl Page {
    pub const MAX_LIMIT: u64 = 100;
    /// Pages past this one are always empty; keeps offsets well inside `u32`
    pub const MAX_PAGE: u64 = 1_000_000;

    pub fn new(page: Option<u64>, limit: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(1).clamp(1, Self::MAX_PAGE),
            limit: limit.unwrap_or(10).clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Invoice counts per status for one user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total: u64,
    pub uploaded: u64,
    pub processing: u64,
    pub completed: u64,
    pub error: u64,
}

impl StatusSummary {
    pub fn add(&mut self, status: InvoiceStatus, count: u64) {
        self.total += count;
        match status {
            InvoiceStatus::Uploaded => self.uploaded += count,
            InvoiceStatus::Processing => self.processing += count,
            InvoiceStatus::Completed => self.completed += count,
            InvoiceStatus::Error => self.error += count,
        }
    }
}

/// Persistence capability of the public API
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn ping(&self) -> Result<()>;

    /// Insert an UPLOADED invoice and link the caller's existing tags
    async fn create_invoice(&self, new: NewInvoice) -> Result<Invoice>;

    async fn find_invoice(&self, id: i32) -> Result<Option<Invoice>>;

    async fn invoice_details(&self, id: i32) -> Result<Option<InvoiceDetails>>;

    /// Newest first, with the total number of matching invoices
    async fn list_invoices(
        &self,
        user_id: i32,
        filter: &InvoiceFilter,
        page: Page,
    ) -> Result<(Vec<InvoiceDetails>, u64)>;

    async fn update_invoice(&self, id: i32, update: InvoiceUpdate) -> Result<Option<Invoice>>;

    /// Set `next` only if the stored status is still `expected`
    async fn compare_and_set_status(
        &self,
        id: i32,
        expected: InvoiceStatus,
        next: InvoiceStatus,
    ) -> Result<bool>;

    /// In one transaction: compare-and-set the status and insert the analysis result.
    /// Nothing is written when the status check fails.
    async fn attach_data(
        &self,
        id: i32,
        expected: InvoiceStatus,
        next: InvoiceStatus,
        content: String,
        amount: f64,
    ) -> Result<bool>;

    async fn status_summary(&self, user_id: i32) -> Result<StatusSummary>;

    /// Delete the invoice with its data and tag links
    async fn delete_invoice(&self, id: i32) -> Result<bool>;

    async fn create_tag(&self, new: NewTag) -> Result<Tag>;

    async fn list_tags(&self, user_id: i32) -> Result<Vec<Tag>>;

    /// Tag `id` if it belongs to `user_id`
    async fn find_tag(&self, id: i32, user_id: i32) -> Result<Option<Tag>>;

    async fn update_tag(&self, id: i32, user_id: i32, update: TagUpdate) -> Result<Option<Tag>>;

    /// Every tag of the user with its invoice count, in `list_tags` order
    async fn tag_usage(&self, user_id: i32) -> Result<Vec<TagUsage>>;

    async fn delete_tag(&self, id: i32, user_id: i32) -> Result<bool>;
}

/// Postgres-backed repository
#[derive(Clone)]
pub struct SeaOrmInvoiceRepository {
    pool: DbPool,
}

impl SeaOrmInvoiceRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }

    /// Tag ids from `requested` that exist and belong to `user_id`
    async fn owned_tag_ids<C: ConnectionTrait>(
        conn: &C,
        user_id: i32,
        requested: &[i32],
    ) -> Result<Vec<i32>> {
        if requested.is_empty() {
            return Ok(Vec::new());
        }

        let tags = TagEntity::find()
            .filter(TagColumn::UserId.eq(user_id))
            .filter(TagColumn::Id.is_in(requested.to_vec()))
            .all(conn)
            .await?;

        Ok(tags.into_iter().map(|t| t.id).collect())
    }

    async fn link_tags<C: ConnectionTrait>(
        conn: &C,
        invoice_id: i32,
        tag_ids: Vec<i32>,
    ) -> Result<()> {
        if tag_ids.is_empty() {
            return Ok(());
        }

        let links = tag_ids.into_iter().map(|tag_id| InvoiceTagActiveModel {
            invoice_id: Set(invoice_id),
            tag_id: Set(tag_id),
        });
        InvoiceTagEntity::insert_many(links).exec(conn).await?;
        Ok(())
    }

    /// Load data rows and tags for a batch of invoices, preserving order
    async fn with_details(&self, invoices: Vec<Invoice>) -> Result<Vec<InvoiceDetails>> {
        if invoices.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = invoices.iter().map(|i| i.id).collect();

        let data = InvoiceDataEntity::find()
            .filter(InvoiceDataColumn::InvoiceId.is_in(ids.clone()))
            .order_by_asc(InvoiceDataColumn::Id)
            .all(self.conn())
            .await?;

        let links = InvoiceTagEntity::find()
            .filter(InvoiceTagColumn::InvoiceId.is_in(ids))
            .all(self.conn())
            .await?;

        let tag_ids: Vec<i32> = links.iter().map(|l| l.tag_id).collect();
        let tags: HashMap<i32, Tag> = if tag_ids.is_empty() {
            HashMap::new()
        } else {
            TagEntity::find()
                .filter(TagColumn::Id.is_in(tag_ids))
                .all(self.conn())
                .await?
                .into_iter()
                .map(|t| (t.id, t))
                .collect()
        };

        let mut data_by_invoice: HashMap<i32, Vec<InvoiceData>> = HashMap::new();
        for row in data {
            data_by_invoice.entry(row.invoice_id).or_default().push(row);
        }

        let mut tags_by_invoice: HashMap<i32, Vec<Tag>> = HashMap::new();
        for link in links {
            if let Some(tag) = tags.get(&link.tag_id) {
                tags_by_invoice.entry(link.invoice_id).or_default().push(tag.clone());
            }
        }

        Ok(invoices
            .into_iter()
            .map(|invoice| InvoiceDetails {
                data: data_by_invoice.remove(&invoice.id).unwrap_or_default(),
                tags: tags_by_invoice.remove(&invoice.id).unwrap_or_default(),
                invoice,
            })
            .collect())
    }
}

#[async_trait]
impl InvoiceRepository for SeaOrmInvoiceRepository {
    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    async fn create_invoice(&self, new: NewInvoice) -> Result<Invoice> {
        let txn = self.conn().begin().await?;

        let invoice = InvoiceActiveModel {
            user_id: Set(new.user_id),
            name: Set(new.name),
            file_path: Set(new.file_path),
            created_at: Set(chrono::Utc::now().into()),
            date: Set(new.date),
            invoice_type: Set(new.invoice_type.as_str().to_string()),
            status: Set(InvoiceStatus::Uploaded.to_string()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let tag_ids = Self::owned_tag_ids(&txn, new.user_id, &new.tag_ids).await?;
        Self::link_tags(&txn, invoice.id, tag_ids).await?;

        txn.commit().await?;
        Ok(invoice)
    }

    async fn find_invoice(&self, id: i32) -> Result<Option<Invoice>> {
        InvoiceEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    async fn invoice_details(&self, id: i32) -> Result<Option<InvoiceDetails>> {
        let Some(invoice) = self.find_invoice(id).await? else {
            return Ok(None);
        };
        Ok(self.with_details(vec![invoice]).await?.pop())
    }

    async fn list_invoices(
        &self,
        user_id: i32,
        filter: &InvoiceFilter,
        page: Page,
    ) -> Result<(Vec<InvoiceDetails>, u64)> {
        let mut query = InvoiceEntity::find().filter(InvoiceColumn::UserId.eq(user_id));

        if let Some(status) = filter.status {
            query = query.filter(InvoiceColumn::Status.eq(status.as_str()));
        }

        if !filter.tag_ids.is_empty() {
            query = query.filter(
                InvoiceColumn::Id.in_subquery(
                    Query::select()
                        .column(InvoiceTagColumn::InvoiceId)
                        .from(InvoiceTagEntity)
                        .and_where(InvoiceTagColumn::TagId.is_in(filter.tag_ids.clone()))
                        .to_owned(),
                ),
            );
        }

        let paginator = query
            .order_by_desc(InvoiceColumn::CreatedAt)
            .order_by_desc(InvoiceColumn::Id)
            .paginate(self.conn(), page.limit);

        let total = paginator.num_items().await?;
        let invoices = paginator.fetch_page(page.page.saturating_sub(1)).await?;

        Ok((self.with_details(invoices).await?, total))
    }

    async fn update_invoice(&self, id: i32, update: InvoiceUpdate) -> Result<Option<Invoice>> {
        let txn = self.conn().begin().await?;

        let Some(existing) = InvoiceEntity::find_by_id(id).one(&txn).await? else {
            return Ok(None);
        };
        let user_id = existing.user_id;

        let mut invoice: InvoiceActiveModel = existing.into();
        if let Some(name) = update.name {
            invoice.name = Set(name);
        }
        if let Some(date) = update.date {
            invoice.date = Set(date);
        }
        if let Some(invoice_type) = update.invoice_type {
            invoice.invoice_type = Set(invoice_type.as_str().to_string());
        }
        if let Some(file_path) = update.file_path {
            invoice.file_path = Set(Some(file_path));
        }
        let invoice = invoice.update(&txn).await?;

        if let Some(tag_ids) = update.tag_ids.filter(|ids| !ids.is_empty()) {
            InvoiceTagEntity::delete_many()
                .filter(InvoiceTagColumn::InvoiceId.eq(id))
                .exec(&txn)
                .await?;
            let tag_ids = Self::owned_tag_ids(&txn, user_id, &tag_ids).await?;
            Self::link_tags(&txn, id, tag_ids).await?;
        }

        txn.commit().await?;
        Ok(Some(invoice))
    }

    async fn compare_and_set_status(
        &self,
        id: i32,
        expected: InvoiceStatus,
        next: InvoiceStatus,
    ) -> Result<bool> {
        let result = InvoiceEntity::update_many()
            .col_expr(InvoiceColumn::Status, Expr::value(next.as_str()))
            .filter(InvoiceColumn::Id.eq(id))
            .filter(InvoiceColumn::Status.eq(expected.as_str()))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected == 1)
    }

    async fn attach_data(
        &self,
        id: i32,
        expected: InvoiceStatus,
        next: InvoiceStatus,
        content: String,
        amount: f64,
    ) -> Result<bool> {
        let txn = self.conn().begin().await?;

        let result = InvoiceEntity::update_many()
            .col_expr(InvoiceColumn::Status, Expr::value(next.as_str()))
            .filter(InvoiceColumn::Id.eq(id))
            .filter(InvoiceColumn::Status.eq(expected.as_str()))
            .exec(&txn)
            .await?;

        if result.rows_affected != 1 {
            txn.rollback().await?;
            return Ok(false);
        }

        InvoiceDataActiveModel {
            content: Set(content),
            amount: Set(amount),
            invoice_id: Set(id),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::PersistenceFailed {
            message: format!("Failed to insert invoice data: {}", e),
        })?;

        txn.commit().await?;
        Ok(true)
    }

    async fn status_summary(&self, user_id: i32) -> Result<StatusSummary> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT status, COUNT(*) FROM invoices WHERE user_id = $1 GROUP BY status",
            vec![user_id.into()],
        );

        let mut summary = StatusSummary::default();
        for row in self.conn().query_all(stmt).await? {
            let status: String = row.try_get_by_index(0).map_err(DbErr::from)?;
            let count: i64 = row.try_get_by_index(1).map_err(DbErr::from)?;
            match status.parse::<InvoiceStatus>() {
                Ok(status) => summary.add(status, count.max(0) as u64),
                Err(e) => tracing::warn!(error = %e, "Skipping unknown status in summary"),
            }
        }

        Ok(summary)
    }

    async fn delete_invoice(&self, id: i32) -> Result<bool> {
        let txn = self.conn().begin().await?;

        InvoiceDataEntity::delete_many()
            .filter(InvoiceDataColumn::InvoiceId.eq(id))
            .exec(&txn)
            .await?;
        InvoiceTagEntity::delete_many()
            .filter(InvoiceTagColumn::InvoiceId.eq(id))
            .exec(&txn)
            .await?;
        let result = InvoiceEntity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;
        Ok(result.rows_affected > 0)
    }

    async fn create_tag(&self, new: NewTag) -> Result<Tag> {
        TagActiveModel {
            user_id: Set(new.user_id),
            name: Set(new.name),
            description: Set(new.description.unwrap_or_default()),
            colors: Set(new.colors.unwrap_or_else(|| DEFAULT_TAG_COLOR.to_string())),
            created_at: Set(chrono::Utc::now().into()),
            ..Default::default()
        }
        .insert(self.conn())
        .await
        .map_err(Into::into)
    }

    async fn list_tags(&self, user_id: i32) -> Result<Vec<Tag>> {
        TagEntity::find()
            .filter(TagColumn::UserId.eq(user_id))
            .order_by_asc(TagColumn::Name)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    async fn find_tag(&self, id: i32, user_id: i32) -> Result<Option<Tag>> {
        TagEntity::find_by_id(id)
            .filter(TagColumn::UserId.eq(user_id))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    async fn update_tag(&self, id: i32, user_id: i32, update: TagUpdate) -> Result<Option<Tag>> {
        let Some(existing) = self.find_tag(id, user_id).await? else {
            return Ok(None);
        };

        let mut tag: TagActiveModel = existing.into();
        if let Some(name) = update.name {
            tag.name = Set(name);
        }
        if let Some(description) = update.description {
            tag.description = Set(description);
        }
        if let Some(colors) = update.colors {
            tag.colors = Set(colors);
        }

        Ok(Some(tag.update(self.conn()).await?))
    }

    async fn tag_usage(&self, user_id: i32) -> Result<Vec<TagUsage>> {
        let tags = self.list_tags(user_id).await?;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT it.tag_id, COUNT(*) FROM invoice_tags it \
             JOIN tags t ON t.id = it.tag_id \
             WHERE t.user_id = $1 GROUP BY it.tag_id",
            vec![user_id.into()],
        );

        let mut counts: HashMap<i32, u64> = HashMap::new();
        for row in self.conn().query_all(stmt).await? {
            let tag_id: i32 = row.try_get_by_index(0)?;
            let count: i64 = row.try_get_by_index(1)?;
            counts.insert(tag_id, count.max(0) as u64);
        }

        Ok(tags
            .into_iter()
            .map(|tag| TagUsage {
                usage_count: counts.get(&tag.id).copied().unwrap_or(0),
                tag,
            })
            .collect())
    }

    async fn delete_tag(&self, id: i32, user_id: i32) -> Result<bool> {
        let txn = self.conn().begin().await?;

        let owned = TagEntity::find_by_id(id)
            .filter(TagColumn::UserId.eq(user_id))
            .one(&txn)
            .await?
            .is_some();
        if !owned {
            return Ok(false);
        }

        InvoiceTagEntity::delete_many()
            .filter(InvoiceTagColumn::TagId.eq(id))
            .exec(&txn)
            .await?;
        TagEntity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults_and_clamping() {
        assert_eq!(Page::default(), Page { page: 1, limit: 10 });
        assert_eq!(Page::new(Some(0), Some(0)), Page { page: 1, limit: 1 });
        assert_eq!(Page::new(Some(3), Some(500)).limit, Page::MAX_LIMIT);
        assert_eq!(Page::new(Some(3), Some(20)).offset(), 40);
    }

    #[test]
    fn test_huge_page_is_capped() {
        let page = Page::new(Some(u64::MAX), Some(Page::MAX_LIMIT));
        assert_eq!(page.page, Page::MAX_PAGE);
        assert_eq!(page.offset(), (Page::MAX_PAGE - 1) * Page::MAX_LIMIT);
        assert!(usize::try_from(page.offset()).is_ok());
    }

    #[test]
    fn test_total_pages() {
        let page = Page::new(None, Some(10));
        assert_eq!(page.total_pages(0), 0);
        assert_eq!(page.total_pages(10), 1);
        assert_eq!(page.total_pages(11), 2);
    }

    #[test]
    fn test_status_summary_add() {
        let mut summary = StatusSummary::default();
        summary.add(InvoiceStatus::Processing, 2);
        summary.add(InvoiceStatus::Error, 1);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.processing, 2);
        assert_eq!(summary.error, 1);
    }
}
