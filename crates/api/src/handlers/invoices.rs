//! Invoice handlers

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::handlers::tags::TagResponse;
use crate::service::{parse_tag_ids, CreateInvoiceInput, UpdateInvoiceInput, UploadedFile};
use crate::AppState;
use invoiceflow_common::{
    auth::AuthContext,
    db::{
        models::{Invoice, InvoiceData},
        InvoiceDetails, Page, StatusSummary,
    },
    errors::{AppError, Result},
    InvoiceStatus,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDataResponse {
    pub id: i32,
    pub content: String,
    pub amount: f64,
    pub invoice_id: i32,
}

impl From<InvoiceData> for InvoiceDataResponse {
    fn from(data: InvoiceData) -> Self {
        Self {
            id: data.id,
            content: data.content,
            amount: data.amount,
            invoice_id: data.invoice_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceResponse {
    pub id: i32,
    pub user_id: i32,
    pub name: String,
    pub file_path: Option<String>,
    pub created_at: String,
    pub date: String,
    #[serde(rename = "type")]
    pub invoice_type: String,
    pub status: String,
    pub invoice_data: Vec<InvoiceDataResponse>,
    pub tags: Vec<TagResponse>,
}

impl From<Invoice> for InvoiceResponse {
    fn from(invoice: Invoice) -> Self {
        Self {
            id: invoice.id,
            user_id: invoice.user_id,
            name: invoice.name,
            file_path: invoice.file_path,
            created_at: invoice.created_at.to_rfc3339(),
            date: invoice.date.to_rfc3339(),
            invoice_type: invoice.invoice_type,
            status: invoice.status,
            invoice_data: Vec::new(),
            tags: Vec::new(),
        }
    }
}

impl From<InvoiceDetails> for InvoiceResponse {
    fn from(details: InvoiceDetails) -> Self {
        Self {
            invoice_data: details.data.into_iter().map(Into::into).collect(),
            tags: details.tags.into_iter().map(Into::into).collect(),
            ..InvoiceResponse::from(details.invoice)
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedInvoiceResponse {
    pub invoices: Vec<InvoiceResponse>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingCountResponse {
    pub count: u64,
    pub has_processing: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    /// JSON array or comma separated ids
    #[serde(rename = "tagIds")]
    pub tag_ids: Option<String>,
}

impl ListQuery {
    fn tag_ids(&self) -> Vec<i32> {
        self.tag_ids.as_deref().map(parse_tag_ids).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInvoiceRequest {
    pub name: Option<String>,
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub invoice_type: Option<String>,
    pub tag_ids: Option<Vec<i32>>,
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::InvalidInput {
        message: format!("Malformed multipart body: {}", e),
    }
}

/// Fields of an invoice multipart form
#[derive(Debug, Default)]
struct InvoiceForm {
    file: Option<UploadedFile>,
    name: Option<String>,
    date: Option<String>,
    invoice_type: Option<String>,
    tag_ids: Option<Vec<i32>>,
}

impl InvoiceForm {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let field_name = field.name().unwrap_or_default().to_string();
            match field_name.as_str() {
                "file" => {
                    let file_name = field.file_name().unwrap_or("upload").to_string();
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let bytes = field.bytes().await.map_err(multipart_error)?;
                    form.file = Some(UploadedFile {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                "name" => form.name = Some(field.text().await.map_err(multipart_error)?),
                "date" => form.date = Some(field.text().await.map_err(multipart_error)?),
                "type" => form.invoice_type = Some(field.text().await.map_err(multipart_error)?),
                "tagIds" => {
                    let raw = field.text().await.map_err(multipart_error)?;
                    form.tag_ids = Some(parse_tag_ids(&raw));
                }
                other => tracing::debug!(field = other, "Ignoring unknown multipart field"),
            }
        }

        Ok(form)
    }
}

/// Upload an invoice file (multipart: `file`, `name`, `date`, `type`, `tagIds`)
pub async fn create_invoice(
    State(state): State<AppState>,
    auth: AuthContext,
    multipart: Multipart,
) -> Result<(StatusCode, Json<InvoiceResponse>)> {
    let form = InvoiceForm::read(multipart).await?;
    let file = form.file;

    let input = CreateInvoiceInput {
        name: form.name.unwrap_or_default(),
        date: form.date,
        invoice_type: form.invoice_type.unwrap_or_default(),
        tag_ids: form.tag_ids.unwrap_or_default(),
    };

    let invoice = state
        .service
        .create_invoice(input, auth.user_id, file)
        .await?;

    tracing::info!(
        invoice_id = invoice.id,
        user_id = auth.user_id,
        status = %invoice.status,
        "Invoice created"
    );

    let details = state.service.find_one(invoice.id, auth.user_id).await?;
    let mut response = InvoiceResponse::from(details);
    // The stored status may already have moved on; report the one the upload ended with
    response.status = invoice.status;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Paginated list, newest first
pub async fn list_invoices(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<PaginatedInvoiceResponse>> {
    let page = Page::new(query.page, query.limit);
    let result = state
        .service
        .find_all(auth.user_id, page, query.tag_ids())
        .await?;

    Ok(Json(PaginatedInvoiceResponse {
        total_pages: result.total_pages(),
        total: result.total,
        page: result.page.page,
        limit: result.page.limit,
        invoices: result.invoices.into_iter().map(Into::into).collect(),
    }))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<i32>,
) -> Result<Json<InvoiceResponse>> {
    let details = state.service.find_one(id, auth.user_id).await?;
    Ok(Json(details.into()))
}

pub async fn update_invoice(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<i32>,
    Json(request): Json<UpdateInvoiceRequest>,
) -> Result<Json<InvoiceResponse>> {
    let input = UpdateInvoiceInput {
        name: request.name,
        date: request.date,
        invoice_type: request.invoice_type,
        tag_ids: request.tag_ids,
    };

    let details = state.service.update(id, auth.user_id, input, None).await?;
    Ok(Json(details.into()))
}

/// Multipart update; a `file` part replaces the stored invoice file
pub async fn replace_invoice(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> Result<Json<InvoiceResponse>> {
    let form = InvoiceForm::read(multipart).await?;
    let replaces_file = form.file.as_ref().is_some_and(|f| !f.bytes.is_empty());

    let input = UpdateInvoiceInput {
        name: form.name,
        date: form.date.filter(|d| !d.trim().is_empty()),
        invoice_type: form.invoice_type,
        tag_ids: form.tag_ids,
    };

    let details = state
        .service
        .update(id, auth.user_id, input, form.file)
        .await?;

    tracing::info!(invoice_id = id, user_id = auth.user_id, replaces_file, "Invoice updated");

    Ok(Json(details.into()))
}

pub async fn invoices_by_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(status): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<InvoiceResponse>>> {
    let status: InvoiceStatus = status.parse().map_err(|e| AppError::Validation {
        message: format!("{}", e),
        field: Some("status".to_string()),
    })?;

    let invoices = state
        .service
        .find_by_status(auth.user_id, status, query.tag_ids())
        .await?;

    Ok(Json(invoices.into_iter().map(Into::into).collect()))
}

pub async fn processing_count(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ProcessingCountResponse>> {
    let count = state.service.processing_count(auth.user_id).await?;
    Ok(Json(ProcessingCountResponse {
        count,
        has_processing: count > 0,
    }))
}

pub async fn status_summary(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<StatusSummary>> {
    Ok(Json(state.service.status_summary(auth.user_id).await?))
}

pub async fn delete_invoice(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<i32>,
) -> Result<Json<DeleteResponse>> {
    state.service.remove(id, auth.user_id).await?;

    tracing::info!(invoice_id = id, user_id = auth.user_id, "Invoice deleted");

    Ok(Json(DeleteResponse {
        success: true,
        message: "Invoice deleted successfully".to_string(),
    }))
}
