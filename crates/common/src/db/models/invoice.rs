//! Invoice entity

use crate::workflow::{InvoiceStatus, UnknownStatus};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of an invoice, stored as `ISSUED` / `RECEIVED`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvoiceType {
    Issued,
    Received,
}

impl InvoiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceType::Issued => "ISSUED",
            InvoiceType::Received => "RECEIVED",
        }
    }
}

impl fmt::Display for InvoiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ISSUED" => Ok(InvoiceType::Issued),
            "RECEIVED" => Ok(InvoiceType::Received),
            other => Err(format!("unknown invoice type: {}", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub user_id: i32,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    /// Blob locator (`s3://bucket/key`)
    #[sea_orm(column_type = "Text", nullable)]
    pub file_path: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    /// Date printed on the document
    pub date: DateTimeWithTimeZone,

    #[sea_orm(column_name = "type", column_type = "Text")]
    pub invoice_type: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,
}

impl Model {
    pub fn invoice_status(&self) -> Result<InvoiceStatus, UnknownStatus> {
        self.status.parse()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::invoice_data::Entity")]
    InvoiceData,

    #[sea_orm(has_many = "super::invoice_tag::Entity")]
    InvoiceTags,
}

impl Related<super::invoice_data::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InvoiceData.def()
    }
}

impl Related<super::invoice_tag::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InvoiceTags.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
