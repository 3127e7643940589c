//! SeaORM entity models
//!
//! Database entities for InvoiceFlow

mod invoice;
mod invoice_data;
mod invoice_tag;
mod tag;

pub use invoice::{
    ActiveModel as InvoiceActiveModel,
    Column as InvoiceColumn,
    Entity as InvoiceEntity,
    InvoiceType,
    Model as Invoice,
};

pub use invoice_data::{
    ActiveModel as InvoiceDataActiveModel,
    Column as InvoiceDataColumn,
    Entity as InvoiceDataEntity,
    Model as InvoiceData,
};

pub use tag::{
    ActiveModel as TagActiveModel,
    Column as TagColumn,
    Entity as TagEntity,
    Model as Tag,
    DEFAULT_TAG_COLOR,
};

pub use invoice_tag::{
    ActiveModel as InvoiceTagActiveModel,
    Column as InvoiceTagColumn,
    Entity as InvoiceTagEntity,
    Model as InvoiceTag,
};
