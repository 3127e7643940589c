//! API handlers module

pub mod health;
pub mod invoices;
pub mod tags;
