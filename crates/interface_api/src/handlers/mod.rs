//! Request handlers

pub mod catalog;
pub mod health;
pub mod payments;
pub mod transactions;
pub mod webhooks;
