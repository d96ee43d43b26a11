//! Request and response DTOs

pub mod payments;
