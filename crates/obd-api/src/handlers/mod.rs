//! HTTP request handlers

pub mod link;
pub mod metrics;
pub mod mil;
pub mod streams;
