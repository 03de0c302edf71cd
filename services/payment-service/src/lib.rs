pub mod config;
pub mod consumer;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod service;

pub use service::PaymentExecutor;

/// `{amount/100:.2f}`-equivalent precomputed at the producer boundary, avoiding
/// a template-expression evaluator downstream.
pub fn format_minor_units(amount: i64) -> String {
    format!("{}.{:02}", amount / 100, amount.abs() % 100)
}
