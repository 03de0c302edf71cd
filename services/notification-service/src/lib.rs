pub mod config;
pub mod consumer;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod senders;
pub mod service;
pub mod templates;

pub use config::Config;
pub use consumer::NotificationEventsConsumer;
pub use senders::SenderRegistry;
pub use service::NotificationService;
