//! HTTP request handlers for the API service.

pub mod health;
pub mod metrics;
pub mod public;
pub mod secrets;

pub use health::health_check;
pub use metrics::metrics_handler;
pub use public::public_greeting;
pub use secrets::get_secrets;
