pub mod envelope;
pub mod web_api;
