pub mod alarm_store;
pub mod browser;
pub mod config;
pub mod credential_store;
pub mod error;
pub mod event_mapper;
pub mod google_calendar_client;
pub mod http_retry;
pub mod logging;
pub mod notifier;
pub mod storage;
pub mod token_endpoint;
