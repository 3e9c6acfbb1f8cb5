pub mod models;
pub mod reconciler;
