pub mod alarm_sync;
pub mod auth;
pub mod bootstrap;
pub mod commands;
pub mod control;
pub mod daemon;
pub mod dispatcher;
pub mod reporter;
