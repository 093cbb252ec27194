pub mod app;
pub mod catalog;
pub mod config;
pub mod crawler;
pub mod domain;
pub mod error;
pub mod feed;
pub mod fingerprint;
pub mod layout;
pub mod logging;
pub mod output;
pub mod retention;
pub mod store;
pub mod tags;
