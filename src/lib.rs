pub mod analytics;
pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod links;
pub mod models;
pub mod redirect;
pub mod shortcode;
pub mod storage;
