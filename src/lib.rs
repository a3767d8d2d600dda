pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod models;
pub mod notifier;
pub mod repository;
pub mod services;
pub mod state;
