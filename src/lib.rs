//! Brand Mission API Library
//!
//! Backend for the brand-strategy mission funnel: brand records, login,
//! payment checkout and webhook reconciliation, and LLM copy generation.
//!
//! # Modules
//!
//! - `api`: HTTP-facing namespace.
//! - `core`: Domain namespace.
//! - `integrations`: External provider namespace.
//! - `auth`: Password hashing, registration and login gate.
//! - `config`: Configuration management.
//! - `db`: Database connection and schema.
//! - `db_storage`: Brand record store (Postgres or in-memory).
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers and shared state.
//! - `llm_client`: Chat completions client.
//! - `metadata`: Onboarding metadata blob.
//! - `missions`: Copy-generation stages.
//! - `models`: Brand record and request/response models.
//! - `payment_client`: Payment provider client.
//! - `payment_models`: Product catalog and payment resources.
//! - `routes`: Router assembly.
//! - `unlock`: Mission-unlock reconciliation.
//! - `webhook_handler`: Payment webhook handler.
//! - `webhook_models`: Notification and signature models.

pub mod api;
pub mod core;
pub mod integrations;

pub mod auth;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod handlers;
pub mod llm_client;
pub mod metadata;
pub mod missions;
pub mod models;
pub mod payment_client;
pub mod payment_models;
pub mod routes;
pub mod unlock;
pub mod webhook_handler;
pub mod webhook_models;
