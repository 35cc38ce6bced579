//! Founder Backend Probes Library
//!
//! Shared plumbing for the diagnostic and repair scripts under `src/bin/`. Each script
//! talks to the hosted backend (auth, tables, row-level security, storage) and prints
//! pass/fail lines for the operator.
//!
//! # Modules
//!
//! - `core`: Probe logic, models and errors.
//! - `data`: Schema constants and direct Postgres access.
//! - `integrations`: Backend API clients.
//! - `obs`: Logging setup.
//! - `auth_client`: Auth service client (sign-up, sign-in, admin users).
//! - `client`: Backend client factory (anonymous, service role, signed-in user).
//! - `config`: Configuration management.
//! - `credentials`: Positional email/password arguments.
//! - `db`: Direct Postgres connection for schema inspection.
//! - `errors`: Error handling types.
//! - `fixtures`: Test users and rows, with best-effort cleanup.
//! - `models`: Typed rows and auth payloads.
//! - `polling`: Sleep-and-recheck loops for eventual consistency.
//! - `probe`: Row-level-security probe cases and reports.
//! - `report`: Console status lines.
//! - `rest_client`: Tables API query builder and RPC.
//! - `schema`: The pinned table and column names.
//! - `storage_client`: Object storage client.

pub mod core;
pub mod data;
pub mod integrations;
pub mod obs;

pub mod auth_client;
pub mod client;
pub mod config;
pub mod credentials;
pub mod db;
pub mod errors;
pub mod fixtures;
pub mod models;
pub mod polling;
pub mod probe;
pub mod report;
pub mod rest_client;
pub mod schema;
pub mod storage_client;
