pub mod auth;
pub mod compactor;
pub mod config;
pub mod console;
pub mod engine;
pub mod index;
pub mod limits;
pub mod model;
pub mod observability;
pub mod wal;
