pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod entities;
pub mod error;
pub mod external;
pub mod geo;
pub mod route;
pub mod server;
pub mod sweeper;
