pub mod api;
pub mod config;
pub mod db;
pub mod sync;
pub mod utils;
