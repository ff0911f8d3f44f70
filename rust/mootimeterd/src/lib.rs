pub mod answers;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod ipc;
pub mod pages;
pub mod render;
pub mod sync;
pub mod templates;
pub mod tools;
