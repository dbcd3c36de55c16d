// src/lib.rs

pub mod db;
pub mod crypto;
pub mod repositories;
pub mod qr;
pub mod services;
pub mod web;
pub mod test_utils;

pub use db::Database;
pub use ecobin_common::error::Error;
pub use ecobin_common::models;
