pub mod config;
pub mod progression;
pub mod questions;
pub mod shared;
pub mod store;
