pub mod aggregate;
pub mod chart;
pub mod error;
pub mod export;
pub mod models;
pub mod reference;
pub mod selection;
pub mod service;
