pub mod analytics;
pub mod asset;
pub mod catalog;
pub mod holding;
pub mod portfolio;
pub mod settings;
