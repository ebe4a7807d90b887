pub mod analytics_service;
pub mod catalog_service;
pub mod holdings_store;
pub mod valuation_service;
