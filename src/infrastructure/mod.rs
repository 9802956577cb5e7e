// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod csv_loader;
pub mod json_report_writer;
pub mod memory_repository;
