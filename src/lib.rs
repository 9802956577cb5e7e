// Test-bench report configuration and evaluation service
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod presentation;
