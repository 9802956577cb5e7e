// Domain layer - Pure data types and wizard transitions
pub mod channel;
pub mod condition;
pub mod defaults;
pub mod evaluation;
pub mod report_config;
pub mod session;
