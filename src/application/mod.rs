// Application layer - Use cases and the seams to external collaborators
pub mod channel_repository;
pub mod condition_evaluator;
pub mod config_dialogue;
pub mod evaluation_engine;
pub mod functional_calc;
pub mod nl_parser;
pub mod report_service;
pub mod report_writer;
pub mod session_store;
pub mod statistics;
pub mod steady_state;
