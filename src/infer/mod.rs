pub mod broker;
pub mod cache;
pub mod evaluator;
