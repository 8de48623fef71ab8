pub mod behaviour;
pub mod types;
