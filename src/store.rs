pub mod capture_store;
pub mod captured_message;
