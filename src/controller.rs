pub mod server_controller;
