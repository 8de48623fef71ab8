//! # mailsink
//!
//! Core of a disposable mail-capture server: developers point their
//! application's SMTP configuration at it during testing and every outbound
//! email is captured in memory instead of being delivered.
//!
//! This crate is the lifecycle and policy layer. It starts and stops an
//! embedded protocol engine on a background execution context, answers the
//! engine's configuration questions (TLS, extensions, limits, authentication)
//! from a [`Settings`] snapshot, and republishes the engine's callbacks as
//! typed events that feed a bounded, observable store of captured messages
//! and sessions. The wire-level SMTP engine itself is an external
//! collaborator plugged in through the [`MailEngine`] trait.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mailsink::{CaptureStore, EngineFactory, ServerController, Settings};
//! use std::sync::{Arc, Mutex};
//!
//! # fn engine_factory() -> EngineFactory { unimplemented!() }
//! # async fn demo() {
//! let controller = ServerController::new(Settings::default(), engine_factory());
//!
//! let store = Arc::new(Mutex::new(CaptureStore::new(100)));
//! let sink = Arc::clone(&store);
//! controller.message_received().subscribe(move |message| {
//!     sink.lock().unwrap().push_message(message.clone());
//! });
//!
//! controller.start().await.unwrap();
//! // ... run the code under test against the configured port ...
//! controller.stop().await;
//! # }
//! ```
//!
//! Engine callbacks arrive on the engine's own execution context; consumers
//! that own collections marshal onto a single-writer context themselves, as
//! the example does with a mutex.

pub mod configuration;
pub mod controller;
pub mod engine;
pub mod error_handling;
pub mod events;
pub mod inspect;
pub mod policy;
pub mod store;

pub use configuration::settings::Settings;
pub use controller::server_controller::{EngineFactory, ServerController};
pub use engine::behaviour::{MailEngine, ServerBehaviour};
pub use engine::types::{
    AuthMechanism, AuthOutcome, ConnectionState, Message, Session, SmtpExtension, SmtpRejection,
    TlsIdentity,
};
pub use error_handling::types::{CaptureError, ConfigError, EngineError};
pub use events::hook::Event;
pub use inspect::part_tree::PartNode;
pub use policy::behaviour_policy::BehaviourPolicy;
pub use store::capture_store::{CaptureStore, StoreChange};
pub use store::captured_message::CapturedMessage;
