//! SOAP envelope construction and reply inspection.
//!
//! - [`namespace`]: the fixed table of WS-Management namespaces
//! - [`message`]: building envelopes as element trees
//! - [`header`]: fluent WS-Addressing/WS-Man header setup
//! - [`document`]: namespace-aware lookups over parsed replies

pub mod document;
pub mod header;
pub mod message;
pub mod namespace;

pub use document::Document;
pub use header::{generate_message_id, HeaderBuilder, ANONYMOUS_ROLE};
pub use message::{Element, SoapMessage};
pub use namespace::Namespace;
