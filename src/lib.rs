//! # winrs - an async WinRM remote shell client
//!
//! winrs speaks the WS-Management remote shell protocol: it opens a shell on
//! a Windows host, runs commands in it, streams stdout/stderr back, feeds
//! stdin and tears the shell down. Envelopes travel over HTTP(S), optionally
//! sealed with NTLM message encryption when TLS is not available.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                 Session (Client / Shell / Command)                   │
//! │        receive loop, stdin feeder, exit code classification          │
//! └─────────────────────────────────────────────────────────────────────┘
//!                 │ build                          ▲ decode
//!                 ▼                                │
//! ┌───────────────────────────────┐  ┌──────────────────────────────────┐
//! │   protocol::request + soap    │  │        protocol::response        │
//! │   (envelopes and headers)     │  │  (shell id, command id, streams) │
//! └───────────────────────────────┘  └──────────────────────────────────┘
//!                 │                                ▲
//!                 ▼                                │
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │        Transporter: Basic | Certificate | NTLM | Encrypted          │
//! │                 (reqwest + rustls, in-crate NTLM)                    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use winrs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> winrs::Result<()> {
//!     let endpoint = Endpoint::new("win01.example.com");
//!     let client = Client::new(
//!         &endpoint,
//!         Credentials::new("Administrator", "secret"),
//!         AuthMethod::Encrypted("ntlm".into()),
//!     )?;
//!
//!     let (stdout, _stderr, code) = client.run_with_string("ipconfig /all", "").await?;
//!     println!("{stdout}");
//!     std::process::exit(code);
//! }
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod prelude {
    //! Convenient re-exports of the types needed to run remote commands.
    //!
    //! ```rust,no_run
    //! use winrs::prelude::*;
    //! ```

    pub use crate::config::{AuthMethod, Credentials, Endpoint, Parameters, WinRmConfig};
    pub use crate::error::{Error, Result};
    pub use crate::powershell::PowerShellOptions;
    pub use crate::session::{
        Client, Command, CommandStdin, DirectCommand, DirectOutput, SessionState, Shell,
    };
    pub use crate::transport::{Transporter, TransportDecorator};
}

// ============================================================================
// Core Modules
// ============================================================================

/// Error types and result aliases.
///
/// [`Error`](error::Error) covers transport failures, HTTP status problems,
/// SOAP faults, parse and integrity failures, and usage errors.
pub mod error;

/// Endpoint, parameters, credentials and TOML configuration.
pub mod config;

// ============================================================================
// Protocol
// ============================================================================

/// Namespace-aware SOAP envelope construction and reply lookup.
pub mod soap;

/// WS-Management shell requests and their replies.
pub mod protocol;

/// NTLMv2 authentication and message sealing.
pub mod ntlm;

// ============================================================================
// Infrastructure
// ============================================================================

/// HTTP transports, one per authentication scheme, and the encrypted channel.
pub mod transport;

/// Clients, shells and commands.
pub mod session;

/// PowerShell command line encoding.
pub mod powershell;

pub use config::{AuthMethod, Credentials, Endpoint, Parameters};
pub use error::{Error, Result};
pub use session::{Client, Command, Shell};
