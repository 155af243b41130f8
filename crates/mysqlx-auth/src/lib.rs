//! # mysqlx-auth
//!
//! Authentication mechanisms for X Protocol sessions.
//!
//! This crate computes what the client sends during authentication,
//! isolated from connection logic so each mechanism can be tested on its
//! own.
//!
//! ## Supported Mechanisms
//!
//! | Mechanism | Exchange | Notes |
//! |-----------|----------|-------|
//! | `SHA256_MEMORY` | challenge/response | Needs the server's password cache to be warm |
//! | `MYSQL41` | challenge/response | SHA-1 based, for older accounts |
//! | `PLAIN` | initial response | Clear text, only offered over TLS |

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod credentials;
pub mod error;
pub mod mechanism;
pub mod provider;
pub mod scramble;

pub use credentials::Credentials;
pub use error::AuthError;
pub use mechanism::{AuthMechanism, candidate_mechanisms};
pub use provider::{AuthProvider, AuthStart, provider_for};
