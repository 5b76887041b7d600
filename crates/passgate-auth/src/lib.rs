//! Passgate Authentication Service
//!
//! Provides the credential pipeline behind registration and login:
//! - Argon2id password hashing with a fixed, upgradeable profile
//! - Short-lived HS256 session tokens
//! - Single-use email verification codes with delivery through a mail sender
//! - Registration / login orchestration over a transactional credential store
//! - actix-web handlers exposing the flows under `/auth/v1`

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod handlers;
pub mod hasher;
pub mod jwt;
pub mod mail;
pub mod middleware;
pub mod server;
pub mod store;
pub mod verification;
pub mod workflow;

pub use clock::{Clock, ManualClock, SystemClock};
pub use hasher::PasswordHasher;
pub use jwt::{IssuedToken, TokenOutcome, TokenService};
pub use mail::{HttpMailer, LogMailer, MailSender, MemoryMailer, OutgoingEmail};
pub use server::AuthServer;
pub use store::{CredentialStore, CredentialTx, MemoryCredentialStore};
pub use verification::{IssuedCode, VerificationTokenIssuer};
pub use workflow::{CredentialWorkflow, LoginRequest, LoginSession, Registration, RegistrationRequest};
