//! Name-keyed publish/subscribe registry
//!
//! The registry owns all publications and coordinates the lifecycle rules
//! around them: creation on first publish or subscribe, source switching for
//! subscriptions, and erasure once a stream is stopped and unobserved.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<Mutex<Registry>>
//!                  ┌───────────────────────────┐
//!                  │ publications: HashMap<    │
//!                  │   name,                   │
//!                  │   Arc<Mutex<Publication>> │
//!                  │ >                         │
//!                  └─────────────┬─────────────┘
//!                                │
//!         ┌──────────────────────┼──────────────────────┐
//!         │                      │                      │
//!         ▼                      ▼                      ▼
//!    [Producer]            [Subscription]         [Subscription]
//!    write_video() ──► fan-out ──► Target ──► protocol session
//! ```
//!
//! `bytes::Bytes` payloads are reference counted, so every member of a
//! publication shares the producer's allocation.

pub mod auth;
pub mod config;
pub mod name;
pub mod store;

pub use auth::{AllowAll, Authorizer};
pub use config::RegistryConfig;
pub use name::StreamName;
pub use store::Registry;
