//! # parley-core
//!
//! Presence and message routing for the Parley messaging server.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Client** - A named, connected peer with a unique identity
//! - **ClientRegistry** - Which names are online; at most one client per name
//! - **RoomRegistry** - Ad-hoc rooms, created on first join
//! - **Router** - Direct messages, room broadcasts and membership notices
//! - **Session** - Per-connection lifecycle from registration to cleanup
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌────────────────┐
//! │  Session    │────▶│   Router    │────▶│ ClientRegistry │
//! └─────────────┘     └─────────────┘     └────────────────┘
//!                            │
//!                            ▼
//!                     ┌──────────────┐
//!                     │ RoomRegistry │
//!                     └──────────────┘
//! ```

pub mod client;
pub mod error;
pub mod registry;
pub mod room;
pub mod router;
pub mod session;

pub use client::{Client, ClientId, ClientStatus};
pub use error::{DeliveryFailure, RegistryError, RouteError};
pub use registry::ClientRegistry;
pub use room::{Membership, Room, RoomRegistry};
pub use router::{Routed, Router, RouterConfig, RouterStats};
pub use session::{
    CloseReason, MessageKind, Session, SessionError, SessionObserver, SessionState, SessionStats,
    SessionSummary,
};
