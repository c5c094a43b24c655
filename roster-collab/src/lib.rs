//! # roster-collab: Real-time channel for the user-management console
//!
//! Keeps one WebSocket connection to the collaboration server alive and
//! tells each open edit form who else is editing the same record.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────┐   JSON frames    ┌─────────────────┐
//! │ ConnectionManager │ ◄──────────────► │ collab server   │
//! │ (actor task)      │   WebSocket      └─────────────────┘
//! └─────────┬─────────┘
//!           │ decoded WireMessage
//!           ▼
//! ┌───────────────────┐
//! │ DispatchRegistry  │ ─── fan-out to every subscriber
//! └─────────┬─────────┘
//!           ▼
//! ┌───────────────────┐
//! │ EditingSession    │ ─── NotificationSurface ("Also editing: …")
//! │ (per open form)   │
//! └───────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: JSON message catalogue tagged by `type`
//! - [`config`]: endpoint, backoff and keep-alive settings
//! - [`lifecycle`]: reconnect state machine with generation tags
//! - [`dispatch`]: subscriber registry with snapshot fan-out
//! - [`client`]: connection manager actor over tokio-tungstenite
//! - [`presence`]: start/stop editing announcements and remote editors
//! - [`session`]: logged-in user

pub mod client;
pub mod config;
pub mod dispatch;
pub mod lifecycle;
pub mod presence;
pub mod protocol;
pub mod session;

// Re-exports for convenience
pub use client::{ConnectionEvent, ConnectionManager, ConnectionStats, MessageSink};
pub use config::{ClientConfig, ConfigError, ReconnectPolicy};
pub use dispatch::{DispatchRegistry, DispatchStats, Handler, Subscription};
pub use lifecycle::{Generation, LinkState};
pub use presence::{
    remote_editors, EditingSession, IdentityProvider, NotificationState,
    NotificationSurface, PresenceCoordinator, ANONYMOUS, DEFAULT_NOTICE_PREFIX,
};
pub use protocol::{
    ChatMessage, CodecError, EditingAnnouncement, EditingStatus, EntityId,
    RecordId, UserRecord, WireMessage,
};
pub use session::Session;
