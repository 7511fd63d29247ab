//! Detection session controller.
//!
//! Orchestrates one activation of tone detection:
//!
//! ```text
//!  host signals ──▶ SessionHandle ──▶ ┌─────────────────────┐
//!  service start completions ───────▶ │ inbound queue        │
//!                                     └──────────┬──────────┘
//!                                                ▼
//!                                      SessionController
//!                          ┌──────────────┼──────────────┐
//!                          ▼              ▼              ▼
//!                   PermissionGate  DetectionService  EventRouter
//!                                     Handle
//! ```
//!
//! Every input is a [`SessionMessage`] processed sequentially by the single
//! owner of the state machine, so no callback ever re-enters it.
//!
//! # Example
//!
//! ```ignore
//! let (controller, handle) = SessionController::new(config, router, collaborators);
//! tokio::spawn(controller.run());
//!
//! handle.on_session_ready();
//! // ... later, from the host's permission callback
//! handle.on_permission_result(302, vec![true, true]);
//! // ... and on shutdown
//! handle.on_session_teardown();
//! ```

mod config;
mod controller;
mod error;
mod message;
mod state;

pub use config::{default_config_path, SessionConfig, DEFAULT_REQUEST_CODE};
pub use controller::{Collaborators, SessionController, SessionHandle, SessionStatus};
pub use error::{ConfigError, Result, SessionError};
pub use message::SessionMessage;
pub use state::SessionState;
