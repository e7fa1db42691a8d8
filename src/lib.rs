//! messenger-relay: answers Messenger conversations with OpenAI chat completions.
//!
//! ```text
//! Messenger ──POST /webhook──▶ Bridge ──▶ OpenAI chat completions
//!     ▲                          │
//!     └────── Send API ◀─────────┘
//! ```

pub mod completion;
pub mod config;
pub mod error;
pub mod sender;
pub mod server;
pub mod signature;
pub mod types;
pub mod webhook;

pub use config::Config;
pub use error::{Error, Result};
pub use webhook::{router, Bridge};
