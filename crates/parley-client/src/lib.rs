//! Client side of the Parley chat stream.
//!
//! This crate sends chat requests to a Parley server and folds the streamed
//! chunks into a shared session store.
//!
//! # Example
//!
//! ```no_run
//! use parley_client::{ParleyClient, Session, SessionStore, StreamConsumer};
//! use parley_types::{ChatApiRequest, ProviderType};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> parley_client::Result<()> {
//! let client = ParleyClient::new("http://localhost:8787")?;
//! let store = SessionStore::new();
//! let session_id = store.create_session(Session::new());
//!
//! let template = ChatApiRequest {
//!     provider_type: Some(ProviderType::Openai.name().to_string()),
//!     model_id: Some("gpt-4o-mini".to_string()),
//!     ..Default::default()
//! };
//!
//! let consumer = StreamConsumer::new(client, store.clone());
//! consumer
//!     .send_text(&session_id, "Hello!", template, CancellationToken::new())
//!     .await?;
//!
//! if let Some(session) = store.session(&session_id) {
//!     for message in &session.messages {
//!         println!("{:?}: {}", message.role, message.text());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod consumer;
pub mod error;
pub mod frame;
pub mod session;
pub mod store;

pub use client::{ClientBuilder, HealthStatus, ParleyClient};
pub use consumer::{StreamConsumer, StreamOutcome};
pub use error::{ClientError, Result};
pub use frame::{decode_event_data, decode_frames};
pub use session::{Applied, Session, apply_chunk};
pub use store::{SessionStore, StoreState};
