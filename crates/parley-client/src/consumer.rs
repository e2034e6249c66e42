//! The stream session consumer.
//!
//! Sends one chat request for a session and applies the streamed chunks to
//! the [`SessionStore`]. Every write goes through
//! [`SessionStore::reread_and_update`]; the first time it reports that the
//! session is no longer active the stream is abandoned.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use parley_types::{ChatApiRequest, Message};

use crate::client::ParleyClient;
use crate::error::{ClientError, Result};
use crate::frame::decode_frames;
use crate::session::apply_chunk;
use crate::store::SessionStore;

/// How a consumed stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The server closed the stream.
    Completed,
    /// Another session became active; remaining chunks were dropped.
    Superseded,
    /// The cancellation token fired.
    Cancelled,
}

/// Drives chat requests for sessions in a [`SessionStore`].
#[derive(Debug, Clone)]
pub struct StreamConsumer {
    client: ParleyClient,
    store: SessionStore,
}

impl StreamConsumer {
    pub fn new(client: ParleyClient, store: SessionStore) -> Self {
        Self { client, store }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Send `text` as a user message. See [`StreamConsumer::send`].
    pub async fn send_text(
        &self,
        session_id: &str,
        text: &str,
        template: ChatApiRequest,
        cancel: CancellationToken,
    ) -> Result<StreamOutcome> {
        self.send(session_id, Message::user(session_id, text), template, cancel)
            .await
    }

    /// Append `user_message` to the session, send the session history with
    /// the provider settings of `template`, and apply the streamed reply.
    ///
    /// The session's loading flag is cleared on every return path.
    pub async fn send(
        &self,
        session_id: &str,
        user_message: Message,
        mut template: ChatApiRequest,
        cancel: CancellationToken,
    ) -> Result<StreamOutcome> {
        let history = self.store.reread_and_update(session_id, |session| {
            session.messages.push(user_message);
            session.loading = true;
            session.error = None;
            session.history()
        });
        let Some(history) = history else {
            tracing::warn!(session_id, "Not sending for an inactive session");
            return Ok(StreamOutcome::Superseded);
        };

        template.chat_id = Some(session_id.to_string());
        template.messages = Some(history);

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.store.clear_loading(session_id);
                return Ok(StreamOutcome::Cancelled);
            }
            opened = self.client.open_chat_stream(&template) => opened,
        };

        let response = match opened {
            Ok(response) => response,
            Err(err) => {
                self.record_open_failure(session_id, &err);
                return Err(err);
            }
        };

        let frames = decode_frames(response.bytes_stream());
        tokio::pin!(frames);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(session_id, "Stream cancelled");
                    self.store.clear_loading(session_id);
                    return Ok(StreamOutcome::Cancelled);
                }
                next = frames.next() => next,
            };
            let Some(item) = next else {
                break;
            };

            let written = match item {
                Ok(chunk) => self
                    .store
                    .reread_and_update(session_id, |session| {
                        apply_chunk(session, &chunk);
                    }),
                Err(ClientError::Parse(reason)) => {
                    tracing::warn!(session_id, error = %reason, "Skipping malformed stream frame");
                    self.store.reread_and_update(session_id, |session| {
                        session.error = Some(format!("Malformed stream frame: {}", reason));
                        session.loading = false;
                    })
                }
                Err(err) => {
                    tracing::warn!(session_id, error = %err, "Chat stream broke off");
                    self.store.reread_and_update(session_id, |session| {
                        session.error = Some(err.to_string());
                    });
                    self.store.clear_loading(session_id);
                    return Err(err);
                }
            };

            if written.is_none() {
                tracing::info!(session_id, "Active session changed, abandoning stream");
                cancel.cancel();
                self.store.clear_loading(session_id);
                return Ok(StreamOutcome::Superseded);
            }
        }

        self.store.clear_loading(session_id);
        Ok(StreamOutcome::Completed)
    }

    /// A rejected request becomes an assistant error message; a transport
    /// failure becomes the session error.
    fn record_open_failure(&self, session_id: &str, err: &ClientError) {
        match err {
            ClientError::Status { message, .. } => {
                tracing::warn!(session_id, error = %err, "Chat request rejected");
                self.store.reread_and_update(session_id, |session| {
                    let mut msg = Message::assistant(session_id, "");
                    msg.error = Some(message.clone());
                    session.messages.push(msg);
                });
            }
            _ => {
                tracing::warn!(session_id, error = %err, "Chat request failed");
                self.store.reread_and_update(session_id, |session| {
                    session.error = Some(err.to_string());
                });
            }
        }
        self.store.clear_loading(session_id);
    }
}
