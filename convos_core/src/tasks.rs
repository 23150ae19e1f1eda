//! Long-lived per-identity tasks.
//!
//! Each identity runs two cooperative tasks for its whole lifetime: one
//! keeping conversation state reconciled (full sync, then the push
//! stream), and one scanning the DM channel for join requests behind a
//! monotonic watermark. Both tolerate redelivery; every downstream
//! mutation is idempotent. Cancelling the token stops both without leaving
//! partial writes, since row writes happen inside the reconciler's
//! per-conversation critical section.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use convos_common::{retry_async, time::now_ns, Retry};

use crate::{
    client::MessagingClient,
    configuration::{JOIN_SCAN_INTERVAL, STREAM_RESTART_DELAY},
    join_requests::JoinRequestProcessor,
    reconcile::{ConsentReconciler, ReconcileSource},
    store::ConversationStore,
};

/// Handles for one identity's background tasks. Dropping does not cancel;
/// call [`IdentityTasks::shutdown`] when the identity is removed.
pub struct IdentityTasks {
    inbox_id: String,
    token: CancellationToken,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl IdentityTasks {
    pub fn inbox_id(&self) -> &str {
        &self.inbox_id
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn shutdown(self) {
        tracing::debug!(inbox_id = %self.inbox_id, "shutting down identity tasks");
        self.token.cancel();
        for handle in self.handles {
            handle.abort();
        }
    }
}

/// Spawn the sync+stream task and the join-request scan task for one
/// identity.
pub fn spawn_for_identity<C, S>(
    inbox_id: String,
    client: Arc<C>,
    reconciler: Arc<ConsentReconciler<C, S>>,
    processor: Arc<JoinRequestProcessor<C, S>>,
) -> IdentityTasks
where
    C: MessagingClient + 'static,
    S: ConversationStore + 'static,
{
    let token = CancellationToken::new();

    let conversation_handle = tokio::spawn({
        let inbox_id = inbox_id.clone();
        let token = token.clone();
        async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = conversation_loop(inbox_id, client, reconciler) => {}
            }
        }
    });

    let scan_handle = tokio::spawn({
        let inbox_id = inbox_id.clone();
        let token = token.clone();
        async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = join_request_loop(inbox_id, processor) => {}
            }
        }
    });

    IdentityTasks {
        inbox_id,
        token,
        handles: vec![conversation_handle, scan_handle],
    }
}

/// Full sync once, then consume the push stream; on stream end or error,
/// resynchronize and resubscribe. Redelivered events reconcile to no-ops.
async fn conversation_loop<C, S>(
    inbox_id: String,
    client: Arc<C>,
    reconciler: Arc<ConsentReconciler<C, S>>,
) where
    C: MessagingClient,
    S: ConversationStore,
{
    loop {
        let synced = retry_async(Retry::default(), || client.sync_conversations(&inbox_id)).await;
        match synced {
            Ok(conversations) => {
                for conversation in conversations {
                    if let Err(e) = reconciler
                        .reconcile(&inbox_id, conversation, ReconcileSource::FullSync)
                        .await
                    {
                        tracing::warn!(inbox_id = %inbox_id, error = %e, "full-sync reconcile failed");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(inbox_id = %inbox_id, error = %e, "conversation sync failed");
            }
        }

        match client.stream_conversations(&inbox_id).await {
            Ok(mut stream) => {
                while let Some(event) = stream.next().await {
                    match event {
                        Ok(conversation) => {
                            if let Err(e) = reconciler
                                .reconcile(&inbox_id, conversation, ReconcileSource::Stream)
                                .await
                            {
                                tracing::warn!(inbox_id = %inbox_id, error = %e, "stream reconcile failed");
                            }
                        }
                        Err(e) => {
                            tracing::warn!(inbox_id = %inbox_id, error = %e, "conversation stream error");
                            break;
                        }
                    }
                }
                tracing::debug!(inbox_id = %inbox_id, "conversation stream ended, restarting");
            }
            Err(e) => {
                tracing::warn!(inbox_id = %inbox_id, error = %e, "failed to open conversation stream");
            }
        }
        tokio::time::sleep(STREAM_RESTART_DELAY).await;
    }
}

/// Periodic join-request scan. The watermark advances to the start of each
/// scan, so a message is revisited at most once across ticks and the
/// underlying processing stays cheap.
async fn join_request_loop<C, S>(inbox_id: String, processor: Arc<JoinRequestProcessor<C, S>>)
where
    C: MessagingClient,
    S: ConversationStore,
{
    let mut watermark = None;
    let mut intervals = convos_common::time::interval_stream(JOIN_SCAN_INTERVAL);
    while intervals.next().await.is_some() {
        let scan_start = now_ns();
        match processor.process_join_requests(&inbox_id, watermark).await {
            Ok(admitted) => {
                if !admitted.is_empty() {
                    tracing::info!(inbox_id = %inbox_id, count = admitted.len(), "admitted joiners");
                }
                watermark = Some(scan_start);
            }
            Err(e) => {
                tracing::warn!(inbox_id = %inbox_id, error = %e, "join-request scan failed");
            }
        }
    }
}
