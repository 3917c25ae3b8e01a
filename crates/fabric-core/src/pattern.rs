use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use ahash::AHashMap;
use tokio::sync::{mpsc, oneshot};

use crate::{
    message::{Message, MessageError},
    request::Request,
};

enum Lane {
    /// Mint an id, stamp it onto `request.message.source_rdv`, wrap the
    /// request in an `Arc` and insert it into the table, all inside the
    /// registry task, so by the time `respond` fires the entry already
    /// exists for a racing `Deliver` to find (§4.3 happens-before, O1).
    Register {
        request: Request,
        respond: oneshot::Sender<Arc<Request>>,
    },
    Deliver {
        message: Message,
        ack: oneshot::Sender<DeliverOutcome>,
    },
}

pub enum DeliverOutcome {
    /// The response correlated with an outstanding request. `retired`
    /// indicates the entry was removed from the registry because
    /// `replies_received >= replies_needed`.
    Correlated { request: Arc<Request>, retired: bool },
    /// No outstanding request matched `destination_rdv` (§7 Correlation):
    /// drop with an ERROR log, never faulted to the user.
    Unknown,
}

/// The rendezvous registry for a single binding's request/reply pattern
/// (§4.3). Owns the id generator and the correlation map; both live inside a
/// single task reached through two lanes (`register`, `deliver`), so the map
/// itself is never shared behind a lock.
pub struct RendezvousPattern {
    tx: mpsc::Sender<Lane>,
}

struct Entry {
    request: Arc<Request>,
    deadline: Option<Instant>,
}

impl RendezvousPattern {
    pub fn new(timeout: Option<Duration>) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(run_registry(rx, timeout));
        Self { tx }
    }

    /// Allocate a rendezvous id, stamp it onto the request and register it,
    /// returning the now-shared request so the caller can hand it on to the
    /// protocol stage for encoding.
    pub async fn register(&self, request: Request) -> Arc<Request> {
        let (respond, rx) = oneshot::channel();
        if self.tx.send(Lane::Register { request, respond }).await.is_err() {
            unreachable!("registry task outlives every binding that owns it");
        }

        rx.await.expect("registry task dropped the response channel")
    }

    pub async fn deliver(&self, message: Message) -> DeliverOutcome {
        let (ack, rx) = oneshot::channel();
        if self.tx.send(Lane::Deliver { message, ack }).await.is_err() {
            return DeliverOutcome::Unknown;
        }

        rx.await.unwrap_or(DeliverOutcome::Unknown)
    }
}

async fn run_registry(mut rx: mpsc::Receiver<Lane>, timeout: Option<Duration>) {
    let mut next_id: u32 = 0;
    let mut table: AHashMap<u32, Entry> = AHashMap::default();
    let mut tick = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            maybe_lane = rx.recv() => {
                let Some(lane) = maybe_lane else { break };
                match lane {
                    Lane::Register { mut request, respond } => {
                        next_id = next_id.wrapping_add(1);
                        if next_id == 0 {
                            next_id = 1;
                        }

                        request.message.source_rdv = next_id;
                        let request = Arc::new(request);

                        table.insert(
                            next_id,
                            Entry {
                                request: request.clone(),
                                deadline: timeout.map(|d| Instant::now() + d),
                            },
                        );

                        respond.send(request).ok();
                    }
                    Lane::Deliver { message, ack } => {
                        let outcome = match table.remove(&message.destination_rdv) {
                            None => DeliverOutcome::Unknown,
                            Some(entry) => {
                                let received = entry.request.record_reply_received();
                                let retired = received >= entry.request.replies_needed().max(1);

                                // Graft the reply's own trace onto the span this
                                // request opened on send, closing it once every
                                // expected reply is in (§4.9).
                                if let Some(logger) = &entry.request.logger {
                                    if let Some(reply_logger) = &message.logger {
                                        logger.attach_child(reply_logger);
                                    }
                                    if retired {
                                        logger.close_span();
                                    }
                                }

                                if !retired {
                                    // Still expecting more replies; put the entry back.
                                    table.insert(message.destination_rdv, Entry {
                                        request: entry.request.clone(),
                                        deadline: entry.deadline,
                                    });
                                }

                                let callback = entry.request.reply_callback.clone();
                                let outbound = message.clone();
                                tokio::spawn(async move {
                                    if let Some(callback) = callback {
                                        callback(outbound);
                                    }
                                });

                                DeliverOutcome::Correlated { request: entry.request, retired }
                            }
                        };

                        ack.send(outcome).ok();
                    }
                }
            }
            _ = tick.tick() => {
                let now = Instant::now();
                let expired: Vec<u32> = table
                    .iter()
                    .filter_map(|(id, entry)| entry.deadline.filter(|d| *d <= now).map(|_| *id))
                    .collect();

                for id in expired {
                    if let Some(entry) = table.remove(&id) {
                        log::warn!("rendezvous {} timed out waiting for a reply", id);
                        if let Some(logger) = &entry.request.logger {
                            logger.close_span();
                        }
                        let callback = entry.request.reply_callback.clone();
                        tokio::spawn(async move {
                            if let Some(callback) = callback {
                                callback(Message::default().with_error(MessageError::timeout()));
                            }
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[tokio::test]
    async fn register_stamps_a_nonzero_id_and_tracks_it() {
        let pattern = RendezvousPattern::new(None);
        let request = Request::new(Message::new("s", "/ping"));
        let request = pattern.register(request).await;
        request.set_replies_needed(1);

        assert_ne!(request.message.source_rdv, 0);

        let mut reply = Message::new("s", "/ping");
        reply.destination_rdv = request.message.source_rdv;

        match pattern.deliver(reply).await {
            DeliverOutcome::Correlated { retired, .. } => assert!(retired),
            DeliverOutcome::Unknown => panic!("expected a correlated reply"),
        }
    }

    #[tokio::test]
    async fn unknown_rdv_is_reported_as_unknown() {
        let pattern = RendezvousPattern::new(None);
        let mut message = Message::new("s", "/ping");
        message.destination_rdv = 12345;

        match pattern.deliver(message).await {
            DeliverOutcome::Unknown => {}
            DeliverOutcome::Correlated { .. } => panic!("expected unknown rdv"),
        }
    }

    #[tokio::test]
    async fn entry_survives_until_replies_needed_is_met() {
        let pattern = RendezvousPattern::new(None);
        let request = Request::new(Message::new("s", "/fanout"));
        let request = pattern.register(request).await;
        request.set_replies_needed(2);
        let rdv = request.message.source_rdv;

        let mut first = Message::new("s", "/fanout");
        first.destination_rdv = rdv;
        match pattern.deliver(first).await {
            DeliverOutcome::Correlated { retired, .. } => assert!(!retired),
            DeliverOutcome::Unknown => panic!("expected correlated"),
        }

        let mut second = Message::new("s", "/fanout");
        second.destination_rdv = rdv;
        match pattern.deliver(second).await {
            DeliverOutcome::Correlated { retired, .. } => assert!(retired),
            DeliverOutcome::Unknown => panic!("expected correlated"),
        }
    }
}
