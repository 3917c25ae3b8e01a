use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use tokio::sync::mpsc;

use crate::{logger::Logger, message::Message};

pub type ReplyCallback = Arc<dyn Fn(Message) + Send + Sync>;

/// An outbound request travelling down the handler chain (§4.1, §4.3).
///
/// `replies_needed`/`replies_received` are populated by the resolver
/// (destination size) and driven by the rendezvous registry as responses
/// arrive.
pub struct Request {
    pub message: Message,
    pub wants_reply: bool,
    pub reply_callback: Option<ReplyCallback>,
    pub logger: Option<Logger>,
    replies_needed: Arc<AtomicUsize>,
    replies_received: Arc<AtomicUsize>,
    /// Set when this Request is itself a reply, pointing back at the
    /// [`ReceivedRequest`] it answers, so the logger can stitch traces.
    pub initiating_received_request: Option<Arc<ReceivedRequest>>,
}

impl Request {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            wants_reply: false,
            reply_callback: None,
            logger: None,
            replies_needed: Arc::new(AtomicUsize::new(0)),
            replies_received: Arc::new(AtomicUsize::new(0)),
            initiating_received_request: None,
        }
    }

    pub fn on_reply(mut self, callback: ReplyCallback) -> Self {
        self.wants_reply = true;
        self.reply_callback = Some(callback);
        self
    }

    /// Install a bounded-at-1 reply channel and return its receiver; only
    /// the first delivered reply is forwarded onto it.
    pub fn reply_channel(mut self) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(1);
        self.wants_reply = true;
        self.reply_callback = Some(Arc::new(move |message| {
            let _ = tx.try_send(message);
        }));
        (self, rx)
    }

    pub fn needs_reply(&self) -> bool {
        self.wants_reply
    }

    pub fn set_replies_needed(&self, count: usize) {
        self.replies_needed.store(count, Ordering::SeqCst);
    }

    pub fn replies_needed(&self) -> usize {
        self.replies_needed.load(Ordering::SeqCst)
    }

    pub fn replies_received(&self) -> usize {
        self.replies_received.load(Ordering::SeqCst)
    }

    /// Returns the post-increment count, so the caller can decide to retire
    /// the rendezvous entry when it reaches `replies_needed`.
    pub fn record_reply_received(&self) -> usize {
        self.replies_received.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// An inbound request, handed up the chain to the user handler after the
/// rendezvous pattern has classified it as a fresh call rather than a reply.
pub struct ReceivedRequest {
    pub message: Message,
    /// Set when this received message is itself a reply to an outstanding
    /// local [`Request`].
    pub initiating_request: Option<Arc<Request>>,
    /// Installed by the request/reply pattern; calling it sends a reply
    /// back to `message.source` at `message.source_rdv`.
    reply_closure: parking_lot::Mutex<Option<Arc<dyn Fn(Message) + Send + Sync>>>,
}

impl ReceivedRequest {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            initiating_request: None,
            reply_closure: parking_lot::Mutex::new(None),
        }
    }

    pub fn install_reply_closure(&self, closure: Arc<dyn Fn(Message) + Send + Sync>) {
        *self.reply_closure.lock() = Some(closure);
    }

    pub fn has_reply_closure(&self) -> bool {
        self.reply_closure.lock().is_some()
    }

    /// Reply with a built message, bypassing [`ReceivedRequest::reply`]'s
    /// data-map convenience constructor.
    pub fn reply_message(&self, message: Message) {
        if let Some(closure) = self.reply_closure.lock().clone() {
            closure(message);
        } else {
            log::error!(
                "received request for {}:{} has no reply closure installed; dropping reply",
                self.message.service,
                self.message.path
            );
        }
    }

    pub fn reply(&self, data: crate::data::Data) {
        let mut message = Message::default();
        message.data = data;
        self.reply_message(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[tokio::test]
    async fn reply_channel_delivers_first_reply() {
        let (request, mut rx) = Request::new(Message::new("s", "/ping")).reply_channel();
        let callback = request.reply_callback.clone().unwrap();
        callback(Message::new("s", "/ping"));

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.path, "/ping");
    }

    #[test]
    fn replies_received_tracks_until_needed() {
        let request = Request::new(Message::new("s", "/ping"));
        request.set_replies_needed(2);
        assert_eq!(request.record_reply_received(), 1);
        assert_eq!(request.record_reply_received(), 2);
        assert_eq!(request.replies_received(), request.replies_needed());
    }
}
