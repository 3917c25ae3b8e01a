use std::sync::Arc;

use parking_lot::Mutex;

use crate::data::{Data, Value};

/// Severity ladder for the per-request trace tree. Distinct from the
/// process-wide `log` crate's levels: this ladder is carried *inside* a
/// request and can cross the wire with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 10,
}

impl Level {
    fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Line { level: Level, message: String },
    Span(SpanNode),
    /// A finished remote tree grafted in verbatim, e.g. the reply's logger
    /// attached as a child of the span that awaited it.
    Remote(Value),
}

#[derive(Debug, Clone)]
struct SpanNode {
    name: String,
    entries: Vec<Entry>,
    closed: bool,
}

/// A per-request hierarchical trace logger.
///
/// Every [`crate::request::Request`] / [`crate::request::ReceivedRequest`]
/// may carry one. `open_span`/`close_span` bracket a traced operation (the
/// fabric opens one named `req_send <service>:<path>` around every outbound
/// call); `log` records a leaf line under whichever span is currently open.
#[derive(Debug, Clone)]
pub struct Logger {
    threshold: Level,
    root: Arc<Mutex<SpanNode>>,
    /// Stack of indices locating the currently open span, root-relative.
    stack: Arc<Mutex<Vec<usize>>>,
}

impl Logger {
    pub fn new(threshold: Level) -> Self {
        Self {
            threshold,
            root: Arc::new(Mutex::new(SpanNode {
                name: "root".into(),
                entries: Vec::new(),
                closed: false,
            })),
            stack: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Raise the threshold to [`Level::Trace`], as HTTP ingress does when
    /// `data["nrv_trace"]` is present on an inbound request.
    pub fn raise_to_max(&mut self) {
        self.threshold = Level::Trace;
    }

    pub fn threshold(&self) -> Level {
        self.threshold
    }

    fn with_current<'a, R>(entries: &'a mut Vec<Entry>, stack: &[usize], f: impl FnOnce(&mut Vec<Entry>) -> R) -> R {
        match stack.first() {
            None => f(entries),
            Some(&index) => match &mut entries[index] {
                Entry::Span(span) => Self::with_current(&mut span.entries, &stack[1..], f),
                _ => f(entries),
            },
        }
    }

    pub fn log(&self, level: Level, message: impl Into<String>) {
        if level.as_u8() > self.threshold.as_u8() {
            return;
        }

        let mut root = self.root.lock();
        let stack = self.stack.lock();
        Self::with_current(&mut root.entries, &stack, |entries| {
            entries.push(Entry::Line {
                level,
                message: message.into(),
            });
        });
    }

    /// Open a named span; subsequent `log` calls nest under it until
    /// [`Logger::close_span`].
    pub fn open_span(&self, name: impl Into<String>) {
        let mut root = self.root.lock();
        let mut stack = self.stack.lock();

        let new_index = Self::with_current(&mut root.entries, &stack, |entries| {
            entries.push(Entry::Span(SpanNode {
                name: name.into(),
                entries: Vec::new(),
                closed: false,
            }));
            entries.len() - 1
        });

        stack.push(new_index);
    }

    /// Close the innermost open span. A no-op if nothing is open.
    pub fn close_span(&self) {
        let mut stack = self.stack.lock();
        let Some(closing) = stack.pop() else { return };

        let mut root = self.root.lock();
        Self::with_current(&mut root.entries, &stack, |entries| {
            if let Entry::Span(span) = &mut entries[closing] {
                span.closed = true;
            }
        });
    }

    /// Graft another logger's finished tree as a child of the currently open
    /// span, used when a reply carries its own logger back across the wire.
    pub fn attach_child(&self, other: &Logger) {
        let value = other.to_value();
        let mut root = self.root.lock();
        let stack = self.stack.lock();
        Self::with_current(&mut root.entries, &stack, |entries| {
            entries.push(Entry::Remote(value));
        });
    }

    /// Attach an already-serialised remote tree (as received in a message's
    /// data map) as a child of the currently open span.
    pub fn attach_remote_value(&self, value: Value) {
        let mut root = self.root.lock();
        let stack = self.stack.lock();
        Self::with_current(&mut root.entries, &stack, |entries| {
            entries.push(Entry::Remote(value));
        });
    }

    /// Serialise the trace tree into a [`Value`], suitable for embedding in
    /// a message's `data` map so it propagates across the wire.
    pub fn to_value(&self) -> Value {
        fn span_to_value(span: &SpanNode) -> Value {
            let mut map: Data = Data::default();
            map.insert("name".into(), Value::String(span.name.clone()));
            map.insert("closed".into(), Value::Bool(span.closed));
            map.insert(
                "entries".into(),
                Value::List(span.entries.iter().map(entry_to_value).collect()),
            );
            Value::Map(map)
        }

        fn entry_to_value(entry: &Entry) -> Value {
            match entry {
                Entry::Line { level, message } => {
                    let mut map: Data = Data::default();
                    map.insert("level".into(), Value::Int(level.as_u8() as i64));
                    map.insert("message".into(), Value::String(message.clone()));
                    Value::Map(map)
                }
                Entry::Span(span) => span_to_value(span),
                Entry::Remote(value) => value.clone(),
            }
        }

        span_to_value(&self.root.lock())
    }

    /// Rebuild a logger from a serialised trace tree, the inverse of
    /// [`Logger::to_value`]. Used on decode to restore a message's carried
    /// logger (§4.9); the rebuilt tree has nothing open, since the spans it
    /// held were already closed by whoever serialised it.
    pub fn from_value(value: Value) -> Self {
        Self {
            threshold: Level::Trace,
            root: Arc::new(Mutex::new(value_to_span(&value))),
            stack: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Render the trace tree as indented plain text, for appending to an
    /// HTTP ingress response body when tracing was requested.
    pub fn render(&self) -> String {
        fn render_span(span: &SpanNode, depth: usize, out: &mut String) {
            let indent = "  ".repeat(depth);
            out.push_str(&format!("{indent}{}{}\n", span.name, if span.closed { "" } else { " (open)" }));
            for entry in &span.entries {
                match entry {
                    Entry::Line { level, message } => {
                        out.push_str(&format!("{indent}  [{:?}] {}\n", level, message));
                    }
                    Entry::Span(child) => render_span(child, depth + 1, out),
                    Entry::Remote(_) => out.push_str(&format!("{indent}  <remote trace>\n")),
                }
            }
        }

        let mut out = String::new();
        render_span(&self.root.lock(), 0, &mut out);
        out
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(Level::Info)
    }
}

fn value_to_span(value: &Value) -> SpanNode {
    let map = value.as_map();
    SpanNode {
        name: map.and_then(|m| m.get("name")).and_then(Value::as_str).unwrap_or_default().to_string(),
        closed: map.and_then(|m| m.get("closed")).and_then(Value::as_bool).unwrap_or(true),
        entries: map
            .and_then(|m| m.get("entries"))
            .and_then(Value::as_list)
            .map(|list| list.iter().map(value_to_entry).collect())
            .unwrap_or_default(),
    }
}

fn value_to_entry(value: &Value) -> Entry {
    if let Some(map) = value.as_map() {
        if let (Some(level), Some(message)) = (map.get("level").and_then(Value::as_int), map.get("message").and_then(Value::as_str)) {
            return Entry::Line { level: level_from_u8(level), message: message.to_string() };
        }
    }
    Entry::Span(value_to_span(value))
}

fn level_from_u8(value: i64) -> Level {
    match value {
        1 => Level::Error,
        2 => Level::Warn,
        3 => Level::Info,
        4 => Level::Debug,
        _ => Level::Trace,
    }
}
