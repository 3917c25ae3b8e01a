//! The four-link handler chain (§4.1, §9).
//!
//! A literal doubly-linked chain of trait objects with runtime
//! `set_next`/`set_prev` wiring buys extensibility this fabric never uses:
//! the chain's adjacency (logger, resolver, pattern, protocol) is fixed at
//! binding construction and never changes for the life of the binding. So
//! rather than a `Handler` trait with link pointers, the chain is just the
//! call sequence baked into [`crate::binding::Binding::call`] (forward:
//! logger opens a span, resolver fills the destination, pattern registers
//! the rendezvous, protocol sends) and [`crate::binding::Binding::receive`]
//! (the mirror image on the way back in: protocol decodes, pattern
//! correlates or classifies as fresh, the handler runs, and a reply closure
//! walks back out through the same stages).
//!
//! This module exists to name the sequence in one place for anyone looking
//! for a `Chain` type; it re-exports the pieces that make it up rather than
//! introducing a parallel abstraction over them.

pub use crate::binding::Binding;
pub use crate::pattern::{DeliverOutcome, RendezvousPattern};
pub use crate::resolver::Resolver;
