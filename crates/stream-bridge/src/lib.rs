//! C4 Stream Bridge: the sync↔stream adapters used when a client's stream
//! intent doesn't match the upstream hop's actual mode.
//!
//! Both halves are pure, deterministic transformers with no I/O: the
//! [`Aggregator`] folds a stream of IR events into one response (used when
//! the upstream streamed but the client wants a single JSON body), and the
//! [`Expander`] does the reverse (used when the upstream replied
//! synchronously but the client asked to stream).

mod aggregator;
mod expander;

pub use aggregator::Aggregator;
pub use expander::{Expander, ExpanderOptions};
