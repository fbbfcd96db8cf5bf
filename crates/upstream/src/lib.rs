//! C6 Upstream Streaming Path: dispatches one converted request to one
//! upstream provider endpoint, enforcing the endpoint's stream policy and
//! bridging between the client's and the upstream's stream/non-stream
//! modes (spec §4).
//!
//! This crate owns the *mechanics* of one dispatch attempt. Candidate
//! selection, retry-across-candidates, and rate limiting live in the
//! scheduler that calls [`Dispatcher`]; auth/model-resolution/URL-building
//! policy live behind the [`collaborators`] trait seams so this crate never
//! has to know about a specific provider's account model.

pub mod collaborators;
pub mod dispatcher;
pub mod error;
mod metrics;
pub mod policy;
pub mod sse;

pub use collaborators::{AuthCredentials, AuthProvider, IdentityEnvelope, ModelResolver, ProviderEnvelope, ResolvedModel, UrlBuilder};
pub use dispatcher::{DispatchRequest, Dispatcher, SyncOutcome};
pub use error::{UpstreamError, UpstreamResult};
pub use policy::{BodyStreamField, StreamPolicy};
pub use sse::{SseReader, SseRecord};
