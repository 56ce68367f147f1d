//! Identity Resolver service.
//!
//! Turns detection events into identity events while suppressing
//! physically impossible matches and single-frame flickers.
//!
//! # Per-detection pipeline
//!
//! 1. ANN lookup against the gallery (top-5, effort raised for billing).
//! 2. Cosine threshold filter.
//! 3. Spatiotemporal gate against the active-identity registry.
//! 4. History-ring confirmation (3-of-5 majority over the threshold).
//! 5. Registry update with drift-gated gallery EMA.
//! 6. Alert triggers (unknown at billing, VIP, false-merge sweep).
//!
//! Every detection resolves to exactly one `IdentityEvent`; the `source`
//! field enumerates the outcome instead of error branches.
//!
//! The consume loop commits offsets manually, tied to identity publish
//! success: a similarity-backend outage produces UNKNOWN events without
//! advancing offsets, and recovery rewinds to the committed position so
//! the outage window is re-resolved properly.

pub mod gallery;
pub mod gate;
pub mod http;
pub mod metrics;
pub mod registry;
pub mod resolve;
pub mod service;
pub mod tracks;

pub use resolve::IdentityResolver;
pub use service::ResolverService;
