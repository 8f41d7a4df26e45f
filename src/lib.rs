//! Upstream version tracking for Gentoo overlays.
//!
//! # Pipeline
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌─────────────┐   ┌─────────────┐
//! │   ebuild    │──▶│  discovery  │──▶│    fetch    │──▶│   extract   │
//! │ (metadata)  │   │  (sources)  │   │(rate limit) │   │ (strategies)│
//! └─────────────┘   └─────────────┘   └─────────────┘   └─────────────┘
//!                                                              │
//!                   ┌─────────────┐   ┌─────────────┐          ▼
//!                   │    apply    │◀──│    cache    │◀── validation
//!                   │  (bump)     │   │  (schemas)  │
//!                   └─────────────┘   └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`ebuild`]: Recipe metadata extraction and version ordering
//! - [`discovery`]: Candidate endpoint discovery from metadata
//! - [`extract`]: Extraction strategies, fallback advice and schema validation
//! - [`ratelimit`]: Token-bucket admission for LLM and per-host HTTP requests
//! - [`cache`]: TTL-bound store of validated extraction schemas
//! - [`llm`]: Remote model providers used for AI-assisted extraction
//! - [`apply`]: Version bumps and the pending-update ledger
//! - [`fetch`]: Rate-limited content fetching
//! - [`pipeline`]: Analyze and check orchestration

pub mod apply;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod ebuild;
pub mod extract;
pub mod fetch;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod ratelimit;
pub mod store;
