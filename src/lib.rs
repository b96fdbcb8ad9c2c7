//! # askdoc
//!
//! A session-scoped document question-answering pipeline with graceful
//! degradation.
//!
//! askdoc ingests one document per session entry (already extracted to text
//! by an external loader), chunks and embeds it, and answers natural-language
//! questions grounded in that document's content — citing source location,
//! and degrading gracefully when embedding or generation services are
//! unavailable. Everything lives in memory with active TTL eviction; nothing
//! is persisted.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────┐   ┌───────────────┐
//! │ Raw text │──▶│ normalize → chunk →   │──▶│ Session Store  │
//! │ (+pages) │   │ embed → index         │   │ TTL + capacity │
//! └──────────┘   └───────────────────────┘   └───────┬───────┘
//!                                                    │
//!                  ┌─────────────────────────────────┤
//!                  ▼                                 ▼
//!           ┌─────────────┐                  ┌──────────────┐
//!           │  Retriever   │── vector ──┐    │ Conversation  │
//!           │ (vec│lexical)│── lexical ─┤    │ history (N)   │
//!           └─────────────┘            ▼    └──────────────┘
//!                               ┌──────────────┐
//!                               │   Composer    │──▶ answer + sources
//!                               │ LLM│extractive│
//!                               └──────────────┘
//! ```
//!
//! ## Degradation ladder
//!
//! Each failure mode has its own fallback; they never collapse into one
//! "service unavailable" response:
//!
//! | Failure | Fallback |
//! |---------|----------|
//! | Embedding API down (per batch) | zero-vectors, flagged per chunk |
//! | Question embedding down | lexical keyword retrieval |
//! | Vector search empty | lexical keyword retrieval |
//! | Lexical also empty | explicit "cannot find this information" |
//! | Generation down / timed out | deterministic extractive excerpt |
//!
//! ## Quick start
//!
//! ```bash
//! askdoc ask --file invoice.txt "What is the total amount?"
//! askdoc chat --file contract.txt          # interactive multi-turn
//! askdoc chunks --file contract.txt        # inspect chunking output
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Caller-facing and provider error taxonomy |
//! | [`text`] | Normalization, sentences, header detection |
//! | [`chunk`] | Overlapping sentence-boundary chunker |
//! | [`embedding`] | Embedding providers + zero-vector fallback |
//! | [`generation`] | Generation providers (primary/fallback model) |
//! | [`index`] | Per-document in-memory vector index |
//! | [`retrieve`] | Vector/lexical retrieval and grounding resolution |
//! | [`answer`] | Grounded prompt assembly and fallback composition |
//! | [`store`] | Session store with active TTL eviction |
//! | [`engine`] | The ingest/ask/evict facade |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generation;
pub mod index;
pub mod models;
pub mod retrieve;
pub mod store;
pub mod text;
