//! # Docket
//!
//! Version resolution and field reconciliation for folders of scanned legal
//! documents.
//!
//! A case folder holds every deed, registration, publication and identity
//! document collected for one company, in no particular order. Docket reads
//! the folder, classifies each document, orders each category into a
//! version history, diffs adjacent versions, and reconciles a structured
//! report where the newest document wins and older ones fill the gaps.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌────────────┐   ┌────────────┐
//! │  Folder  │──▶│   OCR    │──▶│  Classify  │──▶│ Partition  │
//! │  scan    │   │ (+cache) │   │            │   │ + Version  │
//! └──────────┘   └──────────┘   └────────────┘   └─────┬──────┘
//!                                                      │
//!                                   ┌──────────────────┤
//!                                   ▼                  ▼
//!                            ┌────────────┐     ┌────────────┐
//!                            │  Compare   │     │ Reconcile  │
//!                            │ (adjacent) │     │  (report)  │
//!                            └────────────┘     └────────────┘
//! ```
//!
//! Every stage writes a JSON artifact to the results directory.
//!
//! ## Quick Start
//!
//! ```bash
//! docket caso_42                              # data/caso_42, offline defaults
//! docket caso_42 --config config/docket.toml  # OCR and LLM providers from config
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Collaborator and stage errors |
//! | [`traits`] | OCR, classifier, extractor and differ interfaces |
//! | [`retry`] | Timeout and backoff decorator for collaborators |
//! | [`scan`] | Folder discovery |
//! | [`ocr`] | Local and Azure OCR providers |
//! | [`cache`] | Content-addressed OCR cache |
//! | [`llm`] | Language-model collaborators |
//! | [`classify`] | Categories, keyword classifier, date normalization |
//! | [`partition`] | Category buckets |
//! | [`versioning`] | Chronological version assignment |
//! | [`reconcile`] | Newest-wins field reconciliation |
//! | [`compare`] | Adjacent-version diffs |
//! | [`report`] | Legal report schemas and assembly |
//! | [`artifacts`] | Per-stage JSON output |
//! | [`pipeline`] | Stage coordinator |

pub mod artifacts;
pub mod cache;
pub mod classify;
pub mod compare;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod partition;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod retry;
pub mod scan;
pub mod traits;
pub mod versioning;
