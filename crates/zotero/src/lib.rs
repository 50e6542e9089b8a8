//! bibsync Zotero adapter.
//!
//! Implements the [`pipeline::ReferenceSource`] trait for the Zotero Web API
//! (v3). The library is exported as BibTeX page by page; each page is parsed
//! with the domain bibliography parser.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** All HTTP transport, request formatting, pagination,
//! rate-limit header handling, and exponential back-off live here. The
//! [`pipeline`] crate sees only [`pipeline::ReferenceSource`].
//!
//! ## Credentials
//!
//! The API key travels in the `Zotero-API-Key` header. The library owner id is
//! part of the request path, so every URL that ends up in an error or a log
//! line has it replaced by `***`.

mod client;

pub use client::{LibraryKind, ZoteroClient, ZoteroConfig, DEFAULT_BASE_URL};
