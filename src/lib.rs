//! # Paperchat
//!
//! A PDF question-answering service: upload a PDF, have it chunked and
//! embedded into a vector index, then ask questions about it and get
//! answers grounded in the document with page-level citations.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────┐   ┌─────────────┐   ┌────────────┐
//! │ Upload │──▶│  Job queue   │──▶│   Worker    │
//! │  API   │   │  (SQLite)   │   │ extract →   │
//! └────────┘   └─────────────┘   │ chunk →     │
//!                                │ embed →     │
//! ┌────────┐   ┌─────────────┐   │ index       │
//! │  Chat  │──▶│  Retrieval   │◀──└────────────┘
//! │  API   │   │ (top-K, per │
//! └────────┘   │  document)  │──▶ LLM answer + citations
//!              └─────────────┘
//! ```
//!
//! The API accepts uploads and returns immediately; a separate worker
//! process (`paperchat work`) claims ingestion jobs from a durable SQLite
//! queue. Embeddings, the vector index, and the language model are
//! external services reached over REST.
//!
//! ## Quick Start
//!
//! ```bash
//! paperchat init                # create database
//! paperchat serve               # start the HTTP API
//! paperchat work                # start the ingestion worker
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF page-text extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector`] | Vector index client (Qdrant / in-memory) |
//! | [`llm`] | Chat model client |
//! | [`answer`] | Retrieval-augmented answering |
//! | [`queue`] | Durable job queue |
//! | [`ingest`] | Ingestion and purge workers |
//! | [`history`] | Conversation threads |
//! | [`auth`] | Bearer-token authentication |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod auth;
pub mod chunk;
pub mod config;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod history;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod queue;
pub mod server;
pub mod vector;
