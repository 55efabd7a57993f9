//! # vellum - Document Layer over Transactional Key-Value Storage
//!
//! vellum exposes structured JSON-like documents on top of any batched
//! key-value engine. Documents are addressed by `(collection, key)`, stored
//! as compact MessagePack blobs, and reconstituted on demand into the
//! caller's format of choice: JSON text, MessagePack, BSON, CBOR, UBJSON,
//! or raw bytes. This implementation prioritizes:
//!
//! - **One read, one parse**: batched calls deduplicate keys before the KV
//!   engine sees them and parse each unique document at most once
//! - **Zero steady-state allocation**: all per-call memory - parsed trees,
//!   output tapes, columnar buffers - lives in a caller-owned bump arena
//!   released wholesale on return
//! - **Order fidelity**: output slot i always answers input tuple i, no
//!   matter how duplicated or shuffled the input was
//!
//! ## Quick Start
//!
//! ```
//! use vellum::{Arena, DocId, DocStore, Format, MemoryKv};
//!
//! # fn main() -> eyre::Result<()> {
//! let store = DocStore::new(MemoryKv::new());
//! let arena = Arena::new();
//!
//! let id = DocId::at(42);
//! store.docs_write(
//!     &arena,
//!     None,
//!     &[id],
//!     None,
//!     Format::Json,
//!     &[Some(br#"{"a":1,"b":"x"}"#.as_slice())],
//! )?;
//!
//! let tape = store.docs_read(&arena, None, &[id], None, Format::Msgpack)?;
//! assert!(tape.view().is_present(0));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │   DocStore: docs_read / docs_write / docs_gist /     │
//! │             docs_gather                              │
//! ├──────────────────────────────────────────────────────┤
//! │  Field addressing (RFC 6901) │ Patches (6902 / 7396) │
//! ├──────────────────────────────────────────────────────┤
//! │  Codecs: json · msgpack · bson · cbor · ubjson · raw │
//! ├──────────────────────────────────────────────────────┤
//! │  Batch planner │ Tape │ Arena                        │
//! ├──────────────────────────────────────────────────────┤
//! │  KvStore trait (any engine; MemoryKv included)       │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency Model
//!
//! A call runs on one thread, suspends only inside the KV engine, and owns
//! its arena exclusively. Parallelism comes from issuing concurrent calls,
//! typically one transaction each; isolation and conflict detection are
//! the engine's (see [`MemoryKv`] for the reference semantics).
//!
//! ## Module Overview
//!
//! - [`memory`]: per-call arena and the (presence, offsets, lengths, bytes)
//!   output tape
//! - [`types`]: document values, ids, formats, gather element types
//! - [`codec`]: parse/dump across all wire formats
//! - [`fields`]: JSON Pointer compilation, lookup, and patch application
//! - [`batch`]: read deduplication and order restoration
//! - [`kv`]: the engine trait and the in-memory reference engine
//! - [`store`]: the batched document operations

pub mod batch;
pub mod codec;
pub mod config;
pub mod error;
pub mod fields;
pub mod kv;
pub mod memory;
pub mod store;
pub mod types;

pub use error::{DocError, ErrorKind};
pub use kv::{KvStore, MemoryKv, MemoryTxn};
pub use memory::{Arena, Tape, TapeView};
pub use store::{ColumnData, DocStore, Gather, GatherColumn, Gist};
pub use types::{Collection, Doc, DocId, ElementType, Format};
