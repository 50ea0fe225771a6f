//! Reader and indexer for ABBYY Lingvo DSL dictionaries.
//!
//! The crate ingests `.dsl` / `.dsl.dz` sources, builds a persistent
//! on-disk index (headword B-tree + chunked article metadata) and serves
//! lookup and HTML-rendering requests against that index.

pub mod dsl;

pub use crate::dsl::error::{DslError, Result};
pub use crate::dsl::models::{DslConfig, DslEncoding};
pub use crate::dsl::{make_dictionaries, CancelFlag, DslDictionary};
