// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # ontoprofile
//!
//! An ontology-to-schema compiler: turns OWL/RDFS graphs into typed
//! application profiles (types, attributes, cardinalities and ranges).
//!
//! ## Architecture
//!
//! - **Graph** (`graph`): BTree-indexed triples plus an oxigraph store for templates
//! - **Expansion** (`expansion`): named CONSTRUCT rules run to a fixpoint
//! - **Classification** (`classify`): an ordered decision list turns nodes into facts
//! - **Fact store** (`facts`): append-only ledger with retire-with-reason semantics
//! - **Resolution** (`resolve`): facts become the schema model
//! - **Normalization** (`normalize`): canonical cardinalities and simplified ranges
//! - **Diagnostics** (`diagnostics`): unresolved constructs, warnings and coverage
//!
//! ## Library usage
//!
//! ```no_run
//! use ontoprofile::graph::load_graph;
//! use ontoprofile::pipeline::compile;
//!
//! let graph = load_graph("ontology.ttl".as_ref()).unwrap();
//! let compilation = compile(&graph).unwrap();
//! for type_def in compilation.model.types() {
//!     println!("{} ({} attributes)", type_def.class_id, type_def.attributes().count());
//! }
//! println!("coverage: {:.1}%", compilation.diagnostics.coverage().ratio() * 100.0);
//! ```

pub mod classify;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod expansion;
pub mod facts;
pub mod graph;
pub mod normalize;
pub mod pipeline;
pub mod resolve;
pub mod schema;

pub use config::CompilerConfig;
pub use diagnostics::Diagnostics;
pub use error::{CompileError, ProfileError, ProfileResult};
pub use pipeline::{compile, Compilation, Compiler};
pub use schema::SchemaModel;
