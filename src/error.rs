//! Rich diagnostic error types for the ontoprofile compiler.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. Only fatal problems travel through these
//! types; recoverable findings go to the [`Diagnostics`](crate::diagnostics::Diagnostics)
//! ledger returned alongside the compiled schema.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the ontoprofile crate.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum ProfileError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("SPARQL store error: {message}")]
    #[diagnostic(
        code(ontoprofile::graph::sparql),
        help(
            "The oxigraph store rejected an operation. \
             This usually points at an invalid IRI or blank node identifier in the input."
        )
    )]
    Sparql { message: String },

    #[error("query template failed: {message}")]
    #[diagnostic(
        code(ontoprofile::graph::template),
        help(
            "Expansion and cleanup templates must be valid SPARQL CONSTRUCT queries. \
             Check the PREFIX declarations and the graph pattern syntax."
        )
    )]
    Template { message: String },

    #[error("invalid RDF term {term}: {message}")]
    #[diagnostic(
        code(ontoprofile::graph::invalid_term),
        help("IRIs must be absolute and blank node identifiers must be plain names.")
    )]
    InvalidTerm { term: String, message: String },

    #[error("literal {term} cannot appear in subject position")]
    #[diagnostic(
        code(ontoprofile::graph::literal_subject),
        help("Only named and blank nodes can be triple subjects.")
    )]
    LiteralSubject { term: String },

    #[error("failed to parse RDF input: {message}")]
    #[diagnostic(
        code(ontoprofile::graph::parse),
        help("Check the input syntax. The format is chosen from the file extension (ttl, nt, rdf, owl).")
    )]
    Parse { message: String },

    #[error("unsupported RDF format for {path}")]
    #[diagnostic(
        code(ontoprofile::graph::format),
        help("Supported extensions: .ttl, .nt, .rdf, .owl, .xml.")
    )]
    UnsupportedFormat { path: String },

    #[error("failed to read {path}")]
    #[diagnostic(
        code(ontoprofile::graph::io),
        help("Check that the file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Compile errors (structural, fatal)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum CompileError {
    #[error("malformed expansion rule '{rule_name}': {message}")]
    #[diagnostic(
        code(ontoprofile::compile::rule_template),
        help(
            "Every expansion rule needs a non-empty CONSTRUCT template for `expand`; \
             `cleanup` is optional but must also be a CONSTRUCT template."
        )
    )]
    RuleTemplate { rule_name: String, message: String },

    #[error("expansion did not reach a fixpoint within {max_passes} passes")]
    #[diagnostic(
        code(ontoprofile::compile::expansion_diverged),
        help(
            "A rule keeps producing new triples. Templates that mint blank nodes \
             never converge; otherwise raise `expansion.max_passes`."
        )
    )]
    ExpansionDiverged { max_passes: usize },

    #[error("the ontology graph has no owl:Ontology declaration")]
    #[diagnostic(
        code(ontoprofile::compile::missing_ontology),
        help("Add exactly one `<uri> a owl:Ontology` triple to the input.")
    )]
    MissingOntology,

    #[error("the ontology graph declares {count} ontologies: {uris}")]
    #[diagnostic(
        code(ontoprofile::compile::multiple_ontologies),
        help("Compile one ontology at a time; split the input or drop the extra declarations.")
    )]
    MultipleOntologies { count: usize, uris: String },

    #[error("fact {id} was used after retirement ({reason})")]
    #[diagnostic(
        code(ontoprofile::compile::fact_retired),
        help("This is an internal invariant violation. Please file a bug report with the input ontology.")
    )]
    FactRetired { id: usize, reason: String },

    #[error("fact {id} does not exist")]
    #[diagnostic(
        code(ontoprofile::compile::unknown_fact),
        help("This is an internal invariant violation. Please file a bug report with the input ontology.")
    )]
    UnknownFact { id: usize },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(ontoprofile::config::read),
        help("Ensure the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    #[diagnostic(
        code(ontoprofile::config::parse),
        help("Check the TOML syntax. Unknown keys are rejected.")
    )]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(ontoprofile::config::invalid))]
    Invalid { message: String },
}

/// Convenience result alias for compiler operations.
pub type CompileResult<T> = std::result::Result<T, CompileError>;

/// Convenience result alias for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Convenience result alias for the crate facade.
pub type ProfileResult<T> = std::result::Result<T, ProfileError>;
