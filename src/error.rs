//! Error types for merge and expansion operations.
//!
//! Each engine has its own error enum so callers can match on exactly the
//! failures that engine produces. [`Error`] wraps all of them for code that
//! drives several engines and only needs to propagate, together with the
//! [`Result`] convenience type.

use std::path::PathBuf;

use thiserror::Error;

/// Error raised while reading or writing MarcXchange documents.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The document is not well-formed XML.
    #[error("Malformed XML: {0}")]
    Xml(String),

    /// The outermost element is not a MarcXchange `record`.
    #[error("Outermost element is {found}, expected {{info:lc/xmlns/marcxchange-v1}}record")]
    NotARecord {
        /// Namespace-qualified name of the element that was found
        found: String,
    },

    /// A required attribute is absent.
    #[error("Element <{element}> is missing attribute '{attribute}'")]
    MissingAttribute {
        /// Local name of the element
        element: String,
        /// Name of the missing attribute
        attribute: String,
    },

    /// A subfield code is empty or longer than one character.
    #[error("Invalid subfield code: '{0}'")]
    InvalidSubfieldCode(String),

    /// Start and end tags do not pair up, or there is no root element.
    #[error("Unbalanced document: {0}")]
    UnbalancedDocument(String),
}

impl From<quick_xml::Error> for CodecError {
    fn from(err: quick_xml::Error) -> Self {
        CodecError::Xml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for CodecError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        CodecError::Xml(err.to_string())
    }
}

/// Error raised by the merge engine and the mime-compatibility table.
#[derive(Error, Debug)]
pub enum MergeError {
    /// An input's outermost element is not a MarcXchange `record`.
    #[error("Not a MarcXchange record: outermost element is {found}")]
    NotARecord {
        /// Namespace-qualified name of the element that was found
        found: String,
    },

    /// An input could not be parsed, or the output could not be written.
    #[error("Record merge error: {0}")]
    ParseFailure(String),

    /// The two mime kinds cannot be merged.
    #[error("Cannot figure out mimetype of: {original}&{enrichment}")]
    IncompatibleMimeTypes {
        /// Mime string of the original record
        original: String,
        /// Mime string of the enrichment record
        enrichment: String,
    },
}

impl From<CodecError> for MergeError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::NotARecord { found } => MergeError::NotARecord { found },
            other => MergeError::ParseFailure(other.to_string()),
        }
    }
}

/// Error raised by authority expansion.
///
/// Every variant is fatal for the whole expansion: no partially expanded
/// record is ever returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpandError {
    /// A linking field references an authority that was not supplied.
    #[error("Authority record '{id}' was not found while expanding the common record")]
    AuthorityNotFound {
        /// The identifier from subfield 6
        id: String,
    },

    /// A disambiguation subfield (`å`) is not an unsigned integer.
    #[error("Invalid value in {tag} *å: expected a number but got '{value}'")]
    InvalidIndicator {
        /// Tag of the field carrying the value
        tag: String,
        /// The offending value
        value: String,
    },

    /// The authority record has no field 100 to take the heading from.
    #[error("Authority record '{id}' has no field 100")]
    MissingAuthorityHeading {
        /// The authority identifier
        id: String,
    },

    /// The record collection does not contain the requested common record.
    #[error("The record collection doesn't contain a common record with id '{id}'")]
    CommonRecordMissing {
        /// The requested record id
        id: String,
    },
}

/// Error raised while building a [`crate::FieldRules`].
#[derive(Error, Debug)]
pub enum RulesError {
    /// A tag appears in more than one replacement group.
    #[error("Error initializing replacement groups, field: {tag} is repeated")]
    DuplicateGroupTag {
        /// The repeated tag
        tag: String,
    },

    /// The tag validity pattern does not compile.
    #[error("Invalid tag pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Error raised while loading rule-set configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("Could not read {}: {source}", .path.display())]
    Io {
        /// Path of the configuration file
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The configuration is not valid TOML or has unknown keys.
    #[error("Invalid configuration{}: {message}", .path.as_ref().map(|p| format!(" in {}", p.display())).unwrap_or_default())]
    Parse {
        /// Path of the configuration file, when read from disk
        path: Option<PathBuf>,
        /// Parser message, including the line number when known
        message: String,
    },

    /// The configured rules are inconsistent.
    #[error(transparent)]
    Rules(#[from] RulesError),
}

/// Error type covering every operation of the crate.
#[derive(Error, Debug)]
pub enum Error {
    /// See [`CodecError`].
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// See [`MergeError`].
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// See [`ExpandError`].
    #[error(transparent)]
    Expand(#[from] ExpandError),

    /// See [`RulesError`].
    #[error(transparent)]
    Rules(#[from] RulesError),

    /// See [`ConfigError`].
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Convenience type alias for [`std::result::Result`] with [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
