#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! ## Modules
//!
//! - [`record`]: Field model (`Record`, `Field`, `Subfield`)
//! - [`marcxchange`]: MarcXchange XML reading and writing
//! - [`field_rules`]: Merge rule sets and per-merge working sets
//! - [`fixup`]: Post-merge transforms
//! - [`merger`]: Overlaying an enrichment record onto a common record
//! - [`mime`]: Record kinds and merge compatibility
//! - [`expand`]: Authority expansion
//! - [`batch`]: Parallel merge/expansion with Rayon
//! - [`config`]: TOML rule-set configuration
//! - [`error`]: Error types and result type
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events (`debug` per merge/expansion, `trace`
//! per dropped field, `warn` on a missing authority record) and never
//! installs a subscriber.

pub mod batch;
pub mod config;
pub mod error;
pub mod expand;
pub mod field_rules;
pub mod fixup;
pub mod marcxchange;
pub mod merger;
pub mod mime;
/// Field model (`Record`, `Field`, `Subfield`)
pub mod record;

pub use config::RulesConfig;
pub use error::{
    CodecError, ConfigError, Error, ExpandError, MergeError, Result, RulesError,
};
pub use expand::{authority_ids, expand_bytes, expand_collection};
pub use field_rules::{FieldRules, RuleWorkingSet};
pub use fixup::{Highest001cFixup, MergeFixup};
pub use marcxchange::{decode_record, encode_record, MarcxDocument};
pub use merger::{merge, merge_records, MarcxMerger};
pub use mime::{can_merge, merged_mime, MimeKind};
pub use record::{Field, FieldBuilder, Record, RecordBuilder, Subfield};
