//! Record kinds and the enrichment compatibility table.
//!
//! Stored records carry a mime string naming their content category. Only
//! an enrichment can be overlaid on another record, and the overlay never
//! changes the category of the record it enriches: an article stays an
//! article.
//!
//! # Examples
//!
//! ```
//! use rawrepo_marcx::mime::{can_merge, merged_mime, MimeKind};
//!
//! let original: MimeKind = "text/article+marcxchange".parse().unwrap();
//! assert!(can_merge(original, MimeKind::Enrichment));
//! assert_eq!(merged_mime(original, MimeKind::Enrichment).unwrap(), MimeKind::Article);
//! assert!(merged_mime(original, MimeKind::Plain).is_err());
//! ```

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MergeError;

/// Content category of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum MimeKind {
    /// Plain bibliographic record (`text/marcxchange`)
    Plain,
    /// Article (`text/article+marcxchange`)
    Article,
    /// Authority record (`text/authority+marcxchange`)
    Authority,
    /// Literature analysis (`text/litanalysis+marcxchange`)
    LiteratureAnalysis,
    /// Material assessment (`text/matvurd+marcxchange`)
    MaterialAssessment,
    /// Host publication (`text/hostpub+marcxchange`)
    HostPublication,
    /// Simple record (`text/simple+marcxchange`)
    Simple,
    /// Enrichment layer (`text/enrichment+marcxchange`)
    Enrichment,
    /// Anything else
    Unknown,
}

impl MimeKind {
    /// Every kind, in declaration order
    pub const ALL: [MimeKind; 9] = [
        MimeKind::Plain,
        MimeKind::Article,
        MimeKind::Authority,
        MimeKind::LiteratureAnalysis,
        MimeKind::MaterialAssessment,
        MimeKind::HostPublication,
        MimeKind::Simple,
        MimeKind::Enrichment,
        MimeKind::Unknown,
    ];

    /// The mime string stored alongside the record
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MimeKind::Plain => "text/marcxchange",
            MimeKind::Article => "text/article+marcxchange",
            MimeKind::Authority => "text/authority+marcxchange",
            MimeKind::LiteratureAnalysis => "text/litanalysis+marcxchange",
            MimeKind::MaterialAssessment => "text/matvurd+marcxchange",
            MimeKind::HostPublication => "text/hostpub+marcxchange",
            MimeKind::Simple => "text/simple+marcxchange",
            MimeKind::Enrichment => "text/enrichment+marcxchange",
            MimeKind::Unknown => "unknown",
        }
    }

    /// Whether the kind is one an enrichment can be overlaid on
    #[must_use]
    pub const fn accepts_enrichment(self) -> bool {
        match self {
            MimeKind::Plain
            | MimeKind::Article
            | MimeKind::Authority
            | MimeKind::LiteratureAnalysis
            | MimeKind::MaterialAssessment
            | MimeKind::HostPublication
            | MimeKind::Simple => true,
            MimeKind::Enrichment | MimeKind::Unknown => false,
        }
    }

    /// Whether the kind is a complete MarcXchange record (plain or authority)
    #[must_use]
    pub const fn is_marcxchange(self) -> bool {
        matches!(self, MimeKind::Plain | MimeKind::Authority)
    }

    /// Whether the kind is an enrichment layer
    #[must_use]
    pub const fn is_enrichment(self) -> bool {
        matches!(self, MimeKind::Enrichment)
    }
}

impl fmt::Display for MimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MimeKind {
    type Err = Infallible;

    /// Unrecognized strings parse as [`MimeKind::Unknown`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(MimeKind::ALL
            .into_iter()
            .find(|kind| *kind != MimeKind::Unknown && kind.as_str() == s)
            .unwrap_or(MimeKind::Unknown))
    }
}

impl From<String> for MimeKind {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

impl From<MimeKind> for String {
    fn from(kind: MimeKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Whether an `enrichment` record can be merged onto an `original` record.
#[must_use]
pub const fn can_merge(original: MimeKind, enrichment: MimeKind) -> bool {
    enrichment.is_enrichment() && original.accepts_enrichment()
}

/// The kind of the record produced by merging `enrichment` onto `original`.
///
/// # Errors
///
/// Returns [`MergeError::IncompatibleMimeTypes`] when
/// [`can_merge`] is false for the pair.
pub fn merged_mime(original: MimeKind, enrichment: MimeKind) -> Result<MimeKind, MergeError> {
    if can_merge(original, enrichment) {
        Ok(original)
    } else {
        Err(MergeError::IncompatibleMimeTypes {
            original: original.to_string(),
            enrichment: enrichment.to_string(),
        })
    }
}
