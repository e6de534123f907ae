//! Authority expansion of common records.
//!
//! A linking field (`100`, `600`, `610`, `700`, `710`, `770`, `780`) points
//! at an authority record through subfields `5` and `6`. Expansion replaces
//! the link with the authority's heading (its field `100`) and turns the
//! authority's see/see-also fields into `900`/`910` cross-reference fields
//! pointing back at the linking field.
//!
//! # Examples
//!
//! ```
//! use std::collections::HashMap;
//! use rawrepo_marcx::{expand, Field, Record};
//!
//! let common = Record::builder()
//!     .field(
//!         Field::builder("700", "00")
//!             .subfield_str('5', "870979")
//!             .subfield_str('6', "68045678")
//!             .build(),
//!     )
//!     .build();
//! let authority = Record::builder()
//!     .field(Field::builder("100", "00").subfield_str('a', "Jensen").subfield_str('h', "Ib").build())
//!     .build();
//! let authorities = HashMap::from([("68045678".to_string(), authority)]);
//!
//! let expanded = expand::expand(&common, &authorities, false)?;
//! let field = &expanded["700"];
//! assert_eq!(field.get_subfield('a'), Some("Jensen"));
//! assert!(!field.has_subfield('6'));
//! # Ok::<(), rawrepo_marcx::ExpandError>(())
//! ```

use std::collections::{BTreeSet, HashMap};

use crate::error::{Error, ExpandError};
use crate::marcxchange::MarcxDocument;
use crate::record::{
    Field, Record, Subfield, AUTHORITY_ID_CODE, AUTHORITY_PRESENCE_CODE, DISAMBIGUATION_CODE,
};

/// Agency owning the authority records of a record collection.
pub const AUTHORITY_AGENCY_ID: &str = "870979";

/// The non-repeatable main entry linking tag.
const MAIN_ENTRY_TAG: &str = "100";

/// Repeatable linking tags, in processing order.
const REPEATABLE_TAGS: [&str; 6] = ["600", "610", "700", "710", "770", "780"];

/// Disambiguation value assigned when a record carries none.
const FIRST_INDICATOR: u64 = 1001;

const SEE: &str = "se";
const SEE_ALSO_LATER_NAME: &str = "se også under det senere navn";

/// Authority fields turned into cross references, with the tag they become.
const CROSS_REFERENCES: [(&str, &str); 4] =
    [("400", "900"), ("500", "900"), ("410", "910"), ("510", "910")];

/// Whether `tag` can link to an authority record
#[must_use]
pub fn is_linkable_tag(tag: &str) -> bool {
    tag == MAIN_ENTRY_TAG || REPEATABLE_TAGS.contains(&tag)
}

/// Identifiers of every authority record linked from `record`.
///
/// These are the records a caller must fetch before calling [`expand`].
#[must_use]
pub fn authority_ids(record: &Record) -> BTreeSet<String> {
    record
        .fields()
        .filter(|f| is_linkable_tag(&f.tag))
        .filter_map(Field::authority_id)
        .map(str::to_string)
        .collect()
}

/// Expand every linked field of `common` with content from `authorities`.
///
/// `authorities` is keyed by the authority identifier found in subfield `6`.
/// When `keep_link_subfields` is set the `5`/`6` subfields stay in the
/// expanded fields.
///
/// A record without links is returned unchanged.
///
/// # Errors
///
/// - [`ExpandError::InvalidIndicator`] if an `å` subfield is not a number
/// - [`ExpandError::AuthorityNotFound`] if a linked authority is absent
/// - [`ExpandError::MissingAuthorityHeading`] if a linked authority has no
///   field `100`
pub fn expand(
    common: &Record,
    authorities: &HashMap<String, Record>,
    keep_link_subfields: bool,
) -> Result<Record, ExpandError> {
    if !common.has_authority_links() {
        return Ok(common.clone());
    }
    tracing::debug!(
        fields = common.len(),
        authorities = authorities.len(),
        keep_link_subfields,
        "expanding record"
    );

    let mut expander = Expander {
        authorities,
        keep_link_subfields,
        next_indicator: next_indicator(common)?,
        linked: Vec::new(),
        references: Vec::new(),
    };

    for field in common.fields_by_tag(MAIN_ENTRY_TAG) {
        expander.main_entry(field)?;
    }
    for tag in REPEATABLE_TAGS {
        for field in common.fields_by_tag(tag) {
            expander.added_entry(field)?;
        }
    }

    let Expander {
        mut linked,
        references,
        ..
    } = expander;
    linked.extend(references);
    linked.extend(
        common
            .fields()
            .filter(|f| !is_linkable_tag(&f.tag))
            .cloned(),
    );

    let mut expanded = Record::from_fields(linked);
    sort_expanded(&mut expanded);
    tracing::debug!(fields = expanded.len(), "expansion complete");
    Ok(expanded)
}

/// Decode MarcXchange `content`, expand it and encode the result.
///
/// The root element and leader of `content` are kept.
///
/// # Errors
///
/// Returns [`Error::Codec`] if any document fails to decode and
/// [`Error::Expand`] if expansion fails.
pub fn expand_bytes(
    content: &[u8],
    authority_content: &HashMap<String, Vec<u8>>,
    keep_link_subfields: bool,
) -> Result<Vec<u8>, Error> {
    let mut document = MarcxDocument::parse(content)?;
    let authorities = authority_content
        .iter()
        .map(|(id, bytes)| Ok((id.clone(), MarcxDocument::parse(bytes)?.record)))
        .collect::<Result<HashMap<_, _>, Error>>()?;

    document.record = expand(&document.record, &authorities, keep_link_subfields)?;
    Ok(document.to_bytes()?)
}

/// Expand the record `record_id` of a collection holding it and its
/// authority records.
///
/// The common record is the one whose `001 *a` is `record_id`; every other
/// record owned by agency [`AUTHORITY_AGENCY_ID`] is used as an authority,
/// keyed by its `001 *a`. The map keys are ignored.
///
/// # Errors
///
/// Returns [`ExpandError::CommonRecordMissing`] if no record has id
/// `record_id`, and otherwise as [`expand`].
pub fn expand_collection(
    records: &HashMap<String, Record>,
    record_id: &str,
    keep_link_subfields: bool,
) -> Result<Record, ExpandError> {
    let mut common = None;
    let mut authorities = HashMap::new();

    for record in records.values() {
        let id = record.record_id();
        tracing::trace!(
            record_id = id.unwrap_or_default(),
            agency_id = record.agency_id().unwrap_or_default(),
            "found record in expand collection"
        );
        match id {
            Some(id) if id == record_id => common = Some(record),
            Some(id) if record.agency_id() == Some(AUTHORITY_AGENCY_ID) => {
                authorities.insert(id.to_string(), record.clone());
            }
            _ => {}
        }
    }

    let common = common.ok_or_else(|| ExpandError::CommonRecordMissing {
        id: record_id.to_string(),
    })?;
    expand(common, &authorities, keep_link_subfields)
}

/// One past the largest `å` value of the record, or [`FIRST_INDICATOR`].
fn next_indicator(record: &Record) -> Result<u64, ExpandError> {
    let mut max = None;
    for field in record.fields() {
        if let Some(value) = field.disambiguation() {
            let n: u64 = value.parse().map_err(|_| ExpandError::InvalidIndicator {
                tag: field.tag.clone(),
                value: value.to_string(),
            })?;
            let next = n.checked_add(1).ok_or_else(|| ExpandError::InvalidIndicator {
                tag: field.tag.clone(),
                value: value.to_string(),
            })?;
            max = max.max(Some(next));
        }
    }
    Ok(max.unwrap_or(FIRST_INDICATOR))
}

/// Stable sort by tag, then by `å` compared as a string.
fn sort_expanded(record: &mut Record) {
    record.fields.sort_by(|a, b| {
        a.tag
            .cmp(&b.tag)
            .then_with(|| a.disambiguation().unwrap_or("").cmp(b.disambiguation().unwrap_or("")))
    });
}

struct Expander<'a> {
    authorities: &'a HashMap<String, Record>,
    keep_link_subfields: bool,
    next_indicator: u64,
    linked: Vec<Field>,
    references: Vec<Field>,
}

impl<'a> Expander<'a> {
    fn main_entry(&mut self, field: &Field) -> Result<(), ExpandError> {
        let Some((authority, heading)) = self.resolve(field)? else {
            self.linked.push(field.clone());
            return Ok(());
        };

        let expanded = splice(field, heading, self.keep_link_subfields);
        if has_cross_references(authority) {
            self.add_cross_references(authority, heading, MAIN_ENTRY_TAG);
        }
        self.linked.push(expanded);
        Ok(())
    }

    fn added_entry(&mut self, field: &Field) -> Result<(), ExpandError> {
        let Some((authority, heading)) = self.resolve(field)? else {
            self.linked.push(field.clone());
            return Ok(());
        };

        let mut expanded = splice(field, heading, self.keep_link_subfields);
        if has_cross_references(authority) {
            let value = match field.disambiguation() {
                Some(existing) => existing.to_string(),
                None => {
                    let value = self.next_indicator.to_string();
                    self.next_indicator = self.next_indicator.checked_add(1).ok_or_else(|| {
                        ExpandError::InvalidIndicator {
                            tag: field.tag.clone(),
                            value: value.clone(),
                        }
                    })?;
                    expanded.insert_subfield(0, Subfield::new(DISAMBIGUATION_CODE, value.as_str()));
                    value
                }
            };
            let reference = format!("{}/{value}", field.tag);
            self.add_cross_references(authority, heading, &reference);
        }
        self.linked.push(expanded);
        Ok(())
    }

    /// The authority record and heading a field links to, if it is linked.
    fn resolve(&self, field: &Field) -> Result<Option<(&'a Record, &'a Field)>, ExpandError> {
        let Some(id) = field.authority_id() else {
            return Ok(None);
        };
        let authority = self.authorities.get(id).ok_or_else(|| {
            tracing::warn!(id, tag = %field.tag, "authority record not found");
            ExpandError::AuthorityNotFound { id: id.to_string() }
        })?;
        let heading = authority
            .get_field(MAIN_ENTRY_TAG)
            .ok_or_else(|| ExpandError::MissingAuthorityHeading { id: id.to_string() })?;
        Ok(Some((authority, heading)))
    }

    fn add_cross_references(&mut self, authority: &Record, heading: &Field, reference: &str) {
        let heading_text = heading_text(heading);
        for (source_tag, target_tag) in CROSS_REFERENCES {
            for source in authority.fields_by_tag(source_tag) {
                let mut field = Field::new(target_tag, "00");
                field
                    .subfields
                    .extend(source.subfields().filter(|sf| sf.code != 'w').cloned());
                let note = if source.has_subfield('w') {
                    SEE_ALSO_LATER_NAME
                } else {
                    SEE
                };
                field.add_subfield_str('x', note);
                field.add_subfield_str('w', &heading_text);
                field.add_subfield_str('z', reference);
                self.references.push(field);
            }
        }
    }
}

fn has_cross_references(authority: &Record) -> bool {
    CROSS_REFERENCES
        .iter()
        .any(|(source_tag, _)| authority.has_field(source_tag))
}

/// Splice the heading's subfields into `field` where its link was.
fn splice(field: &Field, heading: &Field, keep_link_subfields: bool) -> Field {
    let mut expanded = field.clone();
    let mut position = field.position_of(AUTHORITY_PRESENCE_CODE).unwrap_or(0);
    if keep_link_subfields {
        position += 2;
    } else {
        expanded.remove_subfields_where(|sf| {
            sf.code == AUTHORITY_PRESENCE_CODE || sf.code == AUTHORITY_ID_CODE
        });
    }
    let position = position.min(expanded.subfields.len());

    expanded
        .subfields
        .insert_many(position, heading.subfields().cloned());
    expanded.indicator = "00".to_string();
    expanded
}

/// `"<a>, <h> (<c>)"` from an authority heading.
fn heading_text(heading: &Field) -> String {
    let mut text = match (heading.get_subfield('a'), heading.get_subfield('h')) {
        (Some(a), Some(h)) => format!("{a}, {h}"),
        (Some(a), None) => a.to_string(),
        (None, Some(h)) => h.to_string(),
        (None, None) => String::new(),
    };
    if let Some(c) = heading.get_subfield('c') {
        text.push_str(&format!(" ({c})"));
    }
    text
}
