//! MarcXchange record structures and operations.
//!
//! This module provides the field model shared by the merge and expansion
//! engines:
//! - [`Record`]: An ordered list of data fields
//! - [`Field`]: A tag, an indicator string and ordered subfields
//! - [`Subfield`]: A one-character code and a value
//!
//! Unlike a MARC21 record keyed by tag, a [`Record`] keeps every field in one
//! sequence. Repeated tags are normal, and the relative order of fields is
//! what the merge and expansion engines reason about.
//!
//! # Examples
//!
//! ```
//! use rawrepo_marcx::{Field, Record};
//!
//! let record = Record::builder()
//!     .field(
//!         Field::builder("245", "00")
//!             .subfield_str('a', "Title")
//!             .build(),
//!     )
//!     .build();
//!
//! for field in record.fields_by_tag("245") {
//!     for value in field.subfields_by_code('a') {
//!         println!("Title: {value}");
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::ops::Index;

/// Subfield code marking a field as linked to an authority record.
pub const AUTHORITY_PRESENCE_CODE: char = '5';

/// Subfield code holding the identifier of the linked authority record.
pub const AUTHORITY_ID_CODE: char = '6';

/// Subfield code holding the disambiguation indicator of an expanded field.
pub const DISAMBIGUATION_CODE: char = 'å';

/// A MarcXchange record: an ordered sequence of data fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Data fields in document order
    pub fields: Vec<Field>,
}

/// A data field in a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field tag (3 characters)
    pub tag: String,
    /// Indicator string, normally two characters (`ind1` followed by `ind2`)
    pub indicator: String,
    /// Subfields (stored in `SmallVec` to avoid allocation for typical fields with 4 or fewer subfields)
    pub subfields: SmallVec<[Subfield; 4]>,
}

/// A subfield within a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subfield {
    /// Subfield code (single character)
    pub code: char,
    /// Subfield value
    pub value: String,
}

impl Subfield {
    /// Create a subfield
    #[must_use]
    pub fn new(code: char, value: impl Into<String>) -> Self {
        Subfield {
            code,
            value: value.into(),
        }
    }
}

impl Record {
    /// Create an empty record
    #[must_use]
    pub fn new() -> Self {
        Record { fields: Vec::new() }
    }

    /// Create a record from a list of fields, keeping their order
    #[must_use]
    pub fn from_fields(fields: Vec<Field>) -> Self {
        Record { fields }
    }

    /// Create a builder for fluently constructing records
    ///
    /// # Examples
    ///
    /// ```
    /// use rawrepo_marcx::{Field, Record};
    ///
    /// let record = Record::builder()
    ///     .field(Field::builder("001", "00").subfield_str('a', "12345678").build())
    ///     .field(Field::builder("245", "00").subfield_str('a', "Title").build())
    ///     .build();
    /// assert_eq!(record.len(), 2);
    /// ```
    #[must_use]
    pub fn builder() -> RecordBuilder {
        RecordBuilder {
            record: Record::new(),
        }
    }

    /// Append a data field
    pub fn add_field(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// Number of fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Get first field with a given tag
    #[must_use]
    pub fn get_field(&self, tag: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    /// Whether any field has the given tag
    #[must_use]
    pub fn has_field(&self, tag: &str) -> bool {
        self.get_field(tag).is_some()
    }

    /// Iterate over all fields in record order
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Iterate over fields matching a specific tag
    ///
    /// # Examples
    ///
    /// ```ignore
    /// for field in record.fields_by_tag("700") {
    ///     if let Some(name) = field.get_subfield('a') {
    ///         println!("Contributor: {}", name);
    ///     }
    /// }
    /// ```
    pub fn fields_by_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Field> + 'a {
        self.fields.iter().filter(move |f| f.tag == tag)
    }

    /// Get mutable reference to first field with a given tag
    pub fn get_field_mut(&mut self, tag: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.tag == tag)
    }

    /// Remove all fields with a given tag
    ///
    /// Returns the removed fields in record order.
    pub fn remove_fields_by_tag(&mut self, tag: &str) -> Vec<Field> {
        self.remove_fields_where(|f| f.tag == tag)
    }

    /// Remove fields matching a predicate
    ///
    /// Returns the removed fields in record order.
    pub fn remove_fields_where<F>(&mut self, predicate: F) -> Vec<Field>
    where
        F: Fn(&Field) -> bool,
    {
        let mut removed = Vec::new();
        self.fields.retain(|f| {
            if predicate(f) {
                removed.push(f.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Stable-sort the fields by tag.
    ///
    /// Fields sharing a tag keep their relative order.
    pub fn sort_by_tag(&mut self) {
        self.fields.sort_by(|a, b| a.tag.cmp(&b.tag));
    }

    /// Whether any field carries an authority link
    #[must_use]
    pub fn has_authority_links(&self) -> bool {
        self.fields.iter().any(Field::is_authority_linked)
    }

    /// Record id from `001 *a`
    #[must_use]
    pub fn record_id(&self) -> Option<&str> {
        self.get_field("001").and_then(|f| f.get_subfield('a'))
    }

    /// Agency id from `001 *b`
    #[must_use]
    pub fn agency_id(&self) -> Option<&str> {
        self.get_field("001").and_then(|f| f.get_subfield('b'))
    }
}

/// Enable dictionary-like access to Record fields using `record["245"]`.
///
/// Returns the first field with the given tag, or panics if not found.
/// For fallible access, use `Record::get_field()` instead.
impl Index<&str> for Record {
    type Output = Field;

    fn index(&self, tag: &str) -> &Self::Output {
        self.get_field(tag).expect("field not found")
    }
}

/// Builder for fluently constructing records
#[derive(Debug)]
pub struct RecordBuilder {
    record: Record,
}

impl RecordBuilder {
    /// Add a data field to the record being built
    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.record.add_field(field);
        self
    }

    /// Build the record
    #[must_use]
    pub fn build(self) -> Record {
        self.record
    }
}

impl Field {
    /// Create a new data field
    #[must_use]
    pub fn new(tag: impl Into<String>, indicator: impl Into<String>) -> Self {
        Field {
            tag: tag.into(),
            indicator: indicator.into(),
            subfields: SmallVec::new(),
        }
    }

    /// Create a builder for constructing fields fluently
    ///
    /// # Examples
    ///
    /// ```
    /// use rawrepo_marcx::Field;
    ///
    /// let field = Field::builder("700", "00")
    ///     .subfield_str('a', "Smith, John")
    ///     .subfield_str('5', "870979")
    ///     .subfield_str('6', "68432359")
    ///     .build();
    /// assert!(field.is_authority_linked());
    /// ```
    #[must_use]
    pub fn builder(tag: impl Into<String>, indicator: impl Into<String>) -> FieldBuilder {
        FieldBuilder {
            field: Field::new(tag, indicator),
        }
    }

    /// Add a subfield
    pub fn add_subfield(&mut self, code: char, value: String) {
        self.subfields.push(Subfield { code, value });
    }

    /// Add a subfield using a string slice
    ///
    /// Convenience method that converts &str to String automatically.
    pub fn add_subfield_str(&mut self, code: char, value: &str) {
        self.add_subfield(code, value.to_string());
    }

    /// Insert a subfield at `index`, shifting later subfields back
    ///
    /// # Panics
    ///
    /// Panics if `index` is greater than the number of subfields.
    pub fn insert_subfield(&mut self, index: usize, subfield: Subfield) {
        self.subfields.insert(index, subfield);
    }

    /// Get all values for a subfield code
    #[must_use]
    pub fn get_subfield_values(&self, code: char) -> Vec<&str> {
        self.subfields_by_code(code).collect()
    }

    /// Get first value for a subfield code
    #[must_use]
    pub fn get_subfield(&self, code: char) -> Option<&str> {
        self.subfields
            .iter()
            .find(|sf| sf.code == code)
            .map(|sf| sf.value.as_str())
    }

    /// Whether the field has a subfield with the given code
    #[must_use]
    pub fn has_subfield(&self, code: char) -> bool {
        self.subfields.iter().any(|sf| sf.code == code)
    }

    /// Position of the first subfield with the given code
    #[must_use]
    pub fn position_of(&self, code: char) -> Option<usize> {
        self.subfields.iter().position(|sf| sf.code == code)
    }

    /// Iterate over all subfields
    pub fn subfields(&self) -> impl Iterator<Item = &Subfield> {
        self.subfields.iter()
    }

    /// Iterate over subfields with a specific code
    ///
    /// # Examples
    ///
    /// ```ignore
    /// for value in field.subfields_by_code('a') {
    ///     println!("Author: {}", value);
    /// }
    /// ```
    pub fn subfields_by_code(&self, code: char) -> impl Iterator<Item = &str> {
        self.subfields
            .iter()
            .filter(move |sf| sf.code == code)
            .map(|sf| sf.value.as_str())
    }

    /// Whether the field links to an authority record.
    ///
    /// A field is linked when it carries both a presence subfield (`5`) and
    /// an identifier subfield (`6`).
    #[must_use]
    pub fn is_authority_linked(&self) -> bool {
        self.has_subfield(AUTHORITY_PRESENCE_CODE) && self.has_subfield(AUTHORITY_ID_CODE)
    }

    /// Identifier of the linked authority record (first `6` subfield)
    #[must_use]
    pub fn authority_id(&self) -> Option<&str> {
        if self.is_authority_linked() {
            self.get_subfield(AUTHORITY_ID_CODE)
        } else {
            None
        }
    }

    /// Value of the disambiguation subfield (`å`), if any
    #[must_use]
    pub fn disambiguation(&self) -> Option<&str> {
        self.get_subfield(DISAMBIGUATION_CODE)
    }

    // ============================================================================
    // Mutable subfield operations
    // ============================================================================

    /// Get mutable reference to first subfield with a given code
    pub fn get_subfield_mut(&mut self, code: char) -> Option<&mut Subfield> {
        self.subfields.iter_mut().find(|sf| sf.code == code)
    }

    /// Remove all subfields with a given code
    ///
    /// Returns the removed subfields.
    pub fn remove_subfields(&mut self, code: char) -> Vec<Subfield> {
        self.remove_subfields_where(|sf| sf.code == code)
    }

    /// Remove subfields matching a predicate
    ///
    /// Returns the removed subfields.
    pub fn remove_subfields_where<F>(&mut self, predicate: F) -> Vec<Subfield>
    where
        F: Fn(&Subfield) -> bool,
    {
        let mut removed = Vec::new();
        self.subfields.retain(|sf| {
            if predicate(sf) {
                removed.push(sf.clone());
                false
            } else {
                true
            }
        });
        removed
    }
}

/// Enable dictionary-like access to Field subfields using `field['a']`.
///
/// Returns the first subfield with the given code, or panics if not found.
/// For fallible access, use `Field::get_subfield()` instead.
impl Index<char> for Field {
    type Output = str;

    fn index(&self, code: char) -> &Self::Output {
        self.get_subfield(code).expect("subfield not found")
    }
}

/// Builder for fluently constructing fields
///
/// # Examples
///
/// ```
/// use rawrepo_marcx::Field;
///
/// let field = Field::builder("245", "00")
///     .subfield('a', "Title".to_string())
///     .subfield_str('b', "Subtitle")
///     .build();
/// assert_eq!(field.subfields.len(), 2);
/// ```
#[derive(Debug)]
pub struct FieldBuilder {
    field: Field,
}

impl FieldBuilder {
    /// Add a subfield to the field being built
    #[must_use]
    pub fn subfield(mut self, code: char, value: String) -> Self {
        self.field.add_subfield(code, value);
        self
    }

    /// Add a subfield using a string slice
    #[must_use]
    pub fn subfield_str(mut self, code: char, value: &str) -> Self {
        self.field.add_subfield_str(code, value);
        self
    }

    /// Build the field
    #[must_use]
    pub fn build(self) -> Field {
        self.field
    }
}
