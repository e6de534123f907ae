//! Common test helpers shared across the integration suite.

use rawrepo_marcx::{Field, Record};

/// Builds a field from `(code, value)` pairs.
#[allow(dead_code)]
pub fn field(tag: &str, indicator: &str, subfields: &[(char, &str)]) -> Field {
    let mut field = Field::new(tag, indicator);
    for (code, value) in subfields {
        field.add_subfield_str(*code, value);
    }
    field
}

/// Builds a record with an `001` identifying it as `id` of `agency`.
#[allow(dead_code)]
pub fn identified_record(id: &str, agency: &str, fields: Vec<Field>) -> Record {
    let mut record = Record::new();
    record.add_field(field("001", "00", &[('a', id), ('b', agency)]));
    for f in fields {
        record.add_field(f);
    }
    record
}

/// Wraps datafield markup in a prefixed MarcXchange record with a leader.
#[allow(dead_code)]
pub fn marcx_document(datafields: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<marcx:record xmlns:marcx="info:lc/xmlns/marcxchange-v1" format="danMARC2" type="Bibliographic">
  <marcx:leader>00000n    2200000   4500</marcx:leader>
{datafields}
</marcx:record>"#
    )
}

/// Markup for one datafield with `(code, value)` subfields.
#[allow(dead_code)]
pub fn datafield(tag: &str, subfields: &[(char, &str)]) -> String {
    let subfields: String = subfields
        .iter()
        .map(|(code, value)| format!(r#"    <marcx:subfield code="{code}">{value}</marcx:subfield>"#))
        .collect::<Vec<_>>()
        .join("\n");
    format!("  <marcx:datafield tag=\"{tag}\" ind1=\"0\" ind2=\"0\">\n{subfields}\n  </marcx:datafield>")
}

/// `(tag, first *a)` pairs of a record, for order assertions.
#[allow(dead_code)]
pub fn tag_values(record: &Record) -> Vec<(String, String)> {
    record
        .fields()
        .map(|f| {
            (
                f.tag.clone(),
                f.get_subfield('a').unwrap_or_default().to_string(),
            )
        })
        .collect()
}
