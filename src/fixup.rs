//! Post-merge fixups.
//!
//! A fixup runs after the merge-join step and may adjust the merged record
//! using both input layers. Fixups are attached to a
//! [`FieldRules`](crate::FieldRules) with
//! [`with_fixup`](crate::FieldRules::with_fixup) and run in the order they
//! were added. The default rule sets carry none.
//!
//! Any `Fn(&mut Record, &Record, &Record) + Send + Sync` closure is a fixup:
//!
//! ```
//! use rawrepo_marcx::{FieldRules, Record};
//!
//! let rules = FieldRules::danmarc2().with_fixup(
//!     |merged: &mut Record, _common: &Record, _local: &Record| {
//!         merged.remove_fields_by_tag("990");
//!     },
//! );
//! assert_eq!(rules.fixups().len(), 1);
//! ```

use crate::record::Record;

/// A transform applied to the merged record.
pub trait MergeFixup: Send + Sync {
    /// Adjust `merged`, given the common and enrichment records it came from.
    fn fix(&self, merged: &mut Record, common: &Record, local: &Record);
}

impl<F> MergeFixup for F
where
    F: Fn(&mut Record, &Record, &Record) + Send + Sync,
{
    fn fix(&self, merged: &mut Record, common: &Record, local: &Record) {
        self(merged, common, local);
    }
}

/// danMARC2 `001 *c` fixup: the merged record carries the larger of the
/// common and enrichment `001 *c` values.
///
/// `001 *c` holds the record's last-modified timestamp
/// (`yyyymmddhhmmss`). Since `001` is a replacement group the merged value
/// comes from the enrichment alone, which may be older than the common
/// record. The fixup only acts when all three records carry a numeric
/// `001 *c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Highest001cFixup;

impl MergeFixup for Highest001cFixup {
    fn fix(&self, merged: &mut Record, common: &Record, local: &Record) {
        let Some(common_c) = first_001c(common) else {
            return;
        };
        let Some(local_c) = first_001c(local) else {
            return;
        };
        let (Ok(common_n), Ok(local_n)) = (common_c.parse::<u64>(), local_c.parse::<u64>()) else {
            tracing::debug!(common_c, local_c, "skipping 001 *c fixup on non-numeric value");
            return;
        };
        let newest = if common_n > local_n { common_c } else { local_c };

        if let Some(subfield) = merged
            .get_field_mut("001")
            .and_then(|field| field.get_subfield_mut('c'))
        {
            subfield.value = newest.to_string();
        }
    }
}

fn first_001c(record: &Record) -> Option<&str> {
    record.get_field("001").and_then(|f| f.get_subfield('c'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Field;

    fn record_001(c: &str) -> Record {
        Record::builder()
            .field(
                Field::builder("001", "00")
                    .subfield_str('a', "12345678")
                    .subfield_str('c', c)
                    .build(),
            )
            .build()
    }

    #[test]
    fn test_common_newer_wins() {
        let common = record_001("20200101120000");
        let local = record_001("20190101120000");
        let mut merged = local.clone();
        Highest001cFixup.fix(&mut merged, &common, &local);
        assert_eq!(merged["001"].get_subfield('c'), Some("20200101120000"));
    }

    #[test]
    fn test_local_newer_wins() {
        let common = record_001("20190101120000");
        let local = record_001("20200101120000");
        let mut merged = common.clone();
        Highest001cFixup.fix(&mut merged, &common, &local);
        assert_eq!(merged["001"].get_subfield('c'), Some("20200101120000"));
    }

    #[test]
    fn test_missing_or_non_numeric_is_left_alone() {
        let common = record_001("not-a-date");
        let local = record_001("20200101120000");
        let mut merged = record_001("original");
        Highest001cFixup.fix(&mut merged, &common, &local);
        assert_eq!(merged["001"].get_subfield('c'), Some("original"));

        let mut merged = record_001("original");
        Highest001cFixup.fix(&mut merged, &Record::new(), &local);
        assert_eq!(merged["001"].get_subfield('c'), Some("original"));
    }

    #[test]
    fn test_closure_fixup() {
        let fixup = |merged: &mut Record, _: &Record, local: &Record| {
            merged.fields.extend(local.fields.iter().cloned());
        };
        let local = record_001("1");
        let mut merged = Record::new();
        fixup.fix(&mut merged, &Record::new(), &local);
        assert_eq!(merged, local);
    }
}
