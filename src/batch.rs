//! Parallel merge and expansion of independent records using Rayon.
//!
//! Every input is an independent task on Rayon's work-stealing pool (sized
//! by `RAYON_NUM_THREADS` when set). Results come back in input order and a
//! failing item does not abort the rest of the batch.
//!
//! # Examples
//!
//! ```
//! use rawrepo_marcx::batch::merge_batch;
//! use rawrepo_marcx::FieldRules;
//!
//! let common = br#"<record xmlns="info:lc/xmlns/marcxchange-v1"/>"#.to_vec();
//! let local = br#"<record xmlns="info:lc/xmlns/marcxchange-v1"/>"#.to_vec();
//! let pairs = vec![(common.clone(), local.clone()), (b"<oops".to_vec(), local)];
//!
//! let results = merge_batch(&pairs, false, &FieldRules::danmarc2());
//! assert!(results[0].is_ok());
//! assert!(results[1].is_err());
//! ```

use std::collections::HashMap;

use rayon::prelude::*;

use crate::error::{ExpandError, MergeError};
use crate::expand::expand;
use crate::field_rules::FieldRules;
use crate::merger::merge;
use crate::record::Record;

/// Merge a batch of `(common, local)` documents in parallel.
///
/// Item `i` of the result is the outcome of merging `pairs[i]`.
pub fn merge_batch<C, L>(
    pairs: &[(C, L)],
    include_all_fields: bool,
    rules: &FieldRules,
) -> Vec<Result<Vec<u8>, MergeError>>
where
    C: AsRef<[u8]> + Sync,
    L: AsRef<[u8]> + Sync,
{
    tracing::debug!(items = pairs.len(), "merging batch");
    pairs
        .par_iter()
        .map(|(common, local)| merge(common.as_ref(), local.as_ref(), include_all_fields, rules))
        .collect()
}

/// Expand a batch of records against one shared authority map in parallel.
///
/// Item `i` of the result is the outcome of expanding `records[i]`.
pub fn expand_batch(
    records: &[Record],
    authorities: &HashMap<String, Record>,
    keep_link_subfields: bool,
) -> Vec<Result<Record, ExpandError>> {
    tracing::debug!(items = records.len(), "expanding batch");
    records
        .par_iter()
        .map(|record| expand(record, authorities, keep_link_subfields))
        .collect()
}
