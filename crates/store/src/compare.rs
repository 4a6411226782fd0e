//! Side-by-side comparison of records.
//!
//! Only the fields that describe *how* an image was made are compared;
//! ids, timestamps and paths always differ and are left out.

use serde::Serialize;

use crate::record::GenerationRecord;

/// Fields shown when comparing records.
pub const COMPARED_FIELDS: &[&str] = &[
    "prompt",
    "negative_prompt",
    "preset_id",
    "seed",
    "steps",
    "guidance_scale",
    "model_id",
    "device",
    "duration_sec",
];

/// Fields that are expected to differ between otherwise identical runs.
const VOLATILE_FIELDS: &[&str] = &["device", "duration_sec"];

/// A single field that differs between two records.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldDiff {
    pub field: String,
    pub left: serde_json::Value,
    pub right: serde_json::Value,
}

/// One row per record: its id plus the compared fields.
pub fn compare_records(records: &[GenerationRecord]) -> Vec<serde_json::Value> {
    records
        .iter()
        .map(|record| {
            let dict = record.to_dict();
            let mut row = serde_json::Map::new();
            row.insert("id".to_string(), dict["id"].clone());
            for field in COMPARED_FIELDS {
                row.insert(field.to_string(), dict[*field].clone());
            }
            serde_json::Value::Object(row)
        })
        .collect()
}

/// Compared fields whose values differ between `left` and `right`, sorted
/// by field name. Run-to-run noise (device, duration) is skipped unless
/// `include_volatile` is set.
pub fn diff_records(
    left: &GenerationRecord,
    right: &GenerationRecord,
    include_volatile: bool,
) -> Vec<FieldDiff> {
    let left_dict = left.to_dict();
    let right_dict = right.to_dict();

    let mut diffs: Vec<FieldDiff> = COMPARED_FIELDS
        .iter()
        .filter(|field| include_volatile || !VOLATILE_FIELDS.contains(*field))
        .filter_map(|field| {
            let l = &left_dict[*field];
            let r = &right_dict[*field];
            (l != r).then(|| FieldDiff {
                field: field.to_string(),
                left: l.clone(),
                right: r.clone(),
            })
        })
        .collect();

    diffs.sort_by(|a, b| a.field.cmp(&b.field));
    diffs
}
