//! C5: computes the merged field inventory and the `fieldsSame` fast-path
//! gate (§4.1).

use crate::segment::Segment;

/// Ordered, deduplicated field inventory plus the `fieldsSame` fast-path
/// flag (§3, §4.1).
pub struct FieldUnifier {
    /// Entry 0 is always `"_id"`; the rest are lexicographically sorted.
    pub fields: Vec<String>,
    /// True iff every input segment reports the same ordered field list as
    /// the first segment.
    pub fields_same: bool,
}

impl FieldUnifier {
    pub fn compute(segments: &[&dyn Segment]) -> anyhow::Result<Self> {
        anyhow::ensure!(!segments.is_empty(), "cannot unify fields of zero segments");

        let first_fields = segments[0].fields();
        let fields_same = segments
            .iter()
            .all(|s| s.fields() == first_fields);

        let mut distinct: Vec<String> = Vec::new();
        for seg in segments {
            for f in seg.fields() {
                if !distinct.iter().any(|existing| existing == f) {
                    distinct.push(f.clone());
                }
            }
        }

        anyhow::ensure!(
            distinct.iter().any(|f| f == "_id"),
            "merged field inventory is missing the required \"_id\" field"
        );

        let mut rest: Vec<String> = distinct.into_iter().filter(|f| f != "_id").collect();
        rest.sort();

        let mut fields = Vec::with_capacity(rest.len() + 1);
        fields.push("_id".to_string());
        fields.append(&mut rest);

        Ok(Self {
            fields,
            fields_same,
        })
    }

    /// The 0-based position of `field` in the merged inventory, if present.
    pub fn field_id(&self, field: &str) -> Option<u32> {
        self.fields.iter().position(|f| f == field).map(|p| p as u32)
    }
}
