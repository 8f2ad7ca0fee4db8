//! Quality validation stage

use sifter_core::{AuditEvent, Record, Removal};

/// Drop records with empty text or text shorter than `min_length`
/// characters after trimming (`min_length = 0` keeps any non-empty text).
///
/// Returns survivors in input order and one removal per dropped record.
pub fn validate_records(records: Vec<Record>, min_length: usize) -> (Vec<Record>, Vec<Removal>) {
    let mut survivors = Vec::with_capacity(records.len());
    let mut removed = Vec::new();

    for record in records {
        match rejection(&record.text, min_length) {
            None => survivors.push(record),
            Some(detail) => {
                let event = AuditEvent::validation(record.id, detail);
                removed.push(Removal::new(event, &record));
            }
        }
    }

    (survivors, removed)
}

fn rejection(text: &str, min_length: usize) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some("empty_or_null len=0".to_string());
    }
    let len = trimmed.chars().count();
    if len < min_length {
        return Some(format!("too_short len={len} (min_length={min_length})"));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use sifter_core::RemovalReason;

    #[test]
    fn test_drops_empty_and_short() {
        let records = vec![
            Record::new(0, "   "),
            Record::new(1, "tiny"),
            Record::new(2, "long enough text"),
        ];
        let (kept, removed) = validate_records(records, 10);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].original_index(), 2);

        let details: Vec<_> = removed.iter().map(|r| r.event.detail.as_str()).collect();
        assert_eq!(details, vec!["empty_or_null len=0", "too_short len=4 (min_length=10)"]);
        assert!(removed.iter().all(|r| r.reason() == RemovalReason::Validation));
        assert_eq!(removed[0].chars, 3);
    }

    #[test]
    fn test_zero_min_length_keeps_short_text() {
        let (kept, removed) = validate_records(vec![Record::new(0, "a"), Record::new(1, "")], 0);
        assert_eq!(kept.len(), 1);
        assert_eq!(removed.len(), 1);
    }

    #[test]
    fn test_length_is_counted_in_chars_after_trim() {
        let (kept, _) = validate_records(vec![Record::new(0, "  ééé  ")], 3);
        assert_eq!(kept.len(), 1);
    }
}
