//! Change detection and batching helpers shared by the orchestrators.

use std::collections::HashMap;
use std::hash::Hash;

/// Drop batch members whose stored fingerprint already matches; what
/// remains is exactly the set worth writing.
pub fn retain_changed<M, Id, FId, FFp>(
    batch: Vec<M>,
    existing: &HashMap<Id, String>,
    id_of: FId,
    fingerprint_of: FFp,
) -> Vec<M>
where
    Id: Eq + Hash,
    FId: Fn(&M) -> Id,
    FFp: Fn(&M) -> &str,
{
    batch
        .into_iter()
        .filter(|m| match existing.get(&id_of(m)) {
            Some(stored) => stored != fingerprint_of(m),
            None => true,
        })
        .collect()
}

/// Collapse duplicate ids within one batch, keeping the last occurrence.
///
/// Overlapping fetch windows can hand the same record back twice in a single
/// buffer; a multi-row upsert would otherwise touch one key twice.
pub fn dedup_last_wins<M, Id, FId>(batch: Vec<M>, id_of: FId) -> Vec<M>
where
    Id: Eq + Hash,
    FId: Fn(&M) -> Id,
{
    let mut index: HashMap<Id, usize> = HashMap::new();
    let mut out: Vec<Option<M>> = Vec::with_capacity(batch.len());
    for item in batch {
        let id = id_of(&item);
        if let Some(&slot) = index.get(&id) {
            out[slot] = Some(item);
        } else {
            index.insert(id, out.len());
            out.push(Some(item));
        }
    }
    out.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: i64,
        fp: String,
    }

    fn item(id: i64, fp: &str) -> Item {
        Item {
            id,
            fp: fp.to_string(),
        }
    }

    #[test]
    fn retain_changed_drops_only_exact_fingerprint_matches() {
        let existing: HashMap<i64, String> =
            [(1, "aaa".to_string()), (2, "bbb".to_string())].into();
        let batch = vec![item(1, "aaa"), item(2, "changed"), item(3, "new")];

        let kept = retain_changed(batch, &existing, |i| i.id, |i| i.fp.as_str());
        assert_eq!(kept, vec![item(2, "changed"), item(3, "new")]);
    }

    #[test]
    fn retain_changed_keeps_everything_when_store_is_empty() {
        let existing = HashMap::new();
        let batch = vec![item(1, "a"), item(2, "b")];
        let kept = retain_changed(batch.clone(), &existing, |i| i.id, |i| i.fp.as_str());
        assert_eq!(kept, batch);
    }

    #[test]
    fn dedup_keeps_the_last_occurrence_in_place() {
        let batch = vec![item(1, "old"), item(2, "x"), item(1, "new")];
        let deduped = dedup_last_wins(batch, |i| i.id);
        assert_eq!(deduped, vec![item(1, "new"), item(2, "x")]);
    }

    #[test]
    fn dedup_is_a_no_op_without_duplicates() {
        let batch = vec![item(1, "a"), item(2, "b"), item(3, "c")];
        let deduped = dedup_last_wins(batch.clone(), |i| i.id);
        assert_eq!(deduped, batch);
    }
}
