use std::collections::{BTreeMap, HashSet};

use super::{
    changes::{ChangeKind, ChangeRecord},
    snapshot::MergedSnapshot,
};

/// Computes key-level differences between two merged snapshots.
///
/// Keys rejected by `include` are left out of the result.
pub fn diff_snapshots(
    old: &MergedSnapshot,
    new: &MergedSnapshot,
    include: impl Fn(&str) -> bool,
) -> BTreeMap<String, ChangeRecord> {
    let mut all_keys = HashSet::new();
    all_keys.extend(old.keys());
    all_keys.extend(new.keys());

    let mut changes = BTreeMap::new();

    for key in all_keys {
        if !include(key) {
            continue;
        }

        let record = match (old.lookup(key), new.lookup(key)) {
            (Some(old_value), Some(new_value)) if old_value != new_value => ChangeRecord::new(
                key,
                old_value.clone(),
                new_value.clone(),
                ChangeKind::Modified,
            ),
            (Some(_), Some(_)) => continue,
            (Some(old_value), None) => {
                ChangeRecord::new(key, old_value.clone(), None, ChangeKind::Removed)
            }
            (None, Some(new_value)) => {
                ChangeRecord::new(key, None, new_value.clone(), ChangeKind::Added)
            }
            (None, None) => continue,
        };

        changes.insert(key.to_string(), record);
    }

    changes
}
