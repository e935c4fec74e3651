use crate::transfer::TransferItem;
use blobrob_azure::BlobInfo;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// One download per blob name, in the order names first appear.
///
/// Snapshots are ignored. The current entry wins and is fetched without a
/// revision; a blob with no current entry (deleted, but versioned) is pinned
/// to its newest version. Soft-deleted blobs without versions can't be
/// downloaded at all and are left out.
pub fn latest_revisions(account: &str, container: &str, blobs: &[BlobInfo]) -> Vec<TransferItem> {
    let mut order: Vec<&str> = Vec::new();
    let mut latest: HashMap<&str, &BlobInfo> = HashMap::new();
    for blob in blobs.iter().filter(|b| !b.is_snapshot()) {
        if blob.revision.is_none() && blob.deleted {
            tracing::debug!(name = %blob.name, "Skipping soft-deleted blob without versions");
            continue;
        }
        match latest.entry(blob.name.as_str()) {
            Entry::Vacant(entry) => {
                order.push(&blob.name);
                entry.insert(blob);
            },
            Entry::Occupied(mut entry) => {
                if supersedes(blob, entry.get()) {
                    entry.insert(blob);
                }
            },
        }
    }
    order
        .into_iter()
        .filter_map(|name| latest.get(name))
        .map(|blob| TransferItem::from_blob(account, container, blob))
        .collect()
}

/// Version ids are timestamps, so the greatest one is the newest.
fn supersedes(candidate: &BlobInfo, existing: &BlobInfo) -> bool {
    match (candidate.is_current(), existing.is_current()) {
        (true, false) => true,
        (false, true) => false,
        _ => candidate.revision > existing.revision,
    }
}
