use crate::{error::SyncError, tree::ChangeSet};

/// Maximum serialized size of one "create a tree" request entries
pub const DEFAULT_PAYLOAD_CEILING: usize = 9_000_000;

/// Split `changes` in consecutive parts whose serialized size does not exceed
/// `ceiling`. Oversized parts are bisected, the front half (rounded up) going
/// before the rest, so entries keep their relative order.
pub fn chunk(changes: ChangeSet, ceiling: usize) -> Result<Vec<ChangeSet>, SyncError> {
    if changes.is_empty() {
        return Ok(vec![]);
    }

    let mut parts = vec![changes];
    let mut index = 0;

    while index < parts.len() {
        let size = serde_json::to_string(&parts[index])?.len();
        if size <= ceiling {
            index += 1;
            continue;
        }

        let part = &mut parts[index];
        if part.len() == 1 {
            return Err(SyncError::EntryTooLarge {
                path: part[0].path.clone(),
                size,
                ceiling,
            });
        }

        let half = (part.len() + 1) / 2;
        let front: ChangeSet = part.drain(..half).collect();
        log::debug!(
            "Split a {} bytes tree part into {} and {} entries",
            size,
            front.len(),
            part.len()
        );
        parts.insert(index, front);
    }

    Ok(parts)
}
