//! Pure helpers for translating façade arguments into store arguments.

/// Converts a one-based event position counted from the oldest entry into
/// a list index.
///
/// Logs are appended at the head, so the oldest entry sits at the tail and
/// `event_id = 1` maps to index `-1`. Values that do not fit in `isize`
/// saturate.
///
/// # Examples
///
/// ```
/// use relaystore_core::store::tail_index;
///
/// assert_eq!(tail_index(1), -1);
/// assert_eq!(tail_index(3), -3);
/// assert_eq!(tail_index(0), 0);
/// assert_eq!(tail_index(-2), 2);
/// ```
pub fn tail_index(event_id: i64) -> isize {
    let index = event_id.saturating_neg();
    isize::try_from(index).unwrap_or(if index < 0 { isize::MIN } else { isize::MAX })
}

/// Resolves a possibly negative list index against a list of `len` elements.
///
/// Mirrors `LINDEX`: negative indices count from the tail, and anything
/// out of range yields `None`.
pub fn resolve_index(len: usize, index: isize) -> Option<usize> {
    let resolved = if index < 0 {
        len.checked_sub(index.unsigned_abs())?
    } else {
        index as usize
    };
    (resolved < len).then_some(resolved)
}

/// Shapes a membership check as a list: `[item]` when present, empty otherwise.
pub fn membership_list(item: &str, is_member: bool) -> Vec<String> {
    if is_member {
        vec![item.to_string()]
    } else {
        Vec::new()
    }
}
