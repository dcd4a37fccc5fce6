/// Truncates a string to at most `length` characters for display.
/// Scheduler-supplied fields (job names, node states, pending reasons) have
/// no length bound, while report columns do.
pub fn truncate(value: &str, length: usize) -> &str {
    match value.char_indices().nth(length) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}
