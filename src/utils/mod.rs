//! Small shared helpers

pub mod mac;
pub mod poll;

pub use mac::MacAddr;
pub use poll::BoundedPoll;

/// Split a comma separated list, trimming entries and dropping empty ones
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
