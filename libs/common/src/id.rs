use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = parley_common::id::prefixed_ulid("usr");
/// assert!(id.starts_with("usr_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const USER: &str = "usr";
    pub const CONVERSATION: &str = "conv";
    pub const SESSION: &str = "ses";
    pub const MESSAGE: &str = "msg";
}
