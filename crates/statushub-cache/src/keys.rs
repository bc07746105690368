//! Logical cache names and key builders.
//!
//! Centralising names prevents two subsystems from sharing a namespace by
//! accident and makes it easy to find every cache the application uses.

/// Cache holding one status record per user.
pub const STATUS_CACHE: &str = "status";

/// Cache holding user profiles.
pub const USER_CACHE: &str = "users";

/// Key of a user's status record inside [`STATUS_CACHE`].
pub fn status(user_id: &str) -> String {
    user_id.to_string()
}

/// Full key of `key` inside namespace `name` on a shared backend.
pub fn namespaced(name: &str, key: &str) -> String {
    format!("{name}:{key}")
}

/// Match pattern covering every key of namespace `name`.
pub fn namespace_pattern(name: &str) -> String {
    format!("{name}:*")
}
