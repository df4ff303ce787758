/// Domain entities shared by the store, the services and the HTTP layer.
pub mod models;

pub use models::*;

/// Trim free text and collapse blank input to `None`.
pub fn normalize_text(input: Option<String>) -> Option<String> {
    input
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
