use std::env;
use std::sync::OnceLock;

static COMPOSITE_TENSOR_STRICT_OVERRIDES: OnceLock<bool> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

/// Whether default registries reject re-registration instead of overwriting.
pub(crate) fn strict_overrides_enabled() -> bool {
    *COMPOSITE_TENSOR_STRICT_OVERRIDES.get_or_init(|| {
        match env::var("COMPOSITE_TENSOR_STRICT_OVERRIDES") {
            Ok(value) if !value.trim().is_empty() => parse_bool(&value),
            _ => false,
        }
    })
}
