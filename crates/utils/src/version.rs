/// Application version reported by `--version` and on startup.
///
/// `IMAGE_VERSION` is injected by the container build; local builds fall back
/// to the crate version.
pub const VERSION: &str = match option_env!("IMAGE_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};
