/// Build version. `CONTROL_PLANE_VERSION` set at compile time overrides the crate version.
pub const VERSION: &str = match option_env!("CONTROL_PLANE_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};
