use std::env::var;

/// Get the value of ENV var, or a default
///
/// Only when:
/// - It is set
/// - It is not empty
pub fn env_var_or_else(var_name: &'static str, or_else: fn() -> String) -> String {
    if let Ok(value) = var(var_name) {
        if !value.is_empty() {
            return value;
        }
    }

    or_else()
}

/// Get the value of an optional ENV var, empty values count as not set
pub fn env_var_optional(var_name: &'static str) -> Option<String> {
    var(var_name).ok().filter(|value| !value.is_empty())
}

/// Interpret a flag-like ENV var
///
/// `1`, `true`, `yes` and `on` are truthy, `0`, `false`, `no` and `off` are falsy, anything else
/// (including not being set) results in the default
pub fn env_flag_or(var_name: &'static str, default: bool) -> bool {
    env_var_optional(var_name).map_or(default, |value| parse_flag(&value).unwrap_or(default))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
