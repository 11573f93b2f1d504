pub mod datetime;
pub mod time;

pub use datetime::DateTimeParser;
pub use time::TimeFormatSettings;

/// Convert a display name to PascalCase with no separators
/// ("Green Bay Packers" -> "GreenBayPackers"). Used by logo-URL
/// template variables.
pub fn to_pascal_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
