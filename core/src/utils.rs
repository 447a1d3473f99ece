use chrono::{DateTime, Utc};

pub fn strbool(value: &str) -> bool {
    ["true", "True", "t", "T", "1"].contains(&value)
}

/// `url` prefixed with `prefix` unless it already is (or is absolute)
pub fn ensure_starts_with(prefix: &str, url: &str) -> String {
    if url.starts_with(prefix) || url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!(
            "{}/{}",
            prefix.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }
}

/// Git ref safe name made of `title` and `now`, ex. "Wordpress-Posts-Update-2023-01-31T12-00-00Z"
pub fn branch_name(title: &str, now: DateTime<Utc>) -> String {
    let raw = format!("{}-{}", title, now.format("%Y-%m-%dT%H-%M-%SZ"));
    let mut name = String::with_capacity(raw.len());
    for character in raw.chars() {
        let character = if character.is_ascii_alphanumeric() || character == '_' {
            character
        } else {
            '-'
        };
        if !(character == '-' && name.ends_with('-')) {
            name.push(character);
        }
    }
    name.trim_matches('-').to_string()
}

/// File name without directories nor extensions
pub fn base_name(path: &str) -> &str {
    let name = file_name(path);
    match name.find('.') {
        Some(index) if index > 0 => &name[..index],
        _ => name,
    }
}

/// Last segment of a slash separated path
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
