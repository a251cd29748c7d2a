//! Small helpers shared by the CLI and the connection layer
//!
//! - Duration and byte-size formatting for run summaries
//! - `~` expansion for user supplied paths
//! - Name and connection string validation

/// Formatting helpers
pub mod format {
    use std::time::Duration;

    /// Format duration as human-readable string
    ///
    /// # Returns
    /// * `String` - Formatted duration (e.g., "1h 30m 45s", "250ms")
    pub fn format_duration(duration: Duration) -> String {
        let secs = duration.as_secs();
        if secs == 0 {
            return format!("{}ms", duration.subsec_millis());
        }

        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;

        let mut parts = Vec::new();
        if hours > 0 {
            parts.push(format!("{hours}h"));
        }
        if minutes > 0 {
            parts.push(format!("{minutes}m"));
        }
        if seconds > 0 || parts.is_empty() {
            parts.push(format!("{seconds}s"));
        }
        parts.join(" ")
    }

    /// Format bytes as human-readable size (e.g., "1.50 MB")
    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit = 0;

        while size >= 1024.0 && unit < UNITS.len() - 1 {
            size /= 1024.0;
            unit += 1;
        }

        if unit == 0 {
            format!("{bytes} B")
        } else {
            format!("{size:.2} {}", UNITS[unit])
        }
    }
}

/// File system helpers
pub mod fs {
    use std::path::PathBuf;

    /// Expand a leading `~/` to the user's home directory.
    pub fn expand_home(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest);
        }
        PathBuf::from(path)
    }
}

/// Validation helpers
pub mod validate {
    /// Database names: 1 to 255 characters, none of `/ \ # ?`, no trailing space.
    pub fn is_valid_database_name(name: &str) -> bool {
        is_valid_resource_name(name)
    }

    /// Container names follow the same rules as database names.
    pub fn is_valid_container_name(name: &str) -> bool {
        is_valid_resource_name(name)
    }

    fn is_valid_resource_name(name: &str) -> bool {
        if name.is_empty() || name.len() > 255 || name.ends_with(' ') {
            return false;
        }
        !name.chars().any(|c| matches!(c, '/' | '\\' | '#' | '?') || c.is_control())
    }

    /// Connection strings must use a MongoDB scheme.
    pub fn is_valid_connection_uri(uri: &str) -> bool {
        uri.starts_with("mongodb://") || uri.starts_with("mongodb+srv://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_format_duration() {
        assert_eq!(format::format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format::format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format::format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format::format_duration(Duration::from_secs(3600)), "1h");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format::format_bytes(512), "512 B");
        assert_eq!(format::format_bytes(1536), "1.50 KB");
        assert_eq!(format::format_bytes(1024 * 1024), "1.00 MB");
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(fs::expand_home("data/in.json"), std::path::PathBuf::from("data/in.json"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(fs::expand_home("~/in.json"), home.join("in.json"));
        }
    }

    #[test]
    fn test_resource_names() {
        assert!(validate::is_valid_database_name("shop"));
        assert!(validate::is_valid_container_name("orders-2024"));
        assert!(!validate::is_valid_database_name(""));
        assert!(!validate::is_valid_container_name("a/b"));
        assert!(!validate::is_valid_container_name("what?"));
        assert!(!validate::is_valid_database_name("trailing "));
        assert!(!validate::is_valid_database_name(&"x".repeat(256)));
    }

    #[test]
    fn test_connection_uri() {
        assert!(validate::is_valid_connection_uri("mongodb://localhost:10255"));
        assert!(validate::is_valid_connection_uri("mongodb+srv://acct.example.com"));
        assert!(!validate::is_valid_connection_uri("AccountEndpoint=https://x;AccountKey=y"));
    }
}
