//! Run and session-directory identity.

/// Short random ID correlating every log line of one controller run.
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    format!("run-{}", &uuid.to_string()[..12])
}

/// Session output directory name: `<app>_<unix-ts>`.
///
/// The app name is normalized so directory names stay shell-friendly.
pub fn session_dir_name(app_name: &str, unix_ts: i64) -> String {
    let normalized: String = app_name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("{}_{}", normalized, unix_ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_shape() {
        let id = generate_run_id();
        assert!(id.starts_with("run-"));
        assert_eq!(id.len(), "run-".len() + 12);
    }

    #[test]
    fn test_run_id_unique() {
        assert_ne!(generate_run_id(), generate_run_id());
    }

    #[test]
    fn test_session_dir_name_normalizes() {
        assert_eq!(
            session_dir_name("Google Chrome", 1700000000),
            "google-chrome_1700000000"
        );
    }
}
