use crate::TransferError;

/// Longest object key the storage backend accepts, in bytes.
const MAX_KEY_LEN: usize = 1024;

/// Validates a `/`-separated object path inside a storage location.
///
/// Rejects:
/// - Empty paths and paths longer than 1024 bytes
/// - Leading `/`
/// - Empty, `.` or `..` segments
/// - Backslashes and control characters
pub fn validate_target_path(path: &str) -> Result<(), TransferError> {
    if path.is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }
    if path.len() > MAX_KEY_LEN {
        return Err(TransferError::InvalidPath(format!(
            "path longer than {MAX_KEY_LEN} bytes"
        )));
    }
    if path.starts_with('/') {
        return Err(TransferError::InvalidPath(format!(
            "absolute path not allowed: {path}"
        )));
    }
    if path.contains('\\') || path.chars().any(char::is_control) {
        return Err(TransferError::InvalidPath(format!(
            "invalid character in path: {path:?}"
        )));
    }

    for segment in path.split('/') {
        match segment {
            "" => {
                return Err(TransferError::InvalidPath(format!(
                    "empty segment in path: {path}"
                )));
            }
            "." | ".." => {
                return Err(TransferError::InvalidPath(format!(
                    "relative segment not allowed: {path}"
                )));
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_dataset_node_name() {
        assert!(validate_target_path("study-1/node-7/data.csv").is_ok());
    }

    #[test]
    fn accepts_single_segment_and_dotfile() {
        assert!(validate_target_path("report.pdf").is_ok());
        assert!(validate_target_path("s/n/.hidden").is_ok());
    }

    #[test]
    fn rejects_empty_path() {
        assert!(validate_target_path("").is_err());
    }

    #[test]
    fn rejects_leading_slash() {
        assert!(validate_target_path("/s/n/f").is_err());
    }

    #[test]
    fn rejects_parent_traversal() {
        assert!(validate_target_path("s/../../f").is_err());
        assert!(validate_target_path("..").is_err());
        assert!(validate_target_path("s/./f").is_err());
    }

    #[test]
    fn rejects_empty_segments() {
        assert!(validate_target_path("s//f").is_err());
        assert!(validate_target_path("s/n/").is_err());
    }

    #[test]
    fn rejects_backslash_and_control() {
        assert!(validate_target_path("s\\n\\f").is_err());
        assert!(validate_target_path("s/n/f\n").is_err());
    }

    #[test]
    fn rejects_overlong_key() {
        let long = "a".repeat(MAX_KEY_LEN + 1);
        assert!(matches!(
            validate_target_path(&long),
            Err(TransferError::InvalidPath(_))
        ));
        assert!(validate_target_path(&"a".repeat(MAX_KEY_LEN)).is_ok());
    }
}
