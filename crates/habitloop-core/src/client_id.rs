// Client ID management for multi-device reconciliation diagnostics
// Format: "habitloop-<uuid>"

use std::fs;
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

use crate::error::StoreError;

const CLIENT_ID_FILE: &str = "client_id.txt";
const CLIENT_ID_PREFIX: &str = "habitloop-";

/// Get or create the client id at the specified path.
/// Creates a new id file if it doesn't exist.
///
/// # Arguments
/// * `path` - Directory path where client_id.txt is stored
///
/// # Returns
/// Client id string in format "habitloop-<uuid>"
pub fn get_or_create_client_id_at(path: &Path) -> Result<String, StoreError> {
    let client_id_path = path.join(CLIENT_ID_FILE);

    if client_id_path.exists() {
        let content = fs::read_to_string(&client_id_path)?;
        let client_id = content.trim().to_string();

        if client_id.starts_with(CLIENT_ID_PREFIX) {
            return Ok(client_id);
        } else {
            return Err(StoreError::InvalidClientId(client_id));
        }
    }

    let uuid = Uuid::new_v4().to_string();
    let client_id = format!("{}{}", CLIENT_ID_PREFIX, uuid);

    if !path.exists() {
        fs::create_dir_all(path)?;
    }

    let mut file = fs::File::create(&client_id_path)?;
    writeln!(file, "{}", client_id)?;

    Ok(client_id)
}

/// Get or create the client id using the default data directory.
pub fn get_or_create_client_id() -> Result<String, StoreError> {
    let dir = crate::storage::data_dir().map_err(|e| {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            e.to_string(),
        ))
    })?;
    get_or_create_client_id_at(&dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_client_id_format() {
        let temp_dir = TempDir::new().unwrap();
        let client_id = get_or_create_client_id_at(temp_dir.path()).unwrap();

        assert!(client_id.starts_with(CLIENT_ID_PREFIX));
        assert_eq!(client_id.len(), CLIENT_ID_PREFIX.len() + 36);
    }

    #[test]
    fn test_client_id_persistence() {
        let temp_dir = TempDir::new().unwrap();

        let first = get_or_create_client_id_at(temp_dir.path()).unwrap();
        let second = get_or_create_client_id_at(temp_dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_client_id_invalid_format_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CLIENT_ID_FILE);
        std::fs::write(&path, "not-a-habitloop-id\n").unwrap();

        let result = get_or_create_client_id_at(temp_dir.path());
        assert!(matches!(result, Err(StoreError::InvalidClientId(_))));
    }

    #[test]
    fn test_client_id_uniqueness() {
        let dir1 = TempDir::new().unwrap();
        let dir2 = TempDir::new().unwrap();

        let id1 = get_or_create_client_id_at(dir1.path()).unwrap();
        let id2 = get_or_create_client_id_at(dir2.path()).unwrap();
        assert_ne!(id1, id2);
    }
}
