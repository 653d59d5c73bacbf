//! Startup configuration files: neighbor list and key-value seed.

use crate::net::types::PeerAddr;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: bad peer address `{entry}`")]
    BadAddress { line: usize, entry: String },

    #[error("line {line}: expected `KEY VALUE`, got `{entry}`")]
    BadEntry { line: usize, entry: String },
}

/// Load a neighbors file: one `HOST:PORT` per line, blank lines skipped.
pub fn load_neighbors(path: &Path) -> Result<Vec<PeerAddr>, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let mut neighbors = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let addr: PeerAddr = line.parse().map_err(|_| ConfigError::BadAddress {
            line: idx + 1,
            entry: line.to_string(),
        })?;
        if !neighbors.contains(&addr) {
            neighbors.push(addr);
        }
    }
    Ok(neighbors)
}

/// Load a key-value seed file: one whitespace-separated `KEY VALUE` per line.
pub fn load_keys(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let mut entries = HashMap::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        match (fields.next(), fields.next(), fields.next()) {
            (Some(key), Some(value), None) => {
                entries.insert(key.to_string(), value.to_string());
            }
            _ => {
                return Err(ConfigError::BadEntry {
                    line: idx + 1,
                    entry: line.to_string(),
                });
            }
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_neighbors_in_order() {
        let path = write_temp(
            "sonar_test_neighbors.txt",
            "127.0.0.1:5001\n\n127.0.0.1:5002\n127.0.0.1:5001\n",
        );
        let neighbors = load_neighbors(&path).unwrap();
        let ports: Vec<u16> = neighbors.iter().map(|p| p.port).collect();
        assert_eq!(ports, vec![5001, 5002]);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn neighbor_errors_carry_the_line_number() {
        let path = write_temp("sonar_test_neighbors_bad.txt", "127.0.0.1:5001\nnot-an-addr\n");
        match load_neighbors(&path) {
            Err(ConfigError::BadAddress { line, entry }) => {
                assert_eq!(line, 2);
                assert_eq!(entry, "not-an-addr");
            }
            other => panic!("expected BadAddress, got {other:?}"),
        }
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn loads_key_value_pairs() {
        let path = write_temp("sonar_test_keys.txt", "KEY1 V1\nKEY2 V2\n");
        let entries = load_keys(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["KEY1"], "V1");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn rejects_entries_with_wrong_arity() {
        let path = write_temp("sonar_test_keys_bad.txt", "KEY1 V1 extra\n");
        assert!(matches!(
            load_keys(&path),
            Err(ConfigError::BadEntry { line: 1, .. })
        ));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let path = PathBuf::from("/definitely/not/here.txt");
        assert!(matches!(load_neighbors(&path), Err(ConfigError::Io(_))));
    }
}
