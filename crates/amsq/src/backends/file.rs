//! 📂 The fallback snapshot — read from disk once, at startup, and never touched again.
//!
//! When the remote fetch falls over, every cycle reaches for this. It lives behind an `Arc`, it is
//! never written, so concurrent cycles can all lean on it at once.

use std::path::Path;

use tracing::info;

use crate::common::SourceSnapshot;
use crate::error::ConfigError;

/// 📂 Read and parse the local snapshot. Unreadable or malformed is a startup `ConfigError`.
pub fn load_fallback_snapshot(path: &Path) -> Result<SourceSnapshot, ConfigError> {
    let shown = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|source| ConfigError::FallbackUnreadable {
        path: shown.clone(),
        source,
    })?;
    let snapshot = SourceSnapshot::from_slice(&bytes).map_err(|source| ConfigError::FallbackMalformed {
        path: shown.clone(),
        source,
    })?;
    info!(
        "📂 fallback snapshot loaded from '{}': {} columns, {} rows",
        shown,
        snapshot.cols.len(),
        snapshot.results.len()
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn the_one_where_the_bundled_snapshot_parses() {
        let bundled = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../dummy_data/mock_data.json");
        let snapshot = load_fallback_snapshot(&bundled).expect("💀 bundled snapshot should parse");
        assert!(!snapshot.cols.is_empty());
        assert!(snapshot.results.iter().all(|row| row.len() == snapshot.cols.len()));
    }

    #[test]
    fn the_one_where_the_file_is_not_there() {
        let err = load_fallback_snapshot(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::FallbackUnreadable { .. }));
    }

    #[test]
    fn the_one_where_the_file_is_not_a_snapshot() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"rows\": []}}").unwrap();
        let err = load_fallback_snapshot(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::FallbackMalformed { .. }));
    }
}
