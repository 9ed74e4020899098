use super::*;

/// Map a digest to its location relative to the payload root.
///
/// The path holds `depth` directory segments, segment `i` being the hex of
/// digest byte `i`, followed by the full hex digest as the file name:
///
/// ```text
/// depth = 3:  8f/dd/8b/8fdd8b7dfa0d7d4f...
/// depth = 0:  8fdd8b7dfa0d7d4f...
/// ```
pub fn shard_path(hash: &ContentHash, depth: usize) -> std::result::Result<PathBuf, StoreError> {
    let bytes = hash.as_bytes();
    if depth > bytes.len() {
        return Err(StoreError::InvalidDepth {
            depth,
            max: bytes.len(),
        });
    }
    let mut path = PathBuf::new();
    for byte in &bytes[..depth] {
        path.push(hex::encode([*byte]));
    }
    path.push(hash.to_hex());
    Ok(path)
}
