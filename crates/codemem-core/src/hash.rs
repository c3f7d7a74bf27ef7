// ABOUTME: Canonical content hashing for change detection
// ABOUTME: SHA-256 over normalized text, the sole basis for re-embed decisions

use sha2::{Digest, Sha256};

/// Normalize content before hashing: CRLF and lone CR become LF, trailing
/// whitespace is stripped per line, interior whitespace is preserved.
pub fn normalize_content(content: &str) -> String {
    let unified = content.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<&str> = unified.split('\n').map(|l| l.trim_end()).collect();
    // A single trailing newline must not change the hash.
    while lines.last() == Some(&"") {
        lines.pop();
    }
    lines.join("\n")
}

/// Lower-case hex SHA-256 of the normalized content bytes.
pub fn content_hash(content: &str) -> String {
    let normalized = normalize_content(content);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
