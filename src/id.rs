//! Identifier generation: `<time14>-<node4>-<rand4>`, base62-encoded,
//! lexicographically sortable by creation order.

use once_cell::sync::OnceCell;
use rand::RngCore;
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

fn base62(mut value: u64, width: usize) -> String {
    let mut digits = Vec::with_capacity(width);
    if value == 0 {
        digits.push(ALPHABET[0]);
    }
    while value > 0 {
        digits.push(ALPHABET[(value % 62) as usize]);
        value /= 62;
    }
    while digits.len() < width {
        digits.push(ALPHABET[0]);
    }
    digits.reverse();
    let digits = if digits.len() > width {
        digits[digits.len() - width..].to_vec()
    } else {
        digits
    };
    String::from_utf8(digits).expect("base62 alphabet is ASCII")
}

/// Resolves the node id component used in generated identifiers.
///
/// Priority: `NODE_ID` environment variable, then a `name-<n>` hostname
/// suffix (read from `/etc/hostname`), then `0`.
pub fn resolve_node_id() -> u64 {
    if let Ok(raw) = std::env::var("NODE_ID") {
        if let Ok(n) = raw.parse::<u64>() {
            return n;
        }
    }
    if let Ok(hostname) = fs::read_to_string("/etc/hostname") {
        if let Some(n) = parse_hostname_suffix(hostname.trim()) {
            return n;
        }
    }
    0
}

fn parse_hostname_suffix(host: &str) -> Option<u64> {
    let name = host.split('.').next().unwrap_or(host);
    let (_, suffix) = name.rsplit_once('-')?;
    suffix.parse::<u64>().ok()
}

static NODE_ID: OnceCell<u64> = OnceCell::new();

/// Returns the process-wide node id, resolving it once on first use.
pub fn node_id() -> u64 {
    *NODE_ID.get_or_init(resolve_node_id)
}

fn nanos_since_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before UNIX epoch")
        .as_nanos() as u64
}

/// Generates a new, lexicographically sortable object identifier:
/// `<time14>-<node4>-<rand4>`.
pub fn new_oid() -> String {
    new_oid_with_node(node_id())
}

/// As [`new_oid`], but with an explicit node id (used in tests).
pub fn new_oid_with_node(node: u64) -> String {
    let t = base62(nanos_since_epoch() as u64, 14);
    let n = base62(node, 4);
    let mut rand_bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut rand_bytes);
    let r = base62(u32::from_le_bytes(rand_bytes) as u64, 4);
    format!("{t}-{n}-{r}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oid_has_three_dash_separated_fields() {
        let oid = new_oid_with_node(7);
        let fields: Vec<_> = oid.split('-').collect();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].len(), 14);
        assert_eq!(fields[1].len(), 4);
        assert_eq!(fields[2].len(), 4);
    }

    #[test]
    fn successive_oids_sort_ascending() {
        let a = new_oid_with_node(1);
        std::thread::sleep(std::time::Duration::from_micros(2));
        let b = new_oid_with_node(1);
        assert!(a < b, "{a} should sort before {b}");
    }

    #[test]
    fn parses_node_id_from_hostname_suffix() {
        assert_eq!(parse_hostname_suffix("worker-12"), Some(12));
        assert_eq!(parse_hostname_suffix("worker-12.internal"), Some(12));
        assert_eq!(parse_hostname_suffix("standalone"), None);
    }
}
