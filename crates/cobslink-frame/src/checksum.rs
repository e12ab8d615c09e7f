//! Single-byte XOR integrity code.

/// XOR-fold `bytes`, seeded at zero. Empty input yields zero.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Check a run whose last byte is the checksum of everything before it.
///
/// An empty run has no trailer and never verifies.
pub fn verify(bytes_with_trailer: &[u8]) -> bool {
    match bytes_with_trailer.split_last() {
        Some((&trailer, body)) => checksum(body) == trailer,
        None => false,
    }
}
