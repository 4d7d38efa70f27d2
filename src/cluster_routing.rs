/// Number of slots in a cluster keyspace; slot ids live in
/// `[0, SLOT_COUNT)`.
pub const SLOT_COUNT: u16 = 16384;

/// Returns the slot a key hashes to: CRC16/XMODEM over the hashtag if the
/// key carries one, over the whole key otherwise, modulo the slot count.
pub fn slot_of(key: &[u8]) -> u16 {
    let key = match get_hashtag(key) {
        Some(tag) => tag,
        None => key,
    };
    crc16::State::<crc16::XMODEM>::calculate(key) % SLOT_COUNT
}

/// The content of the first `{...}` in the key, if nonempty.  Keys that
/// share a hashtag land on the same slot.
fn get_hashtag(key: &[u8]) -> Option<&[u8]> {
    let open = key.iter().position(|v| *v == b'{')?;

    let close = key[open..].iter().position(|v| *v == b'}')?;

    let rv = &key[open + 1..open + close];
    if rv.is_empty() {
        None
    } else {
        Some(rv)
    }
}
