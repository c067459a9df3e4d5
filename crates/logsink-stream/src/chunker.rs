//! Rune-safe splitting of oversized buffers.

/// Longest incomplete tail that can be held back (a 4-byte sequence minus one)
const MAX_BACKOFF: usize = 3;

/// Encoded length of the character starting with `lead`, from its leading bits.
///
/// Returns `None` for continuation bytes and bytes that never start a sequence.
fn sequence_len(lead: u8) -> Option<usize> {
    match lead {
        0x00..=0x7F => Some(1),
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}

fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

/// Whether `prefix` ends with a complete, valid character
fn ends_on_boundary(prefix: &[u8]) -> bool {
    let len = prefix.len();
    if len == 0 {
        return true;
    }

    let floor = len.saturating_sub(4);
    let Some(lead_at) = (floor..len).rev().find(|&i| !is_continuation(prefix[i])) else {
        return false;
    };

    let tail = &prefix[lead_at..];
    match sequence_len(prefix[lead_at]) {
        Some(n) if n == tail.len() => std::str::from_utf8(tail).is_ok(),
        _ => false,
    }
}

/// Split `buf` into a prefix of at most `max_size` bytes and the held-back rest.
///
/// The cut never lands inside a multi-byte character. Starting from the end of
/// the window it backs off up to three bytes, stopping at the first point that
/// either follows a complete character or equals `confirmed`, the length of
/// bytes an earlier write already left in the buffer. When neither holds the
/// trailing three bytes of the window are held.
pub fn split(buf: &[u8], max_size: usize, confirmed: usize) -> (&[u8], &[u8]) {
    let end = max_size.min(buf.len());

    let cut = (0..=MAX_BACKOFF)
        .take_while(|&back| back < end)
        .map(|back| end - back)
        .find(|&at| at == confirmed || ends_on_boundary(&buf[..at]))
        .unwrap_or_else(|| end.saturating_sub(MAX_BACKOFF));

    let cut = if cut == 0 { end } else { cut };
    buf.split_at(cut)
}
