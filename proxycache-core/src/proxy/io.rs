//! Line-oriented socket helpers

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Read one line into `buf`, keeping the terminator
///
/// At most `max_len` bytes are read; a longer line comes back in pieces over
/// successive calls. Returns 0 at end of stream. `buf` is cleared first.
pub async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>, max_len: usize) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut limited = AsyncReadExt::take(&mut *reader, max_len as u64);
    limited.read_until(b'\n', buf).await
}

/// True for the empty line that ends a header block
///
/// Only meaningful for a chunk that starts a line; see [`ends_line`].
pub fn is_blank_line(line: &[u8]) -> bool {
    line == b"\r\n" || line == b"\n"
}

/// True if the chunk read by [`read_line`] finished its line, so the next
/// chunk starts a new one
pub fn ends_line(chunk: &[u8]) -> bool {
    chunk.last() == Some(&b'\n')
}

/// Leading part of a response up to and including the blank line after its headers
///
/// Returns the whole input if no blank line is present.
pub fn head_section(response: &[u8]) -> &[u8] {
    let crlf = response.windows(4).position(|w| w == b"\r\n\r\n").map(|at| at + 4);
    let lf = response.windows(2).position(|w| w == b"\n\n").map(|at| at + 2);

    let end = match (crlf, lf) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) | (None, Some(a)) => a,
        (None, None) => response.len(),
    };
    &response[..end]
}
