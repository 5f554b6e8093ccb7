//! Chunk read helper

use std::io::{ErrorKind, Read};

/// Read from `reader` until `chunk` is full or the stream ends.
///
/// A plain `read` may return fewer bytes than requested even when more are
/// on the way (a lazy compressor, a slow pipe). The codec needs exact chunk
/// boundaries, so this keeps reading; a short count is returned only at the
/// true end of the stream.
pub fn fill_chunk(reader: &mut impl Read, chunk: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;

    while filled < chunk.len() {
        match reader.read(&mut chunk[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(filled)
}
