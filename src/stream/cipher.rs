//! Chunked stream encryption
//!
//! The encryptor consumes plaintext in exact [`PLAIN_CHUNK_SIZE`] chunks and
//! emits one frame per chunk: `nonce[24] ‖ sealed(chunk + tag)`. The first
//! frame's nonce is random; every later frame increments it as a big-endian
//! counter. The decryptor walks frames in order and re-derives nothing: each
//! frame carries its own nonce.
//!
//! Frames authenticate individually, so a flipped bit or truncated frame
//! fails at that frame and nothing after the failure point is emitted.

use crate::cancel::CancelToken;
use crate::crypto::{decrypt_once, encrypt_once, increment_nonce, random_nonce};
use crate::error::{Error, Result};
use crate::secret::KeyContainer;
use crate::stream::{fill_chunk, CIPHER_CHUNK_SIZE, MAX_CHUNK_COUNT, PLAIN_CHUNK_SIZE};
use std::io::{Read, Write};
use zeroize::Zeroizing;

/// Pre-flight check: would a stream of `size` bytes need more frames than
/// the per-stream cap allows?
pub fn too_large_to_chunk(size: u64) -> bool {
    size.div_ceil(PLAIN_CHUNK_SIZE as u64) > MAX_CHUNK_COUNT
}

/// Encrypt `reader` into `writer` as a sequence of frames.
///
/// Returns the number of ciphertext bytes written. An empty input produces
/// an empty output. Aborts with [`Error::StreamTooLarge`] if the nonce
/// counter would wrap back to its initial value, and with
/// [`Error::Cancelled`] if the token fires between chunks.
pub fn encrypt_stream(
    key: &KeyContainer,
    reader: &mut impl Read,
    writer: &mut impl Write,
    token: &CancelToken,
) -> Result<u64> {
    let mut chunk = Zeroizing::new(vec![0u8; PLAIN_CHUNK_SIZE]);
    let initial = random_nonce()?;
    let mut nonce = initial;
    let mut frames = 0u64;
    let mut written = 0u64;

    loop {
        token.check()?;

        let len = fill_chunk(reader, &mut chunk)?;
        if len == 0 {
            break;
        }

        if frames > 0 {
            increment_nonce(&mut nonce);
            if nonce == initial {
                return Err(Error::StreamTooLarge);
            }
        }

        let frame = encrypt_once(key, &nonce, &chunk[..len])?;
        writer.write_all(&frame)?;
        written += frame.len() as u64;
        frames += 1;

        if len < PLAIN_CHUNK_SIZE {
            break;
        }
    }

    Ok(written)
}

/// Decrypt a frame sequence from `reader` into `writer`.
///
/// Returns the number of plaintext bytes written. The first frame that
/// fails authentication aborts the stream; no plaintext past the failure
/// point reaches the writer.
pub fn decrypt_stream(
    key: &KeyContainer,
    reader: &mut impl Read,
    writer: &mut impl Write,
    token: &CancelToken,
) -> Result<u64> {
    let mut frame = vec![0u8; CIPHER_CHUNK_SIZE];
    let mut written = 0u64;

    loop {
        token.check()?;

        let len = fill_chunk(reader, &mut frame)?;
        if len == 0 {
            break;
        }

        let plain = Zeroizing::new(decrypt_once(key, &frame[..len])?);
        writer.write_all(&plain)?;
        written += plain.len() as u64;

        if len < CIPHER_CHUNK_SIZE {
            break;
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{NONCE_SIZE, TAG_SIZE};
    use std::io::Cursor;

    fn round_trip(plaintext: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let key = KeyContainer::random().unwrap();
        let token = CancelToken::new();

        let mut ciphertext = Vec::new();
        encrypt_stream(&key, &mut Cursor::new(plaintext), &mut ciphertext, &token).unwrap();

        let mut recovered = Vec::new();
        decrypt_stream(
            &key,
            &mut Cursor::new(ciphertext.clone()),
            &mut recovered,
            &token,
        )
        .unwrap();

        (ciphertext, recovered)
    }

    #[test]
    fn test_round_trip_exact_chunk_boundary() {
        // Two full chunks, no tail frame
        let plaintext = vec![0xA5u8; PLAIN_CHUNK_SIZE * 2];
        let (ciphertext, recovered) = round_trip(&plaintext);

        assert_eq!(ciphertext.len(), CIPHER_CHUNK_SIZE * 2);
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn test_round_trip_partial_final_chunk() {
        // 4000 bytes: one full frame plus a 73-byte tail
        let plaintext: Vec<u8> = (0..4000u32).map(|i| i as u8).collect();
        let (ciphertext, recovered) = round_trip(&plaintext);

        assert_eq!(
            ciphertext.len(),
            CIPHER_CHUNK_SIZE + NONCE_SIZE + 73 + TAG_SIZE
        );
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn test_round_trip_small_input() {
        let (ciphertext, recovered) = round_trip(b"tiny");
        assert_eq!(ciphertext.len(), NONCE_SIZE + 4 + TAG_SIZE);
        assert_eq!(recovered, b"tiny");
    }

    #[test]
    fn test_empty_input_empty_output() {
        let (ciphertext, recovered) = round_trip(b"");
        assert!(ciphertext.is_empty());
        assert!(recovered.is_empty());
    }

    #[test]
    fn test_flipped_bit_aborts_stream() {
        let key = KeyContainer::random().unwrap();
        let token = CancelToken::new();
        let plaintext = vec![1u8; PLAIN_CHUNK_SIZE + 500];

        let mut ciphertext = Vec::new();
        encrypt_stream(&key, &mut Cursor::new(&plaintext), &mut ciphertext, &token).unwrap();

        // Corrupt the second frame
        ciphertext[CIPHER_CHUNK_SIZE + 30] ^= 0x01;

        let mut recovered = Vec::new();
        let result = decrypt_stream(&key, &mut Cursor::new(ciphertext), &mut recovered, &token);
        assert!(matches!(result, Err(Error::Decrypt)));

        // The first frame decrypted fine; nothing after the corrupt frame
        assert_eq!(recovered.len(), PLAIN_CHUNK_SIZE);
        assert_eq!(recovered, &plaintext[..PLAIN_CHUNK_SIZE]);
    }

    #[test]
    fn test_truncated_frame_fails() {
        let key = KeyContainer::random().unwrap();
        let token = CancelToken::new();

        let mut ciphertext = Vec::new();
        encrypt_stream(
            &key,
            &mut Cursor::new(vec![2u8; PLAIN_CHUNK_SIZE]),
            &mut ciphertext,
            &token,
        )
        .unwrap();
        ciphertext.truncate(ciphertext.len() - 5);

        let mut recovered = Vec::new();
        let result = decrypt_stream(&key, &mut Cursor::new(ciphertext), &mut recovered, &token);
        assert!(matches!(result, Err(Error::Decrypt)));
        assert!(recovered.is_empty());
    }

    #[test]
    fn test_preflight_too_large() {
        assert!(!too_large_to_chunk(0));
        assert!(!too_large_to_chunk(PLAIN_CHUNK_SIZE as u64 * MAX_CHUNK_COUNT));
        assert!(too_large_to_chunk(
            PLAIN_CHUNK_SIZE as u64 * MAX_CHUNK_COUNT + 1
        ));
    }

    #[test]
    fn test_cancelled_before_output() {
        let key = KeyContainer::random().unwrap();
        let token = CancelToken::new();
        token.cancel();

        let mut out = Vec::new();
        let result = encrypt_stream(&key, &mut Cursor::new(vec![0u8; 100]), &mut out, &token);
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_frames_use_incrementing_nonces() {
        let key = KeyContainer::random().unwrap();
        let token = CancelToken::new();
        let plaintext = vec![3u8; PLAIN_CHUNK_SIZE * 3];

        let mut ciphertext = Vec::new();
        encrypt_stream(&key, &mut Cursor::new(plaintext), &mut ciphertext, &token).unwrap();

        let n0 = &ciphertext[..NONCE_SIZE];
        let n1 = &ciphertext[CIPHER_CHUNK_SIZE..CIPHER_CHUNK_SIZE + NONCE_SIZE];

        let mut expected = [0u8; NONCE_SIZE];
        expected.copy_from_slice(n0);
        increment_nonce(&mut expected);
        assert_eq!(n1, expected);
    }
}
