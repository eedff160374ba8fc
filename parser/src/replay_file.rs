//! Container layout of a `.wowsreplay` file.
//!
//! ```text
//! magic:u32 | blocks:u32
//! repeat blocks times: size:u32 | size bytes      (block 0 = JSON metadata)
//! remainder: Blowfish-encrypted, zlib-compressed packet stream
//! ```
//!
//! All integers are little-endian. The cipher runs on 8-byte blocks; each
//! decrypted block is XORed with the previous decrypted block before being
//! emitted (the first block passes through untouched).

use crate::meta::ReplayMeta;
use crate::{IResult, ReplayError, Result};
use blowfish::Blowfish;
use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, KeyInit};
use flate2::read::ZlibDecoder;
use nom::bytes::complete::take;
use nom::number::complete::le_u32;
use std::io::Read;
use std::path::Path;

pub const REPLAY_MAGIC: u32 = 0x1134_3212;

/// Fixed cipher key derived from the game client. Identical for every
/// replay the client writes.
pub(crate) const CIPHER_KEY: [u8; 16] = [
    0x29, 0xB7, 0xC9, 0x09, 0x38, 0x3F, 0x84, 0x88, 0xFA, 0x98, 0xEC, 0x4E, 0x13, 0x19, 0x79, 0xFB,
];

/// A replay split into its metadata block and the inflated packet stream.
#[derive(Debug, Clone)]
pub struct ReplayFile {
    pub meta: ReplayMeta,
    /// Decrypted and decompressed packet stream, ready for the packet walk.
    pub packet_data: Vec<u8>,
}

impl ReplayFile {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (encrypted, json) = parse_container(data)?;

        let meta: ReplayMeta = serde_json::from_slice(json)?;
        let packet_data = decrypt_and_inflate(encrypted)?;

        Ok(ReplayFile { meta, packet_data })
    }
}

/// Split the container into (encrypted tail, metadata JSON bytes).
fn parse_container(data: &[u8]) -> Result<(&[u8], &[u8])> {
    fn header(i: &[u8]) -> IResult<'_, (u32, u32)> {
        let (i, magic) = le_u32(i)?;
        let (i, blocks) = le_u32(i)?;
        Ok((i, (magic, blocks)))
    }

    fn block(i: &[u8]) -> IResult<'_, &[u8]> {
        let (i, size) = le_u32(i)?;
        take(size as usize)(i)
    }

    let (mut rest, (magic, blocks)) =
        header(data).map_err(|_| ReplayError::MalformedHeader("file shorter than header"))?;

    if magic != REPLAY_MAGIC {
        return Err(ReplayError::MalformedHeader("bad magic"));
    }
    if blocks == 0 {
        return Err(ReplayError::MalformedHeader("no metadata block"));
    }

    let mut json: Option<&[u8]> = None;
    for _ in 0..blocks {
        let (r, body) =
            block(rest).map_err(|_| ReplayError::MalformedHeader("metadata block truncated"))?;
        rest = r;
        // Block 0 carries the JSON; later blocks hold auxiliary data the
        // pipeline never reads.
        if json.is_none() {
            json = Some(body);
        }
    }

    let json = json.ok_or(ReplayError::MalformedHeader("no metadata block"))?;
    Ok((rest, json))
}

/// Decrypt the packet stream and inflate the result.
fn decrypt_and_inflate(encrypted: &[u8]) -> Result<Vec<u8>> {
    if encrypted.is_empty() {
        return Err(ReplayError::TruncatedStream { offset: 0 });
    }
    if encrypted.len() % 8 != 0 {
        return Err(ReplayError::TruncatedStream {
            offset: encrypted.len() - encrypted.len() % 8,
        });
    }

    let cipher: Blowfish = Blowfish::new_from_slice(&CIPHER_KEY)
        .map_err(|_| ReplayError::DecryptFailure("bad cipher key length"))?;

    let mut plain = Vec::with_capacity(encrypted.len());
    let mut prev = [0u8; 8];
    let mut first = true;
    for chunk in encrypted.chunks_exact(8) {
        let mut block = [0u8; 8];
        block.copy_from_slice(chunk);
        cipher.decrypt_block(GenericArray::from_mut_slice(&mut block));
        if !first {
            for (b, p) in block.iter_mut().zip(prev.iter()) {
                *b ^= p;
            }
        }
        prev = block;
        first = false;
        plain.extend_from_slice(&block);
    }

    let mut inflated = Vec::new();
    ZlibDecoder::new(&plain[..])
        .read_to_end(&mut inflated)
        .map_err(|_| ReplayError::DecryptFailure("packet stream does not inflate"))?;
    Ok(inflated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;

    #[test]
    fn rejects_bad_magic() {
        let mut data = testkit::ReplayBuilder::new().build();
        data[0] ^= 0xFF;
        let err = ReplayFile::from_bytes(&data).unwrap_err();
        assert!(matches!(err, ReplayError::MalformedHeader("bad magic")));
    }

    #[test]
    fn rejects_short_file() {
        let err = ReplayFile::from_bytes(&[0x12, 0x32]).unwrap_err();
        assert!(matches!(err, ReplayError::MalformedHeader(_)));
    }

    #[test]
    fn rejects_ragged_cipher_tail() {
        let mut data = testkit::ReplayBuilder::new().build();
        data.push(0xAB);
        let err = ReplayFile::from_bytes(&data).unwrap_err();
        assert!(matches!(err, ReplayError::TruncatedStream { .. }));
    }

    #[test]
    fn round_trips_metadata_and_stream() {
        let data = testkit::ReplayBuilder::new().build();
        let replay = ReplayFile::from_bytes(&data).unwrap();
        assert_eq!(replay.meta.clientVersionFromExe, "14,11,0,10859530");
        assert!(!replay.packet_data.is_empty());
    }

    #[test]
    fn corrupted_cipher_text_fails_to_inflate() {
        let (mut data, encrypted_at) = testkit::ReplayBuilder::new().build_parts();
        // Stomp the first cipher block; the zlib header never survives.
        data[encrypted_at] ^= 0x5A;
        data[encrypted_at + 1] ^= 0x5A;
        let err = ReplayFile::from_bytes(&data).unwrap_err();
        assert!(matches!(err, ReplayError::DecryptFailure(_)));
    }
}
