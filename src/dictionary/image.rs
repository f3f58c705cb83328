//! Persisted dictionary image.
//!
//! ```text
//! [4 bytes]  magic "TDIC"
//! [u32]      format version
//! [u16 + N]  locale (UTF-8)
//! [u16]      attribute count, then per attribute [u16 + N] key, [u16 + N] value
//! [u32]      unigram count
//! [u32]      bigram count
//! [...]      node map slot arena
//! [...]      bigram map slot arena
//! [u32 + N]  terminal buffer
//! [u32 + N]  property buffer
//! [u32]      Adler-32 of everything above
//! ```
//!
//! All integers are little endian.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use adler2::adler32_slice;
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, trace};
use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::trie_map::TrieMap;

use super::header::{DictionaryHeader, FormatVersion};
use super::structure::Buffers;

const MAGIC: &[u8; 4] = b"TDIC";
const CHECKSUM_SIZE: usize = 4;

fn write_str(out: &mut Vec<u8>, s: &str) -> Result<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| Error::InvalidFormat(format!("header string of {} bytes", s.len())))?;
    out.write_u16::<LittleEndian>(len)?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| Error::InvalidFormat(format!("buffer of {} bytes", bytes.len())))?;
    out.write_u32::<LittleEndian>(len)?;
    out.extend_from_slice(bytes);
    Ok(())
}

fn take<'a>(r: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    if r.len() < len {
        return Err(Error::InvalidFormat(format!(
            "field of {len} bytes overruns image ({} left)",
            r.len()
        )));
    }
    let (head, tail) = r.split_at(len);
    *r = tail;
    Ok(head)
}

fn read_str(r: &mut &[u8]) -> Result<String> {
    let len = r.read_u16::<LittleEndian>()? as usize;
    let bytes = take(r, len)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| Error::InvalidFormat("header string is not UTF-8".into()))
}

fn read_bytes(r: &mut &[u8]) -> Result<Vec<u8>> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    Ok(take(r, len)?.to_vec())
}

/// Serializes a structure into a complete image, checksum included.
pub(crate) fn encode(header: &DictionaryHeader, buffers: &Buffers) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(
        64 + buffers.terminals.len()
            + buffers.properties.len()
            + buffers.node_map.used_bytes()
            + buffers.bigram_map.used_bytes(),
    );
    out.extend_from_slice(MAGIC);
    out.write_u32::<LittleEndian>(header.format_version().number())?;
    write_str(&mut out, header.locale())?;
    let attribute_count = u16::try_from(header.attributes().len())
        .map_err(|_| Error::InvalidFormat("too many header attributes".into()))?;
    out.write_u16::<LittleEndian>(attribute_count)?;
    for (key, value) in header.attributes() {
        write_str(&mut out, key)?;
        write_str(&mut out, value)?;
    }
    out.write_u32::<LittleEndian>(buffers.unigram_count as u32)?;
    out.write_u32::<LittleEndian>(buffers.bigram_count as u32)?;
    buffers.node_map.write_to(&mut out)?;
    buffers.bigram_map.write_to(&mut out)?;
    write_bytes(&mut out, &buffers.terminals)?;
    write_bytes(&mut out, &buffers.properties)?;

    let checksum = adler32_slice(&out);
    out.write_u32::<LittleEndian>(checksum)?;
    Ok(out)
}

/// Parses and validates an image produced by [`encode`].
pub(crate) fn decode(bytes: &[u8]) -> Result<(DictionaryHeader, Buffers)> {
    if bytes.len() < MAGIC.len() + 4 + CHECKSUM_SIZE || &bytes[..MAGIC.len()] != MAGIC {
        return Err(Error::InvalidFormat("not a dictionary image".into()));
    }
    let (content, tail) = bytes.split_at(bytes.len() - CHECKSUM_SIZE);
    let expected = LittleEndian::read_u32(tail);
    let actual = adler32_slice(content);
    trace!("image checksum: expected={expected:#010x}, actual={actual:#010x}");
    if expected != actual {
        return Err(Error::ChecksumMismatch { expected, actual });
    }

    decode_content(&content[MAGIC.len()..]).map_err(|e| match e {
        Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Error::InvalidFormat("truncated image".into())
        }
        e => e,
    })
}

fn decode_content(mut r: &[u8]) -> Result<(DictionaryHeader, Buffers)> {
    let version = FormatVersion::try_from(r.read_u32::<LittleEndian>()?)?;
    let locale = read_str(&mut r)?;
    let attribute_count = r.read_u16::<LittleEndian>()?;
    let mut attributes = BTreeMap::new();
    for _ in 0..attribute_count {
        let key = read_str(&mut r)?;
        let value = read_str(&mut r)?;
        attributes.insert(key, value);
    }
    let unigram_count = r.read_u32::<LittleEndian>()? as usize;
    let bigram_count = r.read_u32::<LittleEndian>()? as usize;
    let node_map = TrieMap::read_from(&mut r)?;
    let bigram_map = TrieMap::read_from(&mut r)?;
    let terminals = read_bytes(&mut r)?;
    let properties = read_bytes(&mut r)?;
    if !r.is_empty() {
        return Err(Error::InvalidFormat(format!("{} trailing bytes", r.len())));
    }

    let header = DictionaryHeader::new(version, locale, attributes);
    let buffers = Buffers {
        node_map,
        bigram_map,
        terminals,
        properties,
        unigram_count,
        bigram_count,
    };
    Ok((header, buffers))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Writes an image next to `path` and renames it into place.
pub(crate) fn write_file(path: &Path, header: &DictionaryHeader, buffers: &Buffers) -> Result<()> {
    let bytes = encode(header, buffers)?;
    let tmp = tmp_path(path);
    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(&bytes)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    debug!("wrote {} byte image to {}", bytes.len(), path.display());
    Ok(())
}

/// Maps the file at `path` and decodes the `size` bytes at `offset`; `size == 0`
/// means "to the end of the file".
pub(crate) fn read_file(
    path: &Path,
    offset: usize,
    size: usize,
) -> Result<(DictionaryHeader, Buffers)> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Err(Error::InvalidFormat(format!("{} is empty", path.display())));
    }
    // SAFETY: the map is only read while this function runs, and decoding copies
    // everything it keeps into owned buffers.
    let mmap = unsafe { Mmap::map(&file)? };
    let end = if size == 0 {
        Some(mmap.len())
    } else {
        offset.checked_add(size)
    };
    let window = end
        .and_then(|end| mmap.get(offset..end))
        .ok_or_else(|| {
            Error::InvalidFormat(format!(
                "window {offset}+{size} outside {} byte file",
                mmap.len()
            ))
        })?;
    decode(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::header::DATE_KEY;

    fn sample() -> (DictionaryHeader, Buffers) {
        let mut attributes = BTreeMap::new();
        attributes.insert(DATE_KEY.to_string(), "1400000000".to_string());
        let header = DictionaryHeader::new(FormatVersion::V4, "fr", attributes);
        let mut buffers = Buffers::default();
        buffers.node_map.put_root(0x61, 1).unwrap();
        buffers.terminals = vec![1, 0x61, 0, 0, 0, 0, 0, 0, 0];
        buffers.properties = vec![0, 7, 0];
        buffers.unigram_count = 1;
        (header, buffers)
    }

    #[test]
    fn test_encode_decode() {
        let (header, buffers) = sample();
        let bytes = encode(&header, &buffers).unwrap();
        let (decoded_header, decoded) = decode(&bytes).unwrap();
        assert_eq!(decoded_header, header);
        assert_eq!(decoded.terminals, buffers.terminals);
        assert_eq!(decoded.properties, buffers.properties);
        assert_eq!(decoded.unigram_count, 1);
        assert_eq!(decoded.node_map.get_root(0x61), Some(1));
    }

    #[test]
    fn test_rejects_damaged_images() {
        let (header, buffers) = sample();
        let bytes = encode(&header, &buffers).unwrap();

        let mut flipped = bytes.clone();
        let mid = flipped.len() / 2;
        flipped[mid] ^= 0x40;
        assert!(matches!(decode(&flipped), Err(Error::ChecksumMismatch { .. })));

        assert!(decode(&bytes[..bytes.len() - 1]).is_err());
        assert!(matches!(decode(b"nope"), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let (header, buffers) = sample();
        let mut bytes = encode(&header, &buffers).unwrap();
        LittleEndian::write_u32(&mut bytes[4..8], 7);
        let len = bytes.len();
        let checksum = adler32_slice(&bytes[..len - CHECKSUM_SIZE]);
        LittleEndian::write_u32(&mut bytes[len - CHECKSUM_SIZE..], checksum);
        assert!(matches!(decode(&bytes), Err(Error::UnsupportedFormatVersion(7))));
    }

    #[test]
    fn test_read_file_window() {
        let (header, buffers) = sample();
        let image = encode(&header, &buffers).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embedded.bin");
        let mut file_bytes = vec![0xAA; 100];
        file_bytes.extend_from_slice(&image);
        file_bytes.extend_from_slice(&[0xBB; 10]);
        fs::write(&path, &file_bytes).unwrap();

        let (decoded_header, _) = read_file(&path, 100, image.len()).unwrap();
        assert_eq!(decoded_header, header);
        assert!(read_file(&path, 100, 0).is_err());
        assert!(matches!(
            read_file(&path, file_bytes.len(), 1),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_write_file_replaces_atomically() {
        let (header, buffers) = sample();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.dict");
        fs::write(&path, b"old").unwrap();
        write_file(&path, &header, &buffers).unwrap();
        assert!(!tmp_path(&path).exists());
        let (decoded_header, _) = read_file(&path, 0, 0).unwrap();
        assert_eq!(decoded_header, header);
    }
}
