// VCDIFF decoder: instruction decoding and window reconstruction.
//
// Decodes a complete in-memory delta against an in-memory dictionary.
// Follows the RFC 3284 state progression: file header, then for each
// window the window header, the three sections, and instruction execution.

use std::borrow::Cow;

use log::trace;

use super::address_cache::{AddressCache, AddressCacheError};
use super::code_table::{self, InstructionType};
use super::header::{DeltaIndicator, FileHeader, SliceReader, WindowHeader};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("truncated input: {0}")]
    Truncated(&'static str),
    #[error("checksum mismatch: expected {expected:#010X}, got {actual:#010X}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<AddressCacheError> for DecodeError {
    fn from(e: AddressCacheError) -> Self {
        Self::InvalidInput(format!("address decode: {e}"))
    }
}

/// Default ceiling on the total reconstructed length of one delta.
pub const DEFAULT_MAX_OUTPUT_LEN: usize = 1 << 28;

/// Borrowed DATA/INST/ADDR section triplet for one window.
#[derive(Clone, Copy)]
pub struct WindowSections<'a> {
    pub data: &'a [u8],
    pub inst: &'a [u8],
    pub addr: &'a [u8],
}

/// Decode a VCDIFF delta from memory, verifying window checksums.
///
/// `delta` is the complete VCDIFF byte stream and `source` the dictionary
/// (may be empty when the delta never copies from it).
pub fn decode_memory(delta: &[u8], source: &[u8]) -> Result<Vec<u8>, DecodeError> {
    decode_memory_with(delta, source, true, DEFAULT_MAX_OUTPUT_LEN)
}

/// Decode a VCDIFF delta from memory, optionally skipping checksum verification.
///
/// Windows are checked against `max_output_len` before anything is
/// allocated for them, so the total output never exceeds it.
pub fn decode_memory_with(
    delta: &[u8],
    source: &[u8],
    verify_checksum: bool,
    max_output_len: usize,
) -> Result<Vec<u8>, DecodeError> {
    let mut r = SliceReader::new(delta);
    let file_header = FileHeader::parse(&mut r)?;
    trace!(
        "vcdiff file header: indicator={:?} secondary={:?}",
        file_header.indicator, file_header.secondary_id
    );

    let mut output = Vec::new();
    let mut acache = AddressCache::new();

    while !r.is_empty() {
        let wh = WindowHeader::parse(&mut r)?;
        trace!(
            "vcdiff window: indicator={:?} copy={}@{} target_len={}",
            wh.indicator, wh.copy_window_len, wh.copy_window_offset, wh.target_window_len
        );

        if wh.delta_indicator != DeltaIndicator::empty() {
            return Err(DecodeError::Unsupported(format!(
                "secondary compression ({:?})",
                wh.delta_indicator
            )));
        }

        let room = max_output_len.saturating_sub(output.len());
        if wh.target_window_len > room as u64 {
            return Err(DecodeError::InvalidInput(format!(
                "output limit of {max_output_len} bytes exceeded"
            )));
        }

        let sections = WindowSections {
            data: r.read_section(wh.data_len, "data section")?,
            inst: r.read_section(wh.inst_len, "instruction section")?,
            addr: r.read_section(wh.addr_len, "address section")?,
        };

        let window = copy_window(&wh, source, &output)?;
        decode_window_into(&wh, sections, &window, &mut acache, &mut output)?;

        if verify_checksum && let Some(expected) = wh.adler32 {
            let window = &output[output.len() - wh.target_window_len as usize..];
            let actual = compute_adler32(window);
            if actual != expected {
                return Err(DecodeError::ChecksumMismatch { expected, actual });
            }
        }
    }

    Ok(output)
}

/// Resolve the segment COPY addresses below `copy_window_len` refer to.
///
/// Target windows copy from already reconstructed output, which must be
/// snapshotted because the window appends to the same buffer.
fn copy_window<'a>(
    header: &WindowHeader,
    source: &'a [u8],
    output: &[u8],
) -> Result<Cow<'a, [u8]>, DecodeError> {
    if header.has_source() {
        window_slice(header, source, "source").map(Cow::Borrowed)
    } else if header.has_target() {
        window_slice(header, output, "target").map(|segment| Cow::Owned(segment.to_vec()))
    } else {
        Ok(Cow::Borrowed(&[]))
    }
}

fn window_slice<'s>(
    header: &WindowHeader,
    from: &'s [u8],
    label: &str,
) -> Result<&'s [u8], DecodeError> {
    usize::try_from(header.copy_window_offset)
        .ok()
        .zip(usize::try_from(header.copy_window_len).ok())
        .and_then(|(offset, len)| from.get(offset..offset.checked_add(len)?))
        .ok_or_else(|| {
            DecodeError::InvalidInput(format!(
                "{label} window {}@{} exceeds {label} length {}",
                header.copy_window_len,
                header.copy_window_offset,
                from.len()
            ))
        })
}

/// Decode a single window, appending its target bytes to `output`.
///
/// Target self-copy addresses are relative to the start of this window, so
/// previously decoded windows in `output` are skipped over.
pub fn decode_window_into(
    header: &WindowHeader,
    sections: WindowSections<'_>,
    copy_window: &[u8],
    acache: &mut AddressCache,
    output: &mut Vec<u8>,
) -> Result<(), DecodeError> {
    let target_len = header.target_window_len as usize;
    let base_offset = output.len();
    output.reserve(target_len);
    acache.reset();

    let table = code_table::default_code_table();
    let mut inst = SliceReader::new(sections.inst);
    let mut data = SliceReader::new(sections.data);
    let mut addr_pos = 0usize;
    let copy_len = copy_window.len();

    while !inst.is_empty() {
        let opcode = inst.read_u8("instruction section")?;

        for half in table[opcode as usize].halves() {
            let size = if half.size == 0 {
                inst.read_usize("instruction size")?
            } else {
                half.size as usize
            };

            let produced = output.len() - base_offset;
            if size > target_len - produced {
                return Err(DecodeError::InvalidInput(format!(
                    "instructions overflow target window of {target_len} bytes"
                )));
            }

            match half.kind {
                InstructionType::Noop => {}
                InstructionType::Add => {
                    output.extend_from_slice(data.read_bytes(size, "data section (ADD)")?);
                }
                InstructionType::Run => {
                    let byte = data.read_u8("data section (RUN)")?;
                    output.resize(output.len() + size, byte);
                }
                InstructionType::Copy(mode) => {
                    let here = (copy_len + produced) as u64;
                    let (addr, consumed) =
                        acache.decode(mode, &sections.addr[addr_pos..], here)?;
                    addr_pos += consumed;
                    let addr = addr as usize;

                    if addr < copy_len {
                        let head = size.min(copy_len - addr);
                        output.extend_from_slice(&copy_window[addr..addr + head]);
                        // The rest continues at the start of this target window.
                        for i in base_offset..base_offset + (size - head) {
                            let byte = output[i];
                            output.push(byte);
                        }
                    } else {
                        let start = base_offset + (addr - copy_len);
                        if start + size <= output.len() {
                            output.extend_from_within(start..start + size);
                        } else {
                            // Overlapping copy: each byte may be one just written.
                            for i in start..start + size {
                                let byte = output[i];
                                output.push(byte);
                            }
                        }
                    }
                }
            }
        }
    }

    let written = output.len() - base_offset;
    if written != target_len {
        return Err(DecodeError::InvalidInput(format!(
            "target size mismatch: expected {target_len}, got {written}"
        )));
    }

    Ok(())
}

fn compute_adler32(data: &[u8]) -> u32 {
    #[cfg(feature = "adler32")]
    {
        let mut hasher = simd_adler32::Adler32::new();
        hasher.write(data);
        hasher.finish()
    }
    #[cfg(not(feature = "adler32"))]
    {
        const MOD_ADLER: u32 = 65521;
        let mut a: u32 = 1;
        let mut b: u32 = 0;
        for &byte in data {
            a = (a + u32::from(byte)) % MOD_ADLER;
            b = (b + a) % MOD_ADLER;
        }
        (b << 16) | a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &[u8] = b"Lorem ipsum dolor sit amet";
    const DELTA: &[u8] = &[
        0xD6, 0xC3, 0xC4, 0x00, 0x00, 0x01, 0x1A, 0x00, 0x28, 0x38, 0x00, 0x1E, 0x04, 0x01, 0x2C,
        0x20, 0x63, 0x6F, 0x6E, 0x73, 0x65, 0x63, 0x74, 0x65, 0x74, 0x75, 0x72, 0x20, 0x61, 0x64,
        0x69, 0x70, 0x69, 0x73, 0x63, 0x69, 0x6E, 0x67, 0x20, 0x65, 0x6C, 0x69, 0x74, 0x2E, 0x13,
        0x1A, 0x01, 0x1E, 0x00,
    ];

    fn varint(mut v: u64) -> Vec<u8> {
        let mut out = vec![(v & 0x7F) as u8];
        v >>= 7;
        while v > 0 {
            out.insert(0, (v & 0x7F) as u8 | 0x80);
            v >>= 7;
        }
        out
    }

    struct Window<'a> {
        indicator: u8,
        copy: Option<(u64, u64)>,
        target_len: u64,
        data: &'a [u8],
        inst: &'a [u8],
        addr: &'a [u8],
        adler32: Option<u32>,
    }

    impl Window<'_> {
        fn add_only(data: &[u8]) -> Window<'_> {
            Window {
                indicator: 0,
                copy: None,
                target_len: data.len() as u64,
                data,
                inst: &[0x01],
                addr: &[],
                adler32: None,
            }
        }

        fn emit(&self, out: &mut Vec<u8>) {
            let mut body = varint(self.target_len);
            body.push(0);
            for section in [self.data, self.inst, self.addr] {
                body.extend(varint(section.len() as u64));
            }
            if let Some(sum) = self.adler32 {
                body.extend(sum.to_be_bytes());
            }
            body.extend_from_slice(self.data);
            body.extend_from_slice(self.inst);
            body.extend_from_slice(self.addr);

            out.push(self.indicator);
            if let Some((len, offset)) = self.copy {
                out.extend(varint(len));
                out.extend(varint(offset));
            }
            out.extend(varint(body.len() as u64));
            out.extend(body);
        }
    }

    fn delta(windows: &[Window<'_>]) -> Vec<u8> {
        let mut out = vec![0xD6, 0xC3, 0xC4, 0x00, 0x00];
        for window in windows {
            window.emit(&mut out);
        }
        out
    }

    #[test]
    fn decodes_published_delta() {
        let decoded = decode_memory(DELTA, BASE).unwrap();
        assert_eq!(
            decoded,
            b"Lorem ipsum dolor sit amet, consectetur adipiscing elit."
        );
    }

    #[test]
    fn published_delta_needs_its_source() {
        let err = decode_memory(DELTA, b"too short").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidInput(msg) if msg.contains("source window")));
    }

    #[test]
    fn decode_add_with_explicit_size() {
        let mut w = Window::add_only(b"Hello, world!");
        w.inst = &[0x01, 13];
        assert_eq!(decode_memory(&delta(&[w]), &[]).unwrap(), b"Hello, world!");
    }

    #[test]
    fn decode_run() {
        let w = Window {
            indicator: 0,
            copy: None,
            target_len: 50,
            data: &[0xAA],
            inst: &[0x00, 50],
            addr: &[],
            adler32: None,
        };
        assert_eq!(decode_memory(&delta(&[w]), &[]).unwrap(), vec![0xAA; 50]);
    }

    #[test]
    fn decode_overlapping_self_copy() {
        // ADD "A", then COPY 5 from target address 0.
        let w = Window {
            indicator: 0,
            copy: None,
            target_len: 6,
            data: b"A",
            inst: &[0x02, 0x13, 5],
            addr: &[0],
            adler32: None,
        };
        assert_eq!(decode_memory(&delta(&[w]), &[]).unwrap(), b"AAAAAA");
    }

    #[test]
    fn decode_double_opcode_add_then_copy() {
        // Opcode 163 = ADD(1) + COPY(4, SELF).
        let w = Window {
            indicator: 0x01,
            copy: Some((4, 0)),
            target_len: 5,
            data: b">",
            inst: &[163],
            addr: &[0],
            adler32: None,
        };
        assert_eq!(decode_memory(&delta(&[w]), b"wxyz").unwrap(), b">wxyz");
    }

    #[test]
    fn decode_target_window_copies_earlier_output() {
        let first = Window {
            indicator: 0,
            copy: None,
            target_len: 4,
            data: b"abcd",
            inst: &[0x05],
            addr: &[],
            adler32: None,
        };
        let second = Window {
            indicator: 0x02,
            copy: Some((4, 0)),
            target_len: 8,
            data: b"efgh",
            inst: &[0x14, 0x05],
            addr: &[0],
            adler32: None,
        };
        assert_eq!(
            decode_memory(&delta(&[first, second]), &[]).unwrap(),
            b"abcdabcdefgh"
        );
    }

    #[test]
    fn checksum_is_verified() {
        let mut w = Window::add_only(b"Hello");
        w.indicator = 0x04;
        w.inst = &[0x06];
        w.adler32 = Some(0x058C_01F5);
        assert_eq!(decode_memory(&delta(&[w]), &[]).unwrap(), b"Hello");
    }

    #[test]
    fn checksum_mismatch_is_reported_unless_disabled() {
        let mut w = Window::add_only(b"Hello");
        w.indicator = 0x04;
        w.inst = &[0x06];
        w.adler32 = Some(0xDEAD_BEEF);
        let bytes = delta(&[w]);

        let err = decode_memory(&bytes, &[]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::ChecksumMismatch {
                expected: 0xDEAD_BEEF,
                actual: 0x058C_01F5
            }
        );
        let lenient = decode_memory_with(&bytes, &[], false, DEFAULT_MAX_OUTPUT_LEN).unwrap();
        assert_eq!(lenient, b"Hello");
    }

    #[test]
    fn copy_runs_from_source_into_target() {
        // COPY 6 from SELF address 2: "cd" from the source, then "cdcd"
        // from the bytes this same instruction just wrote.
        let w = Window {
            indicator: 0x01,
            copy: Some((4, 0)),
            target_len: 6,
            data: &[],
            inst: &[0x13, 6],
            addr: &[2],
            adler32: None,
        };
        let bytes = delta(&[w]);
        assert_eq!(
            bytes,
            [
                0xD6, 0xC3, 0xC4, 0x00, 0x00, 0x01, 0x04, 0x00, 0x08, 0x06, 0x00, 0x00, 0x02,
                0x01, 0x13, 0x06, 0x02
            ]
        );
        assert_eq!(decode_memory(&bytes, b"abcd").unwrap(), b"cdcdcd");
    }

    #[test]
    fn copy_crosses_into_earlier_target_bytes() {
        // ADD "xy", then COPY 4 from source address 1: "bc" then "xy".
        let w = Window {
            indicator: 0x01,
            copy: Some((3, 0)),
            target_len: 6,
            data: b"xy",
            inst: &[0x03, 0x14],
            addr: &[1],
            adler32: None,
        };
        assert_eq!(decode_memory(&delta(&[w]), b"abc").unwrap(), b"xybcxy");
    }

    #[test]
    fn total_output_limit_is_enforced() {
        let run = || Window {
            indicator: 0,
            copy: None,
            target_len: 100,
            data: &[0x55],
            inst: &[0x00, 100],
            addr: &[],
            adler32: None,
        };
        let bytes = delta(&[run(), run()]);

        assert_eq!(decode_memory_with(&bytes, &[], true, 200).unwrap().len(), 200);
        let err = decode_memory_with(&bytes, &[], true, 199).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidInput(msg) if msg.contains("limit")));
    }

    #[test]
    fn target_size_mismatch_is_rejected() {
        let mut w = Window::add_only(b"abcd");
        w.target_len = 5;
        w.inst = &[0x05];
        let err = decode_memory(&delta(&[w]), &[]).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidInput(msg) if msg.contains("mismatch")));
    }

    #[test]
    fn oversized_instruction_is_rejected_before_allocation() {
        let w = Window {
            indicator: 0,
            copy: None,
            target_len: 1,
            data: &[0],
            inst: &[0x00, 0xFF, 0xFF, 0xFF, 0x7F],
            addr: &[],
            adler32: None,
        };
        let err = decode_memory(&delta(&[w]), &[]).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidInput(msg) if msg.contains("overflow")));
    }

    #[test]
    fn secondary_compression_is_unsupported() {
        let mut bytes = delta(&[Window::add_only(b"x")]);
        // win_ind, enc_len, target_len, then the delta indicator.
        bytes[8] = 0x01;
        let err = decode_memory(&bytes, &[]).unwrap_err();
        assert!(matches!(err, DecodeError::Unsupported(_)));
    }

    #[test]
    fn truncated_delta_never_panics() {
        // A five byte prefix is a complete header-only delta.
        for len in (0..DELTA.len()).filter(|&len| len != 5) {
            assert!(decode_memory(&DELTA[..len], BASE).is_err(), "prefix {len}");
        }
    }

    #[test]
    fn header_only_delta_decodes_to_empty() {
        assert!(decode_memory(&[0xD6, 0xC3, 0xC4, 0x00, 0x00], b"base").unwrap().is_empty());
    }
}
