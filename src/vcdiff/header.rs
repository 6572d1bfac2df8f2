// VCDIFF file header and per-window header parsing (RFC 3284, Section 4).

use bitflags::bitflags;

use super::decoder::DecodeError;
use super::varint::{self, VarIntError};

/// VCDIFF magic (`'V' | 0x80`, `'C' | 0x80`, `'D' | 0x80`) followed by version 0.
pub const VCDIFF_MAGIC: [u8; 4] = [0xD6, 0xC3, 0xC4, 0x00];

/// Maximum decoded window size (16 MiB).
pub const HARD_MAX_WINSIZE: u64 = 1 << 24;

bitflags! {
    /// File header indicator (`Hdr_Indicator`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HeaderIndicator: u8 {
        const SECONDARY = 1 << 0;
        const CODETABLE = 1 << 1;
        const APPHEADER = 1 << 2;
    }

    /// Window indicator (`Win_Indicator`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WindowIndicator: u8 {
        const SOURCE = 1 << 0;
        const TARGET = 1 << 1;
        const ADLER32 = 1 << 2;
    }

    /// Delta indicator (`Delta_Indicator`): secondary compression per section.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DeltaIndicator: u8 {
        const DATACOMP = 1 << 0;
        const INSTCOMP = 1 << 1;
        const ADDRCOMP = 1 << 2;
    }
}

/// Returns `true` if `buffer` starts with the VCDIFF magic and carries at
/// least one byte past it.
///
/// This is a classification only: a buffer that passes may still be
/// rejected by the decoder.
///
/// ```
/// use deltachain::vcdiff::header::is_vcdiff;
///
/// assert!(is_vcdiff(&[0xD6, 0xC3, 0xC4, 0x00, 0x00]));
/// assert!(!is_vcdiff(&[0xD6, 0xC3, 0xC4, 0x00]));
/// assert!(!is_vcdiff(b"{\"foo\":\"bar\"}"));
/// ```
pub fn is_vcdiff(buffer: &[u8]) -> bool {
    buffer.len() > VCDIFF_MAGIC.len() && buffer.starts_with(&VCDIFF_MAGIC)
}

// ---------------------------------------------------------------------------
// Slice reader
// ---------------------------------------------------------------------------

/// Forward-only cursor over an in-memory delta.
pub(crate) struct SliceReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub(crate) fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub(crate) fn read_u8(&mut self, what: &'static str) -> Result<u8, DecodeError> {
        let &byte = self
            .remaining()
            .first()
            .ok_or(DecodeError::Truncated(what))?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn read_bytes(
        &mut self,
        len: usize,
        what: &'static str,
    ) -> Result<&'a [u8], DecodeError> {
        let bytes = self
            .remaining()
            .get(..len)
            .ok_or(DecodeError::Truncated(what))?;
        self.pos += len;
        Ok(bytes)
    }

    pub(crate) fn read_u64(&mut self, what: &'static str) -> Result<u64, DecodeError> {
        let (val, consumed) =
            varint::read_u64(self.remaining()).map_err(|e| varint_error(e, what))?;
        self.pos += consumed;
        Ok(val)
    }

    pub(crate) fn read_usize(&mut self, what: &'static str) -> Result<usize, DecodeError> {
        let (val, consumed) =
            varint::read_usize(self.remaining()).map_err(|e| varint_error(e, what))?;
        self.pos += consumed;
        Ok(val)
    }

    /// Read a section length and borrow that many bytes.
    pub(crate) fn read_section(
        &mut self,
        len: u64,
        what: &'static str,
    ) -> Result<&'a [u8], DecodeError> {
        let len = usize::try_from(len).map_err(|_| DecodeError::Truncated(what))?;
        self.read_bytes(len, what)
    }
}

fn varint_error(e: VarIntError, what: &'static str) -> DecodeError {
    match e {
        VarIntError::Underflow => DecodeError::Truncated(what),
        VarIntError::Overflow => DecodeError::InvalidInput(format!("{what}: {e}")),
    }
}

// ---------------------------------------------------------------------------
// File header
// ---------------------------------------------------------------------------

/// Parsed VCDIFF file header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileHeader {
    pub indicator: HeaderIndicator,
    /// Secondary compressor ID (if `SECONDARY` is set).
    pub secondary_id: Option<u8>,
    /// Application-defined header data (if `APPHEADER` is set).
    pub app_header: Option<Vec<u8>>,
}

impl FileHeader {
    pub(crate) fn parse(r: &mut SliceReader<'_>) -> Result<Self, DecodeError> {
        let magic = r.read_bytes(VCDIFF_MAGIC.len(), "file header")?;
        if magic[..3] != VCDIFF_MAGIC[..3] {
            return Err(DecodeError::InvalidInput(format!(
                "invalid VCDIFF magic: {:02X} {:02X} {:02X}",
                magic[0], magic[1], magic[2]
            )));
        }
        if magic[3] != VCDIFF_MAGIC[3] {
            return Err(DecodeError::Unsupported(format!(
                "VCDIFF version {:#04X}",
                magic[3]
            )));
        }

        let bits = r.read_u8("header indicator")?;
        let indicator = HeaderIndicator::from_bits(bits).ok_or_else(|| {
            DecodeError::InvalidInput(format!("invalid header indicator bits: {bits:#04X}"))
        })?;

        let secondary_id = if indicator.contains(HeaderIndicator::SECONDARY) {
            Some(r.read_u8("secondary compressor id")?)
        } else {
            None
        };

        if indicator.contains(HeaderIndicator::CODETABLE) {
            return Err(DecodeError::Unsupported(
                "application-defined code tables".into(),
            ));
        }

        let app_header = if indicator.contains(HeaderIndicator::APPHEADER) {
            let len = r.read_usize("application header length")?;
            Some(r.read_bytes(len, "application header")?.to_vec())
        } else {
            None
        };

        Ok(Self {
            indicator,
            secondary_id,
            app_header,
        })
    }
}

// ---------------------------------------------------------------------------
// Window header
// ---------------------------------------------------------------------------

/// Parsed VCDIFF per-window header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowHeader {
    pub indicator: WindowIndicator,
    /// Length of the source/target segment COPY instructions may reference.
    pub copy_window_len: u64,
    /// Offset of that segment in the source (or already decoded target).
    pub copy_window_offset: u64,
    /// Length of the delta encoding (redundancy check field).
    pub enc_len: u64,
    pub target_window_len: u64,
    pub delta_indicator: DeltaIndicator,
    pub data_len: u64,
    pub inst_len: u64,
    pub addr_len: u64,
    /// Adler-32 of the target window (if `ADLER32` is set).
    pub adler32: Option<u32>,
}

impl WindowHeader {
    #[inline]
    pub fn has_source(&self) -> bool {
        self.indicator.contains(WindowIndicator::SOURCE)
    }

    #[inline]
    pub fn has_target(&self) -> bool {
        self.indicator.contains(WindowIndicator::TARGET)
    }

    /// Expected `enc_len`:
    ///   sizeof(target_window_len) + 1 (delta indicator)
    ///   + sizeof of the three section lengths + the sections themselves
    ///   + 4 if a checksum is present
    pub fn compute_enc_len(&self) -> u64 {
        let mut len = varint::sizeof_u64(self.target_window_len) as u64 + 1;
        for section in [self.data_len, self.inst_len, self.addr_len] {
            len = len
                .saturating_add(varint::sizeof_u64(section) as u64)
                .saturating_add(section);
        }
        if self.adler32.is_some() {
            len += 4;
        }
        len
    }

    pub(crate) fn parse(r: &mut SliceReader<'_>) -> Result<Self, DecodeError> {
        let bits = r.read_u8("window indicator")?;
        let indicator = WindowIndicator::from_bits(bits).ok_or_else(|| {
            DecodeError::InvalidInput(format!("invalid window indicator bits: {bits:#04X}"))
        })?;
        if indicator.contains(WindowIndicator::SOURCE | WindowIndicator::TARGET) {
            return Err(DecodeError::InvalidInput(
                "VCD_SOURCE and VCD_TARGET are mutually exclusive".into(),
            ));
        }

        let (copy_window_len, copy_window_offset) =
            if indicator.intersects(WindowIndicator::SOURCE | WindowIndicator::TARGET) {
                (
                    r.read_u64("copy window length")?,
                    r.read_u64("copy window offset")?,
                )
            } else {
                (0, 0)
            };

        let enc_len = r.read_u64("delta encoding length")?;
        let target_window_len = r.read_u64("target window length")?;
        if target_window_len > HARD_MAX_WINSIZE {
            return Err(DecodeError::InvalidInput(format!(
                "target window too large: {target_window_len} exceeds max {HARD_MAX_WINSIZE}"
            )));
        }

        let bits = r.read_u8("delta indicator")?;
        let delta_indicator = DeltaIndicator::from_bits(bits).ok_or_else(|| {
            DecodeError::InvalidInput(format!("invalid delta indicator bits: {bits:#04X}"))
        })?;

        let data_len = r.read_u64("data section length")?;
        let inst_len = r.read_u64("instruction section length")?;
        let addr_len = r.read_u64("address section length")?;

        let adler32 = if indicator.contains(WindowIndicator::ADLER32) {
            let bytes = r.read_bytes(4, "window checksum")?;
            Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        } else {
            None
        };

        let header = Self {
            indicator,
            copy_window_len,
            copy_window_offset,
            enc_len,
            target_window_len,
            delta_indicator,
            data_len,
            inst_len,
            addr_len,
            adler32,
        };

        let expected = header.compute_enc_len();
        if enc_len != expected {
            return Err(DecodeError::InvalidInput(format!(
                "enc_len mismatch: header says {enc_len}, computed {expected}"
            )));
        }

        Ok(header)
    }
}

/// File header plus every window header of a delta, without decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaHeaders {
    pub file: FileHeader,
    pub windows: Vec<WindowHeader>,
}

/// Walk a delta's headers, skipping over window sections.
pub fn read_headers(delta: &[u8]) -> Result<DeltaHeaders, DecodeError> {
    let mut r = SliceReader::new(delta);
    let file = FileHeader::parse(&mut r)?;
    let mut windows = Vec::new();
    while !r.is_empty() {
        let wh = WindowHeader::parse(&mut r)?;
        r.read_section(wh.data_len, "data section")?;
        r.read_section(wh.inst_len, "instruction section")?;
        r.read_section(wh.addr_len, "address section")?;
        windows.push(wh);
    }
    Ok(DeltaHeaders { file, windows })
}
