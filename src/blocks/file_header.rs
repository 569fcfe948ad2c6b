//! The text header that opens every CRSD file.
//!
//! The header is a run of newline-terminated lines: a `<TYPE>/<VERSION>`
//! line followed by `KEY := VALUE` pairs, closed by a form feed and a
//! newline. It locates every other block in the file by byte offset and size.

use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CrsdError;

/// Byte that closes the header (and the XML block).
pub const SECTION_TERMINATOR: u8 = 0x0c;
/// Separator between a header key and its value.
pub const KVP_DELIMITER: &str = " := ";
/// Upper bound on the header text; anything longer is treated as corrupt.
pub const MAX_HEADER_SIZE: u64 = 10 * 1024 * 1024;
/// Default chunk size used while scanning for the section terminator.
pub const DEFAULT_HEADER_BLOCK_SIZE: usize = 1024 * 1024;

const TYPE_PREFIX_LEN: usize = 7;
const MAX_VERSION_LINE: usize = 256;

const XML_BLOCK_SIZE: &str = "XML_BLOCK_SIZE";
const XML_BLOCK_BYTE_OFFSET: &str = "XML_BLOCK_BYTE_OFFSET";
const SUPPORT_BLOCK_SIZE: &str = "SUPPORT_BLOCK_SIZE";
const SUPPORT_BLOCK_BYTE_OFFSET: &str = "SUPPORT_BLOCK_BYTE_OFFSET";
const PPP_BLOCK_SIZE: &str = "PPP_BLOCK_SIZE";
const PPP_BLOCK_BYTE_OFFSET: &str = "PPP_BLOCK_BYTE_OFFSET";
const PVP_BLOCK_SIZE: &str = "PVP_BLOCK_SIZE";
const PVP_BLOCK_BYTE_OFFSET: &str = "PVP_BLOCK_BYTE_OFFSET";
const SIGNAL_BLOCK_SIZE: &str = "SIGNAL_BLOCK_SIZE";
const SIGNAL_BLOCK_BYTE_OFFSET: &str = "SIGNAL_BLOCK_BYTE_OFFSET";
const CLASSIFICATION: &str = "CLASSIFICATION";
const RELEASE_INFO: &str = "RELEASE_INFO";

/// The three product variants a CRSD file can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrsdType {
    /// Transmit and receive (monostatic/bistatic SAR collection).
    Sar,
    /// Transmit-only collection.
    Tx,
    /// Receive-only collection.
    Rcv,
}

impl CrsdType {
    pub const ALL: [CrsdType; 3] = [CrsdType::Sar, CrsdType::Tx, CrsdType::Rcv];

    /// Leading token written before the `/` of the first header line.
    pub fn token(self) -> &'static str {
        match self {
            CrsdType::Sar => "CRSDsar",
            CrsdType::Tx => "CRSDtx",
            CrsdType::Rcv => "CRSDrcv",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.token() == token)
    }

    /// Whether the file carries per-pulse parameters.
    pub fn has_ppp(self) -> bool {
        matches!(self, CrsdType::Sar | CrsdType::Tx)
    }

    /// Whether the file carries per-vector parameters and signal samples.
    pub fn has_receive(self) -> bool {
        matches!(self, CrsdType::Sar | CrsdType::Rcv)
    }
}

impl fmt::Display for CrsdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Size and absolute position of one block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLocation {
    pub size: u64,
    pub byte_offset: u64,
}

impl BlockLocation {
    pub fn new(size: u64, byte_offset: u64) -> Self {
        Self { size, byte_offset }
    }

    /// First byte past the block.
    ///
    /// Fails with [`CrsdError::MalformedHeader`] when the block runs past
    /// the end of a 64-bit file.
    pub fn end(&self) -> Result<u64, CrsdError> {
        self.byte_offset.checked_add(self.size).ok_or_else(|| {
            CrsdError::MalformedHeader(format!(
                "block at byte {} of size {} ends beyond the addressable range",
                self.byte_offset, self.size
            ))
        })
    }
}

/// Parsed CRSD file header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    pub crsd_type: CrsdType,
    pub version: String,
    pub xml: BlockLocation,
    pub support: Option<BlockLocation>,
    pub ppp: Option<BlockLocation>,
    pub pvp: Option<BlockLocation>,
    pub signal: Option<BlockLocation>,
    pub classification: String,
    pub release_info: String,
    /// Keys this library does not interpret, in file order.
    pub additional: Vec<(String, String)>,
}

impl FileHeader {
    /// Create an empty header for the given product type.
    ///
    /// Block locations are zeroed; call [`FileHeader::set_block_sizes`]
    /// before writing.
    pub fn new(crsd_type: CrsdType, version: &str, classification: &str, release_info: &str) -> Self {
        let empty = Some(BlockLocation::default());
        Self {
            crsd_type,
            version: version.to_string(),
            xml: BlockLocation::default(),
            support: None,
            ppp: if crsd_type.has_ppp() { empty } else { None },
            pvp: if crsd_type.has_receive() { empty } else { None },
            signal: if crsd_type.has_receive() { empty } else { None },
            classification: classification.to_string(),
            release_info: release_info.to_string(),
            additional: Vec::new(),
        }
    }

    /// Check whether a stream starts with one of the CRSD type tokens.
    ///
    /// Reads exactly seven bytes from the start of the stream. A stream
    /// shorter than that is not a CRSD file.
    pub fn is_crsd<R: Read + Seek>(reader: &mut R) -> Result<bool, CrsdError> {
        reader.seek(SeekFrom::Start(0))?;
        let mut prefix = [0u8; TYPE_PREFIX_LEN];
        let n = read_full(reader, &mut prefix)?;
        let prefix = &prefix[..n];
        Ok(CrsdType::ALL
            .iter()
            .any(|t| prefix.len() >= t.token().len() && &prefix[..t.token().len()] == t.token().as_bytes()))
    }

    /// Read the version string from the first header line.
    pub fn read_version<R: Read + Seek>(reader: &mut R) -> Result<String, CrsdError> {
        let (_, version) = read_version_line(reader)?;
        Ok(version)
    }

    /// Read the product type from the first header line.
    pub fn read_type<R: Read + Seek>(reader: &mut R) -> Result<CrsdType, CrsdError> {
        let (crsd_type, _) = read_version_line(reader)?;
        Ok(crsd_type)
    }

    /// Read and parse the complete header.
    ///
    /// The stream is consumed in chunks of `block_size` bytes until the
    /// section terminator is found, so the rest of the file is never loaded.
    /// On success the stream is left positioned just past the terminator
    /// and its newline.
    ///
    /// # Errors
    /// * [`CrsdError::MalformedHeader`] if the terminator is missing, is not
    ///   followed by a newline, or lies beyond [`MAX_HEADER_SIZE`].
    /// * [`CrsdError::NotCrsd`] if the first line names an unknown type.
    /// * [`CrsdError::MissingField`] if a required key is absent or blank.
    pub fn read<R: Read + Seek>(reader: &mut R, block_size: usize) -> Result<Self, CrsdError> {
        reader.seek(SeekFrom::Start(0))?;

        let mut raw: Vec<u8> = Vec::new();
        let mut block = vec![0u8; block_size.clamp(1, MAX_HEADER_SIZE as usize + 2)];
        let header_len = loop {
            let n = read_full(reader, &mut block)?;
            if n == 0 {
                return Err(CrsdError::MalformedHeader(format!(
                    "stream ended after {} bytes without a section terminator",
                    raw.len()
                )));
            }

            let search_from = raw.len();
            raw.extend_from_slice(&block[..n]);

            if let Some(found) = raw[search_from..].iter().position(|&b| b == SECTION_TERMINATOR) {
                let pos = search_from + found;
                if pos as u64 > MAX_HEADER_SIZE {
                    break Err(pos);
                }
                // The terminator may be the last byte of this chunk; its
                // newline then has to come from one more read.
                let following = if pos + 1 < raw.len() {
                    Some(raw[pos + 1])
                } else {
                    let mut one = [0u8; 1];
                    match read_full(reader, &mut one)? {
                        0 => None,
                        _ => Some(one[0]),
                    }
                };
                match following {
                    Some(b'\n') => break Ok(pos),
                    Some(other) => {
                        return Err(CrsdError::MalformedHeader(format!(
                            "section terminator at byte {pos} followed by {other:#04x} instead of a newline"
                        )));
                    }
                    None => {
                        return Err(CrsdError::MalformedHeader(format!(
                            "stream ends at the section terminator (byte {pos})"
                        )));
                    }
                }
            }

            if raw.len() as u64 > MAX_HEADER_SIZE {
                break Err(raw.len());
            }
        };

        let header_len = header_len.map_err(|consumed| {
            CrsdError::MalformedHeader(format!(
                "no section terminator within the first {MAX_HEADER_SIZE} bytes ({consumed} bytes scanned)"
            ))
        })?;

        reader.seek(SeekFrom::Start(header_len as u64 + 2))?;
        raw.truncate(header_len);
        let text = String::from_utf8(raw)
            .map_err(|e| CrsdError::MalformedHeader(format!("header is not valid text: {e}")))?;

        let header = Self::parse(&text)?;
        debug!(
            crsd_type = %header.crsd_type,
            version = %header.version,
            header_bytes = header_len,
            "parsed file header"
        );
        Ok(header)
    }

    /// Parse header text (everything before the section terminator).
    pub fn parse(text: &str) -> Result<Self, CrsdError> {
        let mut lines = text.lines();
        let first = lines
            .next()
            .ok_or_else(|| CrsdError::MalformedHeader("header is empty".to_string()))?;
        let (crsd_type, version) = parse_version_line(first)?;

        let mut pairs: Vec<(String, String)> = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let (key, value) = line.split_once(KVP_DELIMITER).ok_or_else(|| {
                CrsdError::MalformedHeader(format!("line {line:?} is not a KEY{KVP_DELIMITER}VALUE pair"))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(CrsdError::MalformedHeader(format!("line {line:?} has an empty key")));
            }
            if pairs.iter().any(|(k, _)| k == key) {
                return Err(CrsdError::MalformedHeader(format!("duplicate key {key}")));
            }
            pairs.push((key.to_string(), value.trim().to_string()));
        }

        let mut fields = HeaderFields { pairs };
        let xml = fields.required_block(XML_BLOCK_SIZE, XML_BLOCK_BYTE_OFFSET)?;
        let support = fields.optional_block(SUPPORT_BLOCK_SIZE, SUPPORT_BLOCK_BYTE_OFFSET)?;
        let ppp = fields.block_for(crsd_type.has_ppp(), crsd_type, PPP_BLOCK_SIZE, PPP_BLOCK_BYTE_OFFSET)?;
        let pvp = fields.block_for(crsd_type.has_receive(), crsd_type, PVP_BLOCK_SIZE, PVP_BLOCK_BYTE_OFFSET)?;
        let signal =
            fields.block_for(crsd_type.has_receive(), crsd_type, SIGNAL_BLOCK_SIZE, SIGNAL_BLOCK_BYTE_OFFSET)?;
        let classification = fields.required_text(CLASSIFICATION)?;
        let release_info = fields.required_text(RELEASE_INFO)?;

        Ok(Self {
            crsd_type,
            version,
            xml,
            support,
            ppp,
            pvp,
            signal,
            classification,
            release_info,
            additional: fields.pairs,
        })
    }

    /// Compute block offsets for a file about to be written.
    ///
    /// The XML block follows the header and its terminator and is itself
    /// followed by a terminator. Every binary block then starts on the next
    /// 8-byte boundary. Since the offsets are part of the header text, the
    /// computation repeats until the header length stops changing.
    ///
    /// Sizes for blocks the product type does not carry must be zero.
    pub fn set_block_sizes(
        &mut self,
        xml: u64,
        support: u64,
        ppp: u64,
        pvp: u64,
        signal: u64,
    ) -> Result<(), CrsdError> {
        if !self.crsd_type.has_ppp() && ppp != 0 {
            return Err(CrsdError::Serialization(format!(
                "{} files carry no PPP block",
                self.crsd_type
            )));
        }
        if !self.crsd_type.has_receive() && (pvp != 0 || signal != 0) {
            return Err(CrsdError::Serialization(format!(
                "{} files carry no PVP or signal block",
                self.crsd_type
            )));
        }

        self.xml.size = xml;
        self.support = (support > 0).then(|| BlockLocation::new(support, 0));
        if let Some(block) = self.ppp.as_mut() {
            block.size = ppp;
        }
        if let Some(block) = self.pvp.as_mut() {
            block.size = pvp;
        }
        if let Some(block) = self.signal.as_mut() {
            block.size = signal;
        }

        let too_large = || CrsdError::Serialization("block sizes exceed the addressable range".to_string());
        loop {
            let before = self.clone();
            let header_len = self.to_string().len() as u64;
            self.xml.byte_offset = header_len + 2;
            let mut cursor = self.xml.end().ok().and_then(|end| end.checked_add(2)).ok_or_else(too_large)?;
            for block in [&mut self.support, &mut self.ppp, &mut self.pvp, &mut self.signal]
                .into_iter()
                .flatten()
            {
                block.byte_offset = cursor.checked_next_multiple_of(8).ok_or_else(too_large)?;
                cursor = block.end().map_err(|_| too_large())?;
            }
            if *self == before {
                return Ok(());
            }
        }
    }

    /// Length of the header text plus terminator and newline.
    pub fn size_with_terminator(&self) -> u64 {
        self.to_string().len() as u64 + 2
    }

    /// Write the header text followed by the section terminator.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), CrsdError> {
        writer.write_all(self.to_string().as_bytes())?;
        writer.write_all(&[SECTION_TERMINATOR, b'\n'])?;
        Ok(())
    }
}

impl fmt::Display for FileHeader {
    /// Serializes the header text without the section terminator.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}/{}", self.crsd_type.token(), self.version)?;
        let blocks = [
            (Some(self.xml), XML_BLOCK_SIZE, XML_BLOCK_BYTE_OFFSET),
            (self.support, SUPPORT_BLOCK_SIZE, SUPPORT_BLOCK_BYTE_OFFSET),
            (self.ppp, PPP_BLOCK_SIZE, PPP_BLOCK_BYTE_OFFSET),
            (self.pvp, PVP_BLOCK_SIZE, PVP_BLOCK_BYTE_OFFSET),
            (self.signal, SIGNAL_BLOCK_SIZE, SIGNAL_BLOCK_BYTE_OFFSET),
        ];
        for (block, size_key, offset_key) in blocks {
            if let Some(block) = block {
                writeln!(f, "{size_key}{KVP_DELIMITER}{}", block.size)?;
                writeln!(f, "{offset_key}{KVP_DELIMITER}{}", block.byte_offset)?;
            }
        }
        writeln!(f, "{CLASSIFICATION}{KVP_DELIMITER}{}", self.classification)?;
        writeln!(f, "{RELEASE_INFO}{KVP_DELIMITER}{}", self.release_info)?;
        for (key, value) in &self.additional {
            writeln!(f, "{key}{KVP_DELIMITER}{value}")?;
        }
        Ok(())
    }
}

/// Key/value pairs still waiting to be claimed by a known field.
struct HeaderFields {
    pairs: Vec<(String, String)>,
}

impl HeaderFields {
    fn take(&mut self, key: &str) -> Option<String> {
        let pos = self.pairs.iter().position(|(k, _)| k == key)?;
        Some(self.pairs.remove(pos).1)
    }

    fn required_text(&mut self, key: &str) -> Result<String, CrsdError> {
        match self.take(key) {
            None => Err(CrsdError::MissingField { key: key.to_string(), reason: "missing" }),
            Some(v) if v.is_empty() => Err(CrsdError::MissingField { key: key.to_string(), reason: "empty" }),
            Some(v) => Ok(v),
        }
    }

    fn required_u64(&mut self, key: &str) -> Result<u64, CrsdError> {
        let value = self.required_text(key)?;
        value
            .parse::<u64>()
            .map_err(|_| CrsdError::MalformedHeader(format!("{key} has non-numeric value {value:?}")))
    }

    fn required_block(&mut self, size_key: &str, offset_key: &str) -> Result<BlockLocation, CrsdError> {
        let block = BlockLocation::new(self.required_u64(size_key)?, self.required_u64(offset_key)?);
        block.end()?;
        Ok(block)
    }

    fn optional_block(&mut self, size_key: &str, offset_key: &str) -> Result<Option<BlockLocation>, CrsdError> {
        let present = self.pairs.iter().any(|(k, _)| k == size_key || k == offset_key);
        if present {
            self.required_block(size_key, offset_key).map(Some)
        } else {
            Ok(None)
        }
    }

    fn block_for(
        &mut self,
        carried: bool,
        crsd_type: CrsdType,
        size_key: &str,
        offset_key: &str,
    ) -> Result<Option<BlockLocation>, CrsdError> {
        if carried {
            return self.required_block(size_key, offset_key).map(Some);
        }
        if self.pairs.iter().any(|(k, _)| k == size_key || k == offset_key) {
            return Err(CrsdError::MalformedHeader(format!("{crsd_type} header must not contain {size_key}")));
        }
        Ok(None)
    }
}

fn parse_version_line(line: &str) -> Result<(CrsdType, String), CrsdError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (token, version) = line
        .split_once('/')
        .ok_or_else(|| CrsdError::NotCrsd(line.to_string()))?;
    let crsd_type = CrsdType::from_token(token).ok_or_else(|| CrsdError::NotCrsd(token.to_string()))?;
    let version = version.trim();
    if version.is_empty() {
        return Err(CrsdError::InvalidVersionString(line.to_string()));
    }
    Ok((crsd_type, version.to_string()))
}

fn read_version_line<R: Read + Seek>(reader: &mut R) -> Result<(CrsdType, String), CrsdError> {
    reader.seek(SeekFrom::Start(0))?;
    let mut buffer = [0u8; MAX_VERSION_LINE];
    let n = read_full(reader, &mut buffer)?;
    let line = &buffer[..n];
    let line = match line.iter().position(|&b| b == b'\n') {
        Some(end) => &line[..end],
        None => line,
    };
    let line = String::from_utf8_lossy(line);
    parse_version_line(&line)
}

/// Fill `buf` from the reader, stopping early only at end of stream.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, CrsdError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
