//! # Ogg Pages
//!
//! Page-sync helpers and a packet assembler for Ogg-encapsulated codecs.
//!
//! An Ogg page is a 27-byte header (`OggS`, version, flags, granule position,
//! serial, sequence, CRC, segment count) followed by a lacing table and the
//! segment payload. Packets are split into 255-byte segments; a segment
//! shorter than 255 bytes ends a packet, and a packet may continue onto the
//! next page.

use std::io::{self, BufReader, Read, Seek, SeekFrom};

use tracing::debug;

use crate::error::{ReaderError, Result};

pub const CAPTURE_PATTERN: [u8; 4] = *b"OggS";

/// Fixed header bytes before the lacing table.
pub const PAGE_HEADER_LEN: u64 = 27;

pub const FLAG_CONTINUED: u8 = 0x01;
pub const FLAG_FIRST_PAGE: u8 = 0x02;
pub const FLAG_LAST_PAGE: u8 = 0x04;

/// Bytes read per step while scanning for a capture pattern.
const SCAN_CHUNK: u64 = 4096;

/// A decoded page header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHeader {
    pub version: u8,
    pub flags: u8,
    /// Position after the last packet completed on this page, or `-1`.
    pub granule_position: i64,
    pub serial: u32,
    pub sequence: u32,
    pub checksum: u32,
    pub lacing: Vec<u8>,
}

impl PageHeader {
    pub fn is_continued(&self) -> bool {
        self.flags & FLAG_CONTINUED != 0
    }

    pub fn is_first(&self) -> bool {
        self.flags & FLAG_FIRST_PAGE != 0
    }

    pub fn is_last(&self) -> bool {
        self.flags & FLAG_LAST_PAGE != 0
    }

    /// Header plus lacing table.
    pub fn header_len(&self) -> u64 {
        PAGE_HEADER_LEN + self.lacing.len() as u64
    }

    pub fn body_len(&self) -> u64 {
        self.lacing.iter().map(|&len| u64::from(len)).sum()
    }
}

/// Reads the page header at the current position.
///
/// Returns `Ok(None)` on a clean end of stream before the first byte.
pub fn read_page_header<R: Read>(reader: &mut R) -> Result<Option<PageHeader>> {
    let mut fixed = [0u8; PAGE_HEADER_LEN as usize];
    let filled = read_full(reader, &mut fixed)?;
    if filled == 0 {
        return Ok(None);
    }
    if filled < fixed.len() {
        return Err(ReaderError::UnexpectedEof("Ogg page header".to_string()));
    }
    if fixed[..4] != CAPTURE_PATTERN {
        return Err(ReaderError::InvalidType("missing Ogg capture pattern".to_string()));
    }

    let le32 = |at: usize| u32::from_le_bytes([fixed[at], fixed[at + 1], fixed[at + 2], fixed[at + 3]]);
    let mut granule = [0u8; 8];
    granule.copy_from_slice(&fixed[6..14]);

    let mut lacing = vec![0u8; usize::from(fixed[26])];
    reader.read_exact(&mut lacing).map_err(eof_as("Ogg lacing table"))?;

    Ok(Some(PageHeader {
        version: fixed[4],
        flags: fixed[5],
        granule_position: i64::from_le_bytes(granule),
        serial: le32(14),
        sequence: le32(18),
        checksum: le32(22),
        lacing,
    }))
}

/// Finds the first capture pattern starting in `[from, to)`.
pub fn find_next_page_offset<S: Read + Seek>(stream: &mut S, from: u64, to: u64) -> Result<Option<u64>> {
    let mut start = from;
    let mut window = Vec::new();

    while start < to {
        let len = SCAN_CHUNK.min(to - start) + 3;
        stream.seek(SeekFrom::Start(start))?;
        window.resize(len as usize, 0);
        let filled = read_full(stream, &mut window)?;

        if let Some(at) = find_pattern(&window[..filled]) {
            let offset = start + at as u64;
            return Ok((offset < to).then_some(offset));
        }
        if filled < window.len() {
            break;
        }
        start += SCAN_CHUNK;
    }
    Ok(None)
}

/// Finds the last capture pattern starting in `[to, from)`, scanning
/// backwards from `from`.
pub fn find_prev_page_offset<S: Read + Seek>(stream: &mut S, from: u64, to: u64) -> Result<Option<u64>> {
    let mut end = from;
    let mut window = Vec::new();

    while end > to {
        let start = end.saturating_sub(SCAN_CHUNK).max(to);
        // Overlap by three bytes so a pattern straddling chunks is seen.
        let len = end - start + 3;
        stream.seek(SeekFrom::Start(start))?;
        window.resize(len as usize, 0);
        let filled = read_full(stream, &mut window)?;

        if let Some(at) = rfind_pattern(&window[..filled]) {
            let offset = start + at as u64;
            if offset < end {
                return Ok(Some(offset));
            }
        }
        end = start;
    }
    Ok(None)
}

fn find_pattern(window: &[u8]) -> Option<usize> {
    window.windows(4).position(|w| w == CAPTURE_PATTERN)
}

fn rfind_pattern(window: &[u8]) -> Option<usize> {
    window.windows(4).rposition(|w| w == CAPTURE_PATTERN)
}

/// Reads until `buf` is full or the stream ends.
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(filled)
}

fn eof_as(what: &'static str) -> impl Fn(io::Error) -> ReaderError {
    move |err| match err.kind() {
        io::ErrorKind::UnexpectedEof => ReaderError::UnexpectedEof(what.to_string()),
        _ => ReaderError::Io(err),
    }
}

/// A complete packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OggPacket {
    pub data: Vec<u8>,
    pub serial: u32,
    /// Granule of the page the packet completed on, when it was the last
    /// packet completed there.
    pub granule_position: Option<i64>,
    /// Set on the first packet of a logical stream.
    pub first_of_stream: bool,
}

/// Assembles packets from consecutive pages.
pub struct OggPacketReader<S> {
    reader: BufReader<S>,
    position: u64,
    page: Option<PageHeader>,
    page_start: u64,
    segment: usize,
    partial: Vec<u8>,
    /// Drop the leading continuation after a seek.
    resync: bool,
}

impl<S: Read + Seek> OggPacketReader<S> {
    /// Wraps `stream` at its current position, buffering `capacity` bytes.
    pub fn with_capacity(capacity: usize, mut stream: S) -> Result<Self> {
        let position = stream.stream_position()?;
        Ok(Self {
            reader: BufReader::with_capacity(capacity.max(PAGE_HEADER_LEN as usize), stream),
            position,
            page: None,
            page_start: position,
            segment: 0,
            partial: Vec::new(),
            resync: false,
        })
    }

    /// Byte offset of the next unread page header, when the current page is
    /// fully consumed.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Start of the page the last segment was read from.
    pub fn page_start(&self) -> u64 {
        self.page_start
    }

    /// Returns `true` when every segment of the current page was consumed.
    pub fn at_page_boundary(&self) -> bool {
        self.page
            .as_ref()
            .map_or(true, |page| self.segment >= page.lacing.len())
    }

    /// Restarts packet assembly at the page header at `offset`.
    ///
    /// A packet continued from the preceding page is dropped.
    pub fn seek_to_page(&mut self, offset: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        self.page_start = offset;
        self.page = None;
        self.segment = 0;
        self.partial.clear();
        self.resync = true;
        Ok(())
    }

    /// Reads the next page header, leaving its body unread.
    pub fn next_page_header(&mut self) -> Result<Option<PageHeader>> {
        let start = self.position;
        let header = read_page_header(&mut self.reader)?;
        if let Some(header) = &header {
            self.page_start = start;
            self.position = start + header.header_len();
        }
        Ok(header)
    }

    /// Skips the body of a page returned by [`Self::next_page_header`].
    pub fn skip_page_body(&mut self, header: &PageHeader) -> Result<()> {
        let body = header.body_len();
        self.reader.seek_relative(body as i64)?;
        self.position += body;
        Ok(())
    }

    /// Returns the next complete packet, or `None` at end of stream.
    pub fn next_packet(&mut self) -> Result<Option<OggPacket>> {
        loop {
            if self.at_page_boundary() {
                let Some(header) = self.next_page_header()? else {
                    if !self.partial.is_empty() {
                        debug!(bytes = self.partial.len(), "Dropping truncated Ogg packet");
                        self.partial.clear();
                    }
                    return Ok(None);
                };

                if !header.is_continued() && !self.partial.is_empty() {
                    debug!(bytes = self.partial.len(), "Dropping Ogg packet without continuation");
                    self.partial.clear();
                }
                self.page = Some(header);
                self.segment = 0;
                continue;
            }

            let Some(page) = self.page.as_ref() else {
                continue;
            };

            let len = usize::from(page.lacing[self.segment]);
            let complete = len < 255;
            let is_last_completed = complete
                && page.lacing[self.segment + 1..].iter().all(|&seg| seg == 255);
            let first_of_stream = page.is_first() && self.partial.is_empty();
            let serial = page.serial;
            let granule = page.granule_position;
            let skipping = self.resync && page.is_continued();

            let start = self.partial.len();
            self.partial.resize(start + len, 0);
            self.reader
                .read_exact(&mut self.partial[start..])
                .map_err(eof_as("Ogg segment"))?;
            self.position += len as u64;
            self.segment += 1;

            if !complete {
                continue;
            }

            if skipping {
                self.partial.clear();
                self.resync = false;
                continue;
            }
            self.resync = false;

            let data = std::mem::take(&mut self.partial);
            return Ok(Some(OggPacket {
                data,
                serial,
                granule_position: (is_last_completed && granule >= 0).then_some(granule),
                first_of_stream,
            }));
        }
    }

    pub fn get_mut(&mut self) -> &mut S {
        self.reader.get_mut()
    }

    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    /// Builds one page holding `packets`, each laced in full.
    pub(crate) fn page(flags: u8, granule: i64, serial: u32, sequence: u32, packets: &[&[u8]]) -> Vec<u8> {
        let mut lacing = Vec::new();
        let mut body = Vec::new();
        for packet in packets {
            let mut left = packet.len();
            while left >= 255 {
                lacing.push(255);
                left -= 255;
            }
            lacing.push(left as u8);
            body.extend_from_slice(packet);
        }

        let mut out = CAPTURE_PATTERN.to_vec();
        out.push(0);
        out.push(flags);
        out.extend_from_slice(&granule.to_le_bytes());
        out.extend_from_slice(&serial.to_le_bytes());
        out.extend_from_slice(&sequence.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.push(lacing.len() as u8);
        out.extend_from_slice(&lacing);
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn test_read_page_header() {
        let data = page(FLAG_FIRST_PAGE, 960, 7, 0, &[b"abc"]);
        let header = read_page_header(&mut Cursor::new(&data)).unwrap().unwrap();

        assert!(header.is_first());
        assert!(!header.is_continued());
        assert_eq!(header.granule_position, 960);
        assert_eq!(header.serial, 7);
        assert_eq!(header.lacing, vec![3]);
        assert_eq!(header.header_len(), 28);

        assert!(read_page_header(&mut Cursor::new(Vec::new())).unwrap().is_none());
        assert!(matches!(
            read_page_header(&mut Cursor::new(b"OggX".repeat(8))),
            Err(ReaderError::InvalidType(_))
        ));
    }

    #[test]
    fn test_find_page_offsets() {
        let mut data = vec![0u8; 5000];
        data.extend(page(0, 1, 1, 0, &[b"x"]));
        data.extend(vec![0u8; 100]);
        let second = data.len() as u64;
        data.extend(page(FLAG_LAST_PAGE, 2, 1, 1, &[b"y"]));
        let len = data.len() as u64;
        let mut cursor = Cursor::new(data);

        assert_eq!(find_next_page_offset(&mut cursor, 0, len).unwrap(), Some(5000));
        assert_eq!(find_next_page_offset(&mut cursor, 5001, len).unwrap(), Some(second));
        assert_eq!(find_prev_page_offset(&mut cursor, len, 0).unwrap(), Some(second));
        assert_eq!(find_prev_page_offset(&mut cursor, second, 0).unwrap(), Some(5000));
        assert_eq!(find_prev_page_offset(&mut cursor, 5000, 0).unwrap(), None);
    }

    #[test]
    fn test_packets_span_pages() {
        let long = vec![9u8; 300];
        let mut first = page(FLAG_FIRST_PAGE, 0, 3, 0, &[b"head"]);
        // A page carrying only the first 255 bytes of `long`, unterminated.
        let mut split = page(0, -1, 3, 1, &[b""]);
        split.truncate(PAGE_HEADER_LEN as usize - 1);
        split.push(1);
        split.push(255);
        split.extend_from_slice(&long[..255]);

        let rest = page(FLAG_CONTINUED, 480, 3, 2, &[&long[255..], b"tail"]);
        first.extend(split);
        first.extend(rest);

        let mut reader = OggPacketReader::with_capacity(64, Cursor::new(first)).unwrap();

        let head = reader.next_packet().unwrap().unwrap();
        assert_eq!(head.data, b"head");
        assert!(head.first_of_stream);
        assert_eq!(head.granule_position, Some(0));

        let joined = reader.next_packet().unwrap().unwrap();
        assert_eq!(joined.data, long);
        assert_eq!(joined.granule_position, None);

        let tail = reader.next_packet().unwrap().unwrap();
        assert_eq!(tail.data, b"tail");
        assert_eq!(tail.granule_position, Some(480));
        assert!(reader.next_packet().unwrap().is_none());
    }
}
