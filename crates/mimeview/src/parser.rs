use crate::encoding::{decode_body, encode_body};
use crate::stream::{LineReader, ReadSeek, SharedStream};
use crate::{MimeViewError, Result};
use std::io::{Read, Seek, SeekFrom, Write};
use tempfile::SpooledTempFile;

/// Only headers this filter cares about are retained in the header map.
const VALID_HEADERS: &[&str] = &["content-transfer-encoding", "content-type", "from", "subject"];

/// Spool rewritten messages in memory up to this size, then on disk.
const SPOOL_THRESHOLD: usize = 8 * 1024 * 1024;

/// A view over one RFC5322 message (or MIME part) in a shared seekable
/// stream, delimited by `[start, end)` byte offsets.
///
/// The top-level message (`start == 0`) additionally supports structural
/// mutation: `set_header` and `replace_body` build a new backing stream,
/// copying every unrelated byte verbatim, and swap it into the shared
/// handle. Part views produced by `parts()` are read-only.
pub struct MailParser {
    stream: SharedStream,
    start: u64,
    end: Option<u64>,
    body_position: u64,
    modified: bool,
    recipient: String,
    sender: String,
    ctype: Option<String>,
    ctype_params: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    parts: Option<Vec<MailParser>>,
}

impl MailParser {
    pub fn new(stream: impl ReadSeek + 'static) -> Result<Self> {
        Self::with_range(SharedStream::new(Box::new(stream)), 0, None)
    }

    pub(crate) fn with_range(stream: SharedStream, start: u64, end: Option<u64>) -> Result<Self> {
        let mut parser = Self {
            stream,
            start,
            end,
            body_position: start,
            modified: false,
            recipient: String::new(),
            sender: String::new(),
            ctype: None,
            ctype_params: Vec::new(),
            headers: Vec::new(),
            parts: None,
        };
        parser.parse_headers()?;
        Ok(parser)
    }

    /// Scan CRLF-delimited header lines from `start`, folding
    /// continuation lines into the preceding header, until the first
    /// blank line or the end of the range.
    fn parse_headers(&mut self) -> Result<()> {
        let mut pending = String::new();
        let mut position = self.start;
        let mut folded = Vec::new();

        {
            let stream = self.stream.clone();
            let mut guard = stream.lock();
            let mut reader = LineReader::new(&mut **guard, self.start)?;

            while let Some(line) = reader.next_line()? {
                position += line.len() as u64;

                if let Some(end) = self.end {
                    if position >= end {
                        position = end;
                        break;
                    }
                }

                if matches!(line.as_slice(), b"\r\n" | b"\n") {
                    break;
                }

                let text = String::from_utf8_lossy(&line);
                let text = text.trim_end_matches(['\r', '\n']);

                if text.starts_with(' ') || text.starts_with('\t') {
                    pending.push(' ');
                    pending.push_str(text.trim_start_matches([' ', '\t']));
                } else {
                    folded.push(std::mem::replace(&mut pending, text.to_string()));
                }
            }
        }

        folded.push(pending);
        for header in folded {
            self.add_header(&header);
        }
        self.body_position = position;
        Ok(())
    }

    fn add_header(&mut self, content: &str) {
        let Some(colon) = content.find(':') else {
            return;
        };
        let (name, rest) = content.split_at(colon);
        if name.is_empty()
            || !name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return;
        }

        let lname = name.to_ascii_lowercase();
        let value = rest[1..].trim_start();

        if VALID_HEADERS.contains(&lname.as_str()) {
            self.headers.retain(|(n, _)| n != &lname);
            self.headers.push((lname.clone(), value.to_string()));
        }

        if lname == "content-type" {
            self.set_content_type(value);
        }
    }

    fn set_content_type(&mut self, value: &str) {
        let mut fields = value.split(';');
        self.ctype = fields.next().map(|t| t.trim().to_ascii_lowercase());
        self.ctype_params.clear();
        for field in fields {
            if let Some((name, value)) = field.split_once('=') {
                let mut value = value.trim();
                if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
                    value = &value[1..value.len() - 1];
                }
                self.ctype_params
                    .push((name.trim().to_ascii_lowercase(), value.to_string()));
            }
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        let lname = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| n == &lname)
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.ctype.as_deref()
    }

    pub fn content_type_param(&self, name: &str) -> Option<&str> {
        self.ctype_params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> Option<u64> {
        self.end
    }

    pub fn body_position(&self) -> u64 {
        self.body_position
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn set_recipient(&mut self, recipient: impl Into<String>) {
        self.recipient = recipient.into();
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn set_sender(&mut self, sender: impl Into<String>) {
        self.sender = sender.into();
    }

    /// Shared handle to the (possibly rewritten) backing stream.
    pub fn stream(&self) -> SharedStream {
        self.stream.clone()
    }

    /// The raw bytes of this message or part, unmodified.
    pub fn raw(&self) -> Result<Vec<u8>> {
        Ok(self.stream.read_range(self.start, self.end)?)
    }

    /// The transfer-decoded body of this message, with the trailing CRLF
    /// stripped.
    pub fn body(&self) -> Result<String> {
        let mut raw = Vec::new();
        let mut position = self.body_position;

        {
            let mut guard = self.stream.lock();
            let mut reader = LineReader::new(&mut **guard, self.body_position)?;
            while let Some(line) = reader.next_line()? {
                position += line.len() as u64;
                raw.extend_from_slice(&line);
                if let Some(end) = self.end {
                    if position >= end {
                        break;
                    }
                }
            }
        }

        if let Some(end) = self.end {
            raw.truncate(end.saturating_sub(self.body_position) as usize);
        }
        if raw.ends_with(b"\r\n") {
            raw.truncate(raw.len() - 2);
        }

        decode_body(&raw, self.header("content-transfer-encoding"))
    }

    /// The transfer-decoded body of one top-level part.
    pub fn part_body(&mut self, part_id: usize) -> Result<String> {
        self.parts()?
            .get(part_id)
            .ok_or(MimeViewError::InvalidPartId(part_id))?
            .body()
    }

    /// Top-level MIME parts, computed once and memoized. Parts exist only
    /// for `multipart/*` messages carrying a `boundary` parameter; nested
    /// multiparts are not descended into.
    pub fn parts(&mut self) -> Result<&[MailParser]> {
        if self.parts.is_none() {
            let mut ranges: Vec<(u64, u64)> = Vec::new();

            let boundary = match (&self.ctype, self.content_type_param("boundary")) {
                (Some(ctype), Some(boundary))
                    if ctype.starts_with("multipart/") && !boundary.is_empty() =>
                {
                    Some(boundary.to_string())
                }
                _ => None,
            };

            if let Some(boundary) = boundary {
                let start_line = format!("--{boundary}\r\n").into_bytes();
                let end_line = format!("--{boundary}--\r\n").into_bytes();
                let mut position = self.body_position;
                let mut part_position: Option<u64> = None;

                let mut guard = self.stream.lock();
                let mut reader = LineReader::new(&mut **guard, self.body_position)?;

                while let Some(line) = reader.next_line()? {
                    position += line.len() as u64;

                    if line == start_line {
                        if let Some(p) = part_position {
                            ranges.push((p, position - start_line.len() as u64));
                        }
                        part_position = Some(position);
                    } else if line == end_line {
                        if let Some(p) = part_position {
                            ranges.push((p, position - end_line.len() as u64));
                        }
                        break;
                    }

                    if let Some(end) = self.end {
                        if position >= end {
                            break;
                        }
                    }
                }
            }

            let mut parts = Vec::with_capacity(ranges.len());
            for (start, end) in ranges {
                parts.push(MailParser::with_range(
                    self.stream.clone(),
                    start,
                    Some(end),
                )?);
            }
            self.parts = Some(parts);
        }

        Ok(self.parts.as_deref().unwrap_or_default())
    }

    /// Set, replace or remove (`value: None`) a header, preserving every
    /// other header's bytes exactly. Legal on the top-level message only.
    pub fn set_header(&mut self, name: &str, value: Option<&str>) -> Result<()> {
        if self.start != 0 {
            return Err(MimeViewError::NotTopLevel);
        }

        let lname = name.to_ascii_lowercase();
        let mut copy = SpooledTempFile::new(SPOOL_THRESHOLD);

        if let Some(value) = value {
            write!(copy, "{name}: {value}\r\n")?;
        }

        let new_body_position;
        {
            let mut guard = self.stream.lock();
            let mut position = self.start;
            let mut dropping = false;

            {
                let mut reader = LineReader::new(&mut **guard, self.start)?;
                while let Some(line) = reader.next_line()? {
                    if matches!(line.as_slice(), b"\r\n" | b"\n") {
                        break;
                    }

                    if line.starts_with(b" ") || line.starts_with(b"\t") {
                        // Folded continuation belongs to the preceding line
                        if !dropping {
                            copy.write_all(&line)?;
                        }
                    } else if line.len() > lname.len()
                        && line[..lname.len()].eq_ignore_ascii_case(lname.as_bytes())
                        && line[lname.len()] == b':'
                    {
                        dropping = true;
                    } else {
                        copy.write_all(&line)?;
                        dropping = false;
                    }

                    position += line.len() as u64;
                }
            }

            // The blank separator line and the body follow verbatim
            new_body_position = copy.stream_position()? + 2;
            guard.seek(SeekFrom::Start(position))?;
            std::io::copy(&mut **guard, &mut copy)?;
            copy.seek(SeekFrom::Start(0))?;
        }

        self.stream.replace(Box::new(copy));
        self.body_position = new_body_position;

        self.headers.retain(|(n, _)| n != &lname);
        if let Some(value) = value {
            self.headers.push((lname.clone(), value.to_string()));
            if lname == "content-type" {
                let value = value.to_string();
                self.set_content_type(&value);
            }
        } else if lname == "content-type" {
            self.ctype = None;
            self.ctype_params.clear();
        }

        self.parts = None;
        self.modified = true;
        Ok(())
    }

    /// Replace the body of the message (`part_id: None`) or of one of its
    /// top-level parts, re-encoding for the target's declared
    /// content-transfer-encoding. All header bytes and all bytes past the
    /// target's end are preserved exactly. Legal on the top-level message
    /// only.
    pub fn replace_body(&mut self, body: &str, part_id: Option<usize>) -> Result<()> {
        if self.start != 0 {
            return Err(MimeViewError::NotTopLevel);
        }

        let (target_body_position, target_end, target_encoding) = match part_id {
            Some(id) => {
                let part = self
                    .parts()?
                    .get(id)
                    .ok_or(MimeViewError::InvalidPartId(id))?;
                (
                    part.body_position,
                    part.end,
                    part.header("content-transfer-encoding").map(str::to_string),
                )
            }
            None => (
                self.body_position,
                self.end,
                self.header("content-transfer-encoding").map(str::to_string),
            ),
        };

        let mut copy = SpooledTempFile::new(SPOOL_THRESHOLD);
        {
            let mut guard = self.stream.lock();
            guard.seek(SeekFrom::Start(self.start))?;

            let mut head = Read::take(&mut **guard, target_body_position - self.start);
            std::io::copy(&mut head, &mut copy)?;

            copy.write_all(&encode_body(body, target_encoding.as_deref()))?;
            copy.write_all(b"\r\n")?;

            if let Some(end) = target_end {
                guard.seek(SeekFrom::Start(end))?;
                std::io::copy(&mut **guard, &mut copy)?;
            }

            copy.seek(SeekFrom::Start(0))?;
        }

        self.stream.replace(Box::new(copy));
        self.parts = None;
        self.modified = true;
        Ok(())
    }
}
