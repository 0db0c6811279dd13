//! Streaming reader for arctan-format logs: one record per frame.
//!
//! Logs can be far larger than memory, so we never load the whole file.
//! The reader scans buffered input for the closing tag of each top-level
//! record and re-parses just that substring. Parsing twice is not
//! especially efficient, but keeps the working set at one record.
//!
//! The stream is single-pass and cannot be restarted; reopen the file for
//! another pass.

use crate::Result;
use crate::record::{Record, llsd};
use anyhow::Context;
use log::{info, warn};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const OPEN_TAG: &[u8] = b"<llsd";
const CLOSE_TAG: &[u8] = b"</llsd>";
const READ_CHUNK: usize = 64 * 1024;

pub struct FrameReader {
    /// None once the stream has ended (EOF or malformed trailing data).
    reader: Option<BufReader<File>>,
    buf: Vec<u8>,
    frame_count: usize,
}

impl FrameReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("open log file {}", path.display()))?;
        Ok(Self {
            reader: Some(BufReader::new(file)),
            buf: Vec::new(),
            frame_count: 0,
        })
    }

    /// How many records have been yielded so far.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        if self.reader.is_none() {
            return Ok(None);
        }

        loop {
            if let Some(end) = find(&self.buf, CLOSE_TAG) {
                let cut = end + CLOSE_TAG.len();
                let chunk: Vec<u8> = self.buf.drain(..cut).collect();

                let Some(start) = find(&chunk, OPEN_TAG) else {
                    warn!("record boundary without an opening tag; stopping");
                    self.finish();
                    return Ok(None);
                };
                let text = std::str::from_utf8(&chunk[start..])
                    .context("record is not valid utf-8")?;
                let record = llsd::parse_record(text)?;
                self.frame_count += 1;
                return Ok(Some(record));
            }

            if self.fill()? == 0 {
                // Truncated trailing record: recover with what we have.
                if self.buf.iter().any(|b| !b.is_ascii_whitespace()) {
                    warn!("fell off end of document");
                }
                self.finish();
                return Ok(None);
            }
        }
    }

    fn fill(&mut self) -> Result<usize> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(0);
        };
        let mut chunk = [0u8; READ_CHUNK];
        let n = reader.read(&mut chunk).context("read log file")?;
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    /// Drop the file handle and report how far we got.
    fn finish(&mut self) {
        if self.reader.take().is_some() {
            info!("read {} frame records", self.frame_count);
        }
    }
}

impl Iterator for FrameReader {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
