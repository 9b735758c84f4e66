//! Record output: JSON / JSON Lines writers and srcset strings.

use serde::Serialize;
use std::io::{self, Write};

use crate::types::{ImageRecord, ImageVariant, VariantFormat};

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Single JSON object or array
    Json,
    /// One JSON object per line (newline-delimited JSON)
    JsonLines,
}

impl OutputFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

/// `srcset`/`src`/`type` attribute values for one format of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SrcSet {
    /// MIME type for `<source type=...>`
    #[serde(rename = "type")]
    pub mime_type: &'static str,
    /// Narrowest variant, used as the fallback `src`
    pub src: String,
    /// `"{src} {width}w"` entries by ascending width, joined with ", "
    #[serde(rename = "srcSet")]
    pub src_set: String,
}

/// Build the srcset for `format`; `None` if the record has no such variant.
pub fn srcset(format: VariantFormat, record: &ImageRecord) -> Option<SrcSet> {
    let mut variants: Vec<&ImageVariant> = record.variants_of(format).collect();
    variants.sort_by_key(|v| v.width);

    let src = variants.first()?.src.clone();
    let src_set = variants
        .iter()
        .map(|v| format!("{} {}w", v.src, v.width))
        .collect::<Vec<_>>()
        .join(", ");
    Some(SrcSet {
        mime_type: format.mime_type(),
        src,
        src_set,
    })
}

/// Writes records (image records, srcset entries) as JSON or JSON Lines.
pub struct RecordWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    pretty: bool,
    written: usize,
}

impl<W: Write> RecordWriter<W> {
    /// `pretty` only affects [`OutputFormat::Json`].
    pub fn new(writer: W, format: OutputFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
            written: 0,
        }
    }

    /// Write one record (one line in JSONL).
    pub fn write<T: Serialize>(&mut self, record: &T) -> io::Result<()> {
        self.write_value(record)?;
        self.written += 1;
        Ok(())
    }

    /// Write a batch: a JSON array, or one line per record in JSONL.
    pub fn write_all<T: Serialize>(&mut self, records: &[T]) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                self.write_value(&records)?;
                self.written += records.len();
            }
            OutputFormat::JsonLines => {
                for record in records {
                    self.write(record)?;
                }
            }
        }
        Ok(())
    }

    fn write_value<T: Serialize + ?Sized>(&mut self, value: &T) -> io::Result<()> {
        let pretty = self.pretty && self.format == OutputFormat::Json;
        if pretty {
            serde_json::to_writer_pretty(&mut self.writer, value).map_err(io::Error::other)?;
        } else {
            serde_json::to_writer(&mut self.writer, value).map_err(io::Error::other)?;
        }
        writeln!(self.writer)
    }

    /// Number of records written so far.
    pub fn records_written(&self) -> usize {
        self.written
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}
