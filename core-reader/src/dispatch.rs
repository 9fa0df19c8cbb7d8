//! # Container Dispatcher
//!
//! Sniffs the first four bytes of a stream and hands it to the matching
//! backend:
//!
//! | Magic  | Backend                       |
//! |--------|-------------------------------|
//! | `RIFF` | [`IffReader`] (WAV)           |
//! | `FORM` | [`IffReader`] (AIFF/AIFC)     |
//! | `caff` | [`IffReader`] (CAF)           |
//! | `riff` | [`IffReader`] (Wave64)        |
//! | `OggS` | Vorbis or Opus codec adapter  |
//!
//! Ogg streams must be positionable: the codec is identified from the first
//! packet before the adapter reopens the stream at its start.

use std::fs::File;
use std::path::Path;

use core_runtime::logging::strip_path;
use tracing::{debug, instrument};

use crate::codec;
use crate::config::ReaderConfig;
use crate::error::{ReaderError, Result};
use crate::iff::IffReader;
use crate::reader::BoxedReader;
use crate::stream::{ByteReader, NamedStream};

/// Opens the file at `path`. The reader is named after the last path
/// component.
#[instrument(skip_all, fields(path = %strip_path(&path.as_ref().to_string_lossy())))]
pub fn open_path(path: impl AsRef<Path>, config: &ReaderConfig) -> Result<BoxedReader> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());

    open_stream(NamedStream::new(name, file), config)
}

/// Opens `stream`, choosing the backend from its signature.
pub fn open_stream(stream: NamedStream, config: &ReaderConfig) -> Result<BoxedReader> {
    config.validate()?;

    let NamedStream { name, stream } = stream;
    let mut reader = ByteReader::new(stream)?;
    let magic = reader.read_fourcc()?;
    debug!(name = %strip_path(&name), magic = %String::from_utf8_lossy(&magic), "Dispatching stream");

    match &magic {
        b"RIFF" | b"FORM" | b"caff" | b"riff" => {
            Ok(Box::new(IffReader::open_with_magic(reader, magic, name, config)?))
        }
        b"OggS" => codec::open_ogg(reader.into_inner(), name, config),
        other => Err(ReaderError::InvalidType(format!(
            "unrecognized signature {:?}",
            String::from_utf8_lossy(other)
        ))),
    }
}
