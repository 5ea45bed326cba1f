//! Precondition checks on run inputs

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::ErrorCause;
use crate::schema::SchemaSet;

pub(crate) fn check_schema_set(schemas: &SchemaSet) -> Result<(), ErrorCause> {
    if schemas.is_empty() {
        return Err(ErrorCause::invalid_input(
            "The given schema set cannot be empty.",
        ));
    }
    Ok(())
}

pub(crate) fn check_bytes(bytes: &[u8]) -> Result<(), ErrorCause> {
    if bytes.is_empty() {
        return Err(ErrorCause::invalid_input("The byte array is empty."));
    }
    Ok(())
}

/// Open `path` for reading, reporting a missing or unreadable file
pub(crate) async fn open_file(path: &Path) -> Result<File, ErrorCause> {
    if path.as_os_str().is_empty() {
        return Err(ErrorCause::invalid_input(
            "The given file path cannot be null or empty.",
        ));
    }
    let unavailable = |source| ErrorCause::InputUnavailable {
        path: PathBuf::from(path),
        source,
    };
    let file = tokio::fs::File::open(path).await.map_err(unavailable)?;
    let metadata = file.metadata().await.map_err(unavailable)?;
    if !metadata.is_file() {
        return Err(unavailable(std::io::Error::other("not a regular file")));
    }
    Ok(file.into_std().await)
}

/// Position the stream at its start
pub(crate) fn rewind<R: Read + Seek>(mut stream: R) -> Result<R, ErrorCause> {
    stream
        .seek(SeekFrom::Start(0))
        .map_err(|source| ErrorCause::StreamUnusable { source })?;
    Ok(stream)
}
