use axum::{body::Bytes, BoxError};
use futures::{Stream, TryStreamExt};
use regex::Regex;
use std::io;
use std::path::Path;
use tokio::{fs::File, io::AsyncWriteExt, io::BufWriter};
use tokio_util::io::StreamReader;

/// Keeps only a short alphanumeric extension from a client supplied file
/// name. Everything else about the name is discarded.
pub fn sanitized_extension(file_name: &str) -> Option<&str> {
    let (stem, extension) = file_name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    let re = Regex::new(r"^[A-Za-z0-9]{1,8}$").ok()?;
    re.is_match(extension).then_some(extension)
}

/// Save a `Stream` to a file
pub async fn stream_to_file<S, E>(path: &Path, stream: S) -> io::Result<u64>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    let body_with_io_error = stream.map_err(io::Error::other);
    let body_reader = StreamReader::new(body_with_io_error);
    futures::pin_mut!(body_reader);

    let mut file = BufWriter::new(File::create(path).await?);
    let written = tokio::io::copy(&mut body_reader, &mut file).await?;
    file.flush().await?;
    Ok(written)
}
