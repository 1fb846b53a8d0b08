//! Transparent `Content-Encoding` decoding, grounded on
//! `examples/original_source/agent/decompress.go`. Unlike the original (which
//! wraps the response body in a lazily-initialized `io.ReadCloser`), this
//! fully drains the decoded body into memory: the cache needs an owned,
//! clonable `Bytes` to store regardless, so there's no streaming consumer left
//! to benefit from incremental decoding.

use bytes::Bytes;
use futures::TryStreamExt as _;
use http::header::{HeaderMap, CONTENT_ENCODING, CONTENT_LENGTH};
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;

use super::AgentError;

fn io_err(err: reqwest::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, err)
}

/// Reads `res`'s body, decoding it per its `Content-Encoding` header (`gzip`,
/// `deflate`, `br`; anything else, including absence, passes through
/// unchanged). On a decoded body, strips `Content-Length` from `headers` —
/// its value described the encoded length, not the decoded one.
pub(super) async fn decode_body(headers: &mut HeaderMap, res: reqwest::Response) -> Result<Bytes, AgentError> {
    let encoding = headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(str::to_ascii_lowercase);

    let stream = res.bytes_stream().map_err(io_err);
    let reader = StreamReader::new(stream);

    let decoded = match encoding.as_deref() {
        Some("gzip") => {
            let mut out = Vec::new();
            async_compression::tokio::bufread::GzipDecoder::new(reader)
                .read_to_end(&mut out)
                .await?;
            out
        }
        Some("deflate") => {
            let mut out = Vec::new();
            async_compression::tokio::bufread::DeflateDecoder::new(reader)
                .read_to_end(&mut out)
                .await?;
            out
        }
        Some("br") => {
            let mut out = Vec::new();
            async_compression::tokio::bufread::BrotliDecoder::new(reader)
                .read_to_end(&mut out)
                .await?;
            out
        }
        _ => {
            let mut reader = reader;
            let mut out = Vec::new();
            reader.read_to_end(&mut out).await?;
            return Ok(Bytes::from(out));
        }
    };

    headers.remove(CONTENT_LENGTH);
    headers.remove(CONTENT_ENCODING);
    Ok(Bytes::from(decoded))
}
