use base64::{engine::general_purpose::STANDARD, Engine};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::EncodingError;

/// Reads the whole source and returns it as bare standard base64.
pub async fn encode<R>(mut reader: R) -> Result<String, EncodingError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(STANDARD.encode(&buf))
}

/// Drops a leading `data:<mime>;base64,` header, if any.
pub fn strip_data_url_prefix(value: &str) -> &str {
    match value.strip_prefix("data:") {
        Some(rest) => match rest.split_once(',') {
            Some((_, payload)) => payload,
            None => value,
        },
        None => value,
    }
}

/// MIME type declared in a `data:<mime>;base64,` header, if any.
pub fn data_url_mime(value: &str) -> Option<String> {
    value
        .trim()
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .and_then(|(header, _)| header.split(';').next())
        .filter(|mime| !mime.is_empty())
        .map(str::to_string)
}

/// Byte length the payload decodes to, computed without decoding it.
pub fn decoded_len(value: &str) -> u64 {
    let payload = strip_data_url_prefix(value.trim()).trim();
    let padding = payload.bytes().rev().take(2).filter(|b| *b == b'=').count();
    ((payload.len() / 4 * 3) + (payload.len() % 4 * 3 / 4)).saturating_sub(padding) as u64
}

/// Encoder for media that arrives already as a data URL: drops the header
/// and checks the payload really is base64.
pub fn encode_data_url(value: &str) -> Result<String, EncodingError> {
    let payload = strip_data_url_prefix(value.trim()).trim();
    STANDARD.decode(payload).map_err(|_| EncodingError::Malformed)?;
    Ok(payload.to_string())
}
