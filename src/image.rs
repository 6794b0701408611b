//! Uploaded flashcard images: strip an optional data-URL prefix, verify the
//! base64 payload and work out the media type for the provider.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
  #[error("malformed data URL: missing ','")]
  MissingComma,

  #[error("data URL is not base64 encoded")]
  NotBase64,

  #[error("image payload is empty")]
  Empty,

  #[error("invalid base64 image: {0}")]
  Decode(#[from] base64::DecodeError),

  #[error("unsupported image type (expected JPEG, PNG, GIF or WebP)")]
  Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImagePayload {
  pub media_type: &'static str,
  /// Base64 body without any `data:` prefix.
  pub data: String,
}

const SUPPORTED: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Accepts either `data:image/png;base64,....` or a bare base64 string.
pub fn prepare_image(input: &str) -> Result<ImagePayload, ImageError> {
  let input = input.trim();
  let (declared, data) = match input.strip_prefix("data:") {
    Some(rest) => {
      let (meta, data) = rest.split_once(',').ok_or(ImageError::MissingComma)?;
      let mime = meta.strip_suffix(";base64").ok_or(ImageError::NotBase64)?;
      (Some(mime.to_ascii_lowercase()), data)
    }
    None => (None, input),
  };

  let data: String = data.chars().filter(|c| !c.is_whitespace()).collect();
  if data.is_empty() {
    return Err(ImageError::Empty);
  }
  let bytes = STANDARD.decode(&data)?;

  let media_type = match declared.as_deref().and_then(supported) {
    Some(m) => m,
    None => sniff(&bytes).ok_or(ImageError::Unsupported)?,
  };
  Ok(ImagePayload { media_type, data })
}

fn supported(mime: &str) -> Option<&'static str> {
  let mime = if mime == "image/jpg" { "image/jpeg" } else { mime };
  SUPPORTED.iter().copied().find(|s| *s == mime)
}

/// Media type from magic bytes.
fn sniff(bytes: &[u8]) -> Option<&'static str> {
  if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
    Some("image/jpeg")
  } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
    Some("image/png")
  } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
    Some("image/gif")
  } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
    Some("image/webp")
  } else {
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
  }

  #[test]
  fn data_url_prefix_is_stripped() {
    let body = b64(b"\x89PNG\r\n\x1a\nrest");
    let p = prepare_image(&format!("data:image/png;base64,{body}")).expect("png");
    assert_eq!(p.media_type, "image/png");
    assert_eq!(p.data, body);
  }

  #[test]
  fn bare_base64_is_sniffed() {
    let p = prepare_image(&b64(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0])).expect("jpeg");
    assert_eq!(p.media_type, "image/jpeg");
  }

  #[test]
  fn jpg_alias_is_normalized() {
    let p = prepare_image(&format!("data:image/jpg;base64,{}", b64(b"anything"))).expect("declared");
    assert_eq!(p.media_type, "image/jpeg");
  }

  #[test]
  fn garbage_is_rejected() {
    assert!(matches!(prepare_image("not base64 !!"), Err(ImageError::Decode(_))));
    assert!(matches!(prepare_image(""), Err(ImageError::Empty)));
    assert!(matches!(prepare_image(&b64(b"plain text, not an image")), Err(ImageError::Unsupported)));
    assert!(matches!(prepare_image("data:image/png,abc"), Err(ImageError::NotBase64)));
    assert!(matches!(prepare_image("data:image/png;base64"), Err(ImageError::MissingComma)));
  }
}
