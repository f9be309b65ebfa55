//! Texture loading from URLs, inline data URLs, and local files

use base64::Engine;
use futures_util::future::BoxFuture;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum TextureError {
    #[error("malformed data URL")]
    MalformedDataUrl,
    #[error("base64 decode error: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image source is empty")]
    Empty,
    #[error("unrecognized image format")]
    UnsupportedFormat,
}

/// Raw image data ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    /// Where the data came from
    pub source: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

/// Asynchronous image source loader
pub trait TextureLoader: Send + Sync {
    fn load<'a>(&'a self, source: &'a str) -> BoxFuture<'a, Result<Texture, TextureError>>;
}

/// Loads `data:` URLs inline, `http(s)` URLs over the network, and anything
/// else from the local filesystem
#[derive(Debug, Clone)]
pub struct SourceLoader {
    client: reqwest::Client,
}

impl SourceLoader {
    pub fn new(timeout: Duration) -> Result<Self, TextureError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn fetch(&self, url: &str) -> Result<Texture, TextureError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TextureError::Status(status.as_u16()));
        }
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();
        check_image(Texture {
            source: url.to_string(),
            mime,
            bytes,
        })
    }

    async fn read_file(&self, path: &str) -> Result<Texture, TextureError> {
        let bytes = tokio::fs::read(path).await?;
        let mime = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(mime_for_extension)
            .map(str::to_string);
        check_image(Texture {
            source: path.to_string(),
            mime,
            bytes,
        })
    }
}

impl TextureLoader for SourceLoader {
    fn load<'a>(&'a self, source: &'a str) -> BoxFuture<'a, Result<Texture, TextureError>> {
        Box::pin(async move {
            if source.is_empty() {
                return Err(TextureError::Empty);
            }
            if source.starts_with("data:") {
                decode_data_url(source)
            } else if source.starts_with("http://") || source.starts_with("https://") {
                debug!(url = %source, "Fetching texture");
                self.fetch(source).await
            } else {
                self.read_file(source).await
            }
        })
    }
}

/// Decode `data:[<mime>][;base64],<data>`
pub fn decode_data_url(source: &str) -> Result<Texture, TextureError> {
    let rest = source
        .strip_prefix("data:")
        .ok_or(TextureError::MalformedDataUrl)?;
    let (header, data) = rest.split_once(',').ok_or(TextureError::MalformedDataUrl)?;

    let mut parts = header.split(';');
    let mime = parts
        .next()
        .filter(|m| !m.is_empty())
        .map(str::to_string);
    let is_base64 = parts.any(|p| p.eq_ignore_ascii_case("base64"));

    let bytes = if is_base64 {
        base64::engine::general_purpose::STANDARD.decode(data.trim())?
    } else {
        data.as_bytes().to_vec()
    };

    check_image(Texture {
        source: source.to_string(),
        mime,
        bytes,
    })
}

/// Reject empty data and anything that is not PNG, JPEG, GIF or WebP.
/// A missing MIME type is filled in from the detected format.
fn check_image(mut texture: Texture) -> Result<Texture, TextureError> {
    if texture.bytes.is_empty() {
        return Err(TextureError::Empty);
    }
    let mime = sniff_format(&texture.bytes).ok_or(TextureError::UnsupportedFormat)?;
    texture.mime.get_or_insert_with(|| mime.to_string());
    Ok(texture)
}

fn sniff_format(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n', ..] => Some("image/png"),
        [0xff, 0xd8, 0xff, ..] => Some("image/jpeg"),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        _ => None,
    }
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}
