use bytes::Bytes;
use futures_util::{stream, Stream};
use log::warn;
use mime::Mime;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    convert::Infallible, error::Error as StdError, fmt::Display, future::Future, time::Duration,
};
use thiserror::Error;
use tokio::time::timeout;

use crate::random_string;

pub const MULTIPART_MIXED: &str = "multipart/mixed";
pub const IMAGE_JPEG: &str = "image/jpeg";
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const APPLICATION_JSON: &str = "application/json";

const BOUNDARY_LENGTH: usize = 32;

/// How long a single part may take to arrive before decoding gives up
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// The kind of content a part is expected to carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Image,
    Text,
    Json,
}

impl PartKind {
    /// Returns true if the content type of a part is acceptable for this kind
    pub fn matches(&self, content_type: &Mime) -> bool {
        let (type_, subtype) = (content_type.type_(), content_type.subtype());

        match self {
            Self::Image => type_ == mime::IMAGE,
            Self::Text => type_ == mime::TEXT && subtype == mime::PLAIN,
            Self::Json => type_ == mime::APPLICATION && subtype == mime::JSON,
        }
    }
}

impl Display for PartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Image => "image",
            Self::Text => "text",
            Self::Json => "json",
        };

        f.write_str(name)
    }
}

/// An image along with its content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub content_type: String,
    pub data: Bytes,
}

impl Image {
    pub fn new(content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    pub fn jpeg(data: impl Into<Bytes>) -> Self {
        Self::new(IMAGE_JPEG, data)
    }
}

/// A single chunk of a multipart message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    content_type: String,
    body: Bytes,
}

impl Part {
    pub fn new(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// An image part, written verbatim
    pub fn image(image: Image) -> Self {
        Self::new(image.content_type, image.data)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(TEXT_PLAIN, text.into())
    }

    /// Serializes a value to JSON text
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(APPLICATION_JSON, body))
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    fn header(&self, boundary: &str) -> Bytes {
        let header = format!(
            "--{}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
            boundary,
            self.content_type,
            self.body.len()
        );

        header.into()
    }
}

/// An ordered sequence of parts, written as a single `multipart/mixed` body.
///
/// The order of the parts is the only structure the message has; readers
/// must know which part comes at which position.
#[derive(Debug, Clone)]
pub struct MultipartMessage {
    boundary: String,
    parts: Vec<Part>,
}

impl MultipartMessage {
    pub fn new() -> Self {
        Self::with_boundary(random_string(BOUNDARY_LENGTH))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: vec![],
        }
    }

    /// Appends a part to the end of the message
    pub fn part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// The value of the Content-Type header for this message
    pub fn content_type(&self) -> String {
        format!("{}; boundary={}", MULTIPART_MIXED, self.boundary)
    }

    /// Turns the message into a stream of chunks, in the order the parts were added.
    /// Part bodies are passed through without being copied.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        let mut chunks = Vec::with_capacity(self.parts.len() * 3 + 1);

        for part in self.parts {
            chunks.push(part.header(&self.boundary));
            chunks.push(part.body);
            chunks.push(Bytes::from_static(b"\r\n"));
        }

        chunks.push(format!("--{}--\r\n", self.boundary).into());

        stream::iter(chunks.into_iter().map(Ok))
    }
}

impl Default for MultipartMessage {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Response is not a multipart message: {0}")]
    NotMultipart(String),
    #[error("Part {index} is missing")]
    MissingPart { index: usize },
    #[error("Part {index} has content type {found:?}, expected {expected}")]
    UnexpectedPart {
        index: usize,
        expected: PartKind,
        found: String,
    },
    #[error("Part {index} is invalid: {reason}")]
    InvalidPart { index: usize, reason: String },
    #[error("Timed out while reading part {index}")]
    Timeout { index: usize },
    #[error(transparent)]
    Stream(#[from] multer::Error),
}

/// Reads the parts of a multipart message strictly in the order they arrive.
///
/// Every read consumes the next part, so a part can only be read once. The
/// underlying stream is owned by the reader and released when it is dropped,
/// whether decoding finished or failed halfway.
pub struct PartReader<'r> {
    multipart: multer::Multipart<'r>,
    index: usize,
    read_timeout: Duration,
}

impl<'r> PartReader<'r> {
    pub fn new<S, O, E>(stream: S, boundary: impl Into<String>, read_timeout: Duration) -> Self
    where
        S: Stream<Item = Result<O, E>> + Send + 'r,
        O: Into<Bytes> + 'static,
        E: Into<Box<dyn StdError + Send + Sync>> + 'r,
    {
        Self {
            multipart: multer::Multipart::new(stream, boundary),
            index: 0,
            read_timeout,
        }
    }

    /// Creates a reader, taking the boundary from a Content-Type header value
    pub fn from_content_type<S, O, E>(
        stream: S,
        content_type: &str,
        read_timeout: Duration,
    ) -> Result<Self, DecodeError>
    where
        S: Stream<Item = Result<O, E>> + Send + 'r,
        O: Into<Bytes> + 'static,
        E: Into<Box<dyn StdError + Send + Sync>> + 'r,
    {
        let boundary = parse_boundary(content_type)
            .ok_or_else(|| DecodeError::NotMultipart(content_type.to_string()))?;

        Ok(Self::new(stream, boundary, read_timeout))
    }

    /// How many parts have been read so far
    pub fn position(&self) -> usize {
        self.index
    }

    pub async fn image(&mut self) -> Result<Image, DecodeError> {
        let (content_type, data) = self.next_part(PartKind::Image).await?;

        Ok(Image { content_type, data })
    }

    pub async fn text(&mut self) -> Result<String, DecodeError> {
        let (_, body) = self.next_part(PartKind::Text).await?;

        String::from_utf8(body.to_vec()).map_err(|e| self.invalid(e))
    }

    /// Reads a JSON part into the shape expected at this position
    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T, DecodeError> {
        let (_, body) = self.next_part(PartKind::Json).await?;

        serde_json::from_slice(&body).map_err(|e| self.invalid(e))
    }

    /// Reads a text part and parses it
    pub async fn parse<T>(&mut self) -> Result<T, DecodeError>
    where
        T: std::str::FromStr,
        T::Err: Display,
    {
        let text = self.text().await?;

        text.trim().parse().map_err(|e| self.invalid(e))
    }

    /// Consumes whatever is left of the message
    pub async fn finish(mut self) -> Result<(), DecodeError> {
        while let Some(field) = bounded(
            self.read_timeout,
            self.index,
            self.multipart.next_field(),
        )
        .await??
        {
            let index = self.index;
            self.index += 1;

            bounded(self.read_timeout, index, field.bytes()).await??;
            warn!("Discarded unexpected trailing part {}", index);
        }

        Ok(())
    }

    /// Reads the next part, returning its content type and body
    async fn next_part(&mut self, expected: PartKind) -> Result<(String, Bytes), DecodeError> {
        let index = self.index;
        self.index += 1;

        let field = bounded(self.read_timeout, index, self.multipart.next_field())
            .await??
            .ok_or(DecodeError::MissingPart { index })?;

        let accepted = field
            .content_type()
            .is_some_and(|mime| expected.matches(mime));
        let found = field
            .content_type()
            .map(|mime| mime.to_string())
            .unwrap_or_default();

        if !accepted {
            return Err(DecodeError::UnexpectedPart {
                index,
                expected,
                found,
            });
        }

        let body = bounded(self.read_timeout, index, field.bytes()).await??;
        Ok((found, body))
    }

    fn invalid(&self, reason: impl Display) -> DecodeError {
        DecodeError::InvalidPart {
            index: self.index.saturating_sub(1),
            reason: reason.to_string(),
        }
    }
}

/// Extracts the boundary parameter of any `multipart/*` content type
pub fn parse_boundary(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let essence = params.next()?.trim().to_ascii_lowercase();

    if !essence.starts_with("multipart/") {
        return None;
    }

    params
        .filter_map(|p| p.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
}

/// Fails with a timeout if reading part `index` takes too long
async fn bounded<F: Future>(
    read_timeout: Duration,
    index: usize,
    future: F,
) -> Result<F::Output, DecodeError> {
    timeout(read_timeout, future)
        .await
        .map_err(|_| DecodeError::Timeout { index })
}
