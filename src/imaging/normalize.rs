use crate::http::build_client;
use crate::imaging::sniff::{self, ImageKind};
use crate::retry::{Backoff, with_backoff};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const JPEG_QUALITY: u8 = 95;

/// Some origins reject non-browser clients outright, so every image
/// fetch presents a desktop browser's header set.
const BROWSER_HEADERS: &[(&str, &str)] = &[
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    ),
    (
        "Accept",
        "image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8",
    ),
    ("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.8"),
    ("Referer", "https://www.1688.com/"),
];

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("download failed: {0}")]
    Download(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("no substitute url escaped the avif encoding")]
    AvifExhausted,
}

/// Canonical upload payload for one normalized image.
#[derive(Debug, Clone, Serialize)]
pub struct EncodedImage {
    pub name: String,
    pub data: String,
    #[serde(rename = "type")]
    pub mime_type: String,
}

/// Downloads, retries, AVIF-transcodes and re-encodes a single image
/// into its canonical payload.
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    http: Client,
    max_retries: u32,
    backoff: Backoff,
}

impl ImageNormalizer {
    pub fn new() -> Self {
        Self::with_client(build_client())
    }

    pub fn with_client(http: Client) -> Self {
        Self {
            http,
            max_retries: 3,
            backoff: Backoff::linear(Duration::from_secs(2)),
        }
    }

    /// Normalize one image. Exhausting the retry budget yields `None`;
    /// the caller decides whether losing this image matters.
    pub async fn normalize(&self, url: &str, index: usize) -> Option<EncodedImage> {
        let attempt = |n: u32| {
            let url = url.to_string();
            async move {
                debug!(
                    target = "quotesync.image",
                    index = index,
                    attempt = n,
                    max = self.max_retries,
                    url = %url,
                    "fetching image"
                );
                self.attempt(&url, index).await
            }
        };
        match with_backoff(self.max_retries, self.backoff, attempt).await {
            Ok(encoded) => Some(encoded),
            Err(err) => {
                warn!(
                    target = "quotesync.image",
                    index = index,
                    url = %url,
                    error = %err,
                    "image given up after retries"
                );
                None
            }
        }
    }

    async fn attempt(&self, url: &str, index: usize) -> Result<EncodedImage, ImageError> {
        let mut body = self.fetch(url).await?;
        let mut kind = sniff::detect(&body);
        if kind == ImageKind::Avif {
            (body, kind) = self.transcode_avif(url).await?;
        }
        debug!(
            target = "quotesync.image",
            index = index,
            format = kind.label(),
            bytes = body.len(),
            "image fetched"
        );
        encode(&body, index)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        let mut request = self.http.get(url);
        for (name, value) in BROWSER_HEADERS {
            request = request.header(*name, *value);
        }
        let response = request
            .send()
            .await
            .map_err(|err| ImageError::Download(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ImageError::Download(format!("HTTP {}", response.status())));
        }
        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|err| ImageError::Download(err.to_string()))
    }

    /// The decoder carries no AVIF support on purpose; origins that
    /// serve AVIF all honor a format override in the URL. Each rewrite
    /// candidate is fetched in turn and the first body that re-sniffs
    /// as anything other than AVIF wins.
    async fn transcode_avif(&self, url: &str) -> Result<(Vec<u8>, ImageKind), ImageError> {
        for candidate in avif_fallback_urls(url) {
            match self.fetch(&candidate).await {
                Ok(bytes) => {
                    let kind = sniff::detect(&bytes);
                    if kind != ImageKind::Avif {
                        info!(
                            target = "quotesync.image",
                            from = "AVIF",
                            to = kind.label(),
                            url = %candidate,
                            "avif substitute accepted"
                        );
                        return Ok((bytes, kind));
                    }
                }
                Err(err) => {
                    warn!(
                        target = "quotesync.image",
                        url = %candidate,
                        error = %err,
                        "avif substitute fetch failed"
                    );
                }
            }
        }
        Err(ImageError::AvifExhausted)
    }
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Candidate URLs that ask the origin for a non-AVIF rendition, in
/// preference order.
pub fn avif_fallback_urls(url: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    if url.contains("_!!") {
        candidates.push(url.replace("_!!", ".jpg_!!"));
    }
    if url.contains('?') {
        candidates.push(format!("{url}&x-oss-process=image/format,jpg"));
    } else {
        candidates.push(format!("{url}?x-oss-process=image/format,jpg"));
    }
    candidates
}

/// Decode and re-encode into the canonical format: PNG for anything
/// carrying transparency, JPEG otherwise.
fn encode(bytes: &[u8], index: usize) -> Result<EncodedImage, ImageError> {
    let img = image::load_from_memory(bytes).map_err(|err| ImageError::Decode(err.to_string()))?;
    let mut out = Vec::new();
    let (ext, mime_type) = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        PngEncoder::new(&mut out)
            .write_image(
                &rgba,
                rgba.width(),
                rgba.height(),
                ExtendedColorType::Rgba8,
            )
            .map_err(|err| ImageError::Encode(err.to_string()))?;
        ("png", "image/png")
    } else {
        let rgb = img.to_rgb8();
        JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
            .encode(&rgb, rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
            .map_err(|err| ImageError::Encode(err.to_string()))?;
        ("jpg", "image/jpeg")
    };
    Ok(EncodedImage {
        name: format!("image{index}.{ext}"),
        data: BASE64.encode(&out),
        mime_type: mime_type.to_string(),
    })
}
