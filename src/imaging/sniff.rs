/// True image encoding, decided by byte content alone. URL suffixes and
/// HTTP content-types are untrusted: origins are known to label AVIF
/// bodies as JPEG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    Webp,
    Avif,
    Bmp,
    Unknown,
}

impl ImageKind {
    pub fn label(self) -> &'static str {
        match self {
            ImageKind::Png => "PNG",
            ImageKind::Jpeg => "JPEG",
            ImageKind::Gif => "GIF",
            ImageKind::Webp => "WEBP",
            ImageKind::Avif => "AVIF",
            ImageKind::Bmp => "BMP",
            ImageKind::Unknown => "UNKNOWN",
        }
    }
}

pub fn detect(data: &[u8]) -> ImageKind {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        ImageKind::Png
    } else if data.starts_with(b"\xff\xd8\xff") {
        ImageKind::Jpeg
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        ImageKind::Gif
    } else if data.starts_with(b"RIFF") && data.len() >= 12 && &data[8..12] == b"WEBP" {
        ImageKind::Webp
    } else if has_avif_brand(data) {
        ImageKind::Avif
    } else if data.starts_with(b"BM") {
        ImageKind::Bmp
    } else {
        ImageKind::Unknown
    }
}

/// The `ftyp` box sits at the front of the container; scanning the
/// first 20 bytes covers both the `avif` and `avis` brands.
fn has_avif_brand(data: &[u8]) -> bool {
    let head = &data[..data.len().min(20)];
    head.windows(8)
        .any(|window| window == b"ftypavif" || window == b"ftypavis")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_png_signature() {
        let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
        data.extend_from_slice(&[0xAB; 16]);
        assert_eq!(detect(&data), ImageKind::Png);
    }

    #[test]
    fn recognizes_jpeg_signature() {
        assert_eq!(detect(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]), ImageKind::Jpeg);
    }

    #[test]
    fn recognizes_both_gif_signatures() {
        assert_eq!(detect(b"GIF87a123"), ImageKind::Gif);
        assert_eq!(detect(b"GIF89a123"), ImageKind::Gif);
    }

    #[test]
    fn webp_requires_riff_container() {
        assert_eq!(detect(b"RIFF\x00\x00\x00\x00WEBPVP8 "), ImageKind::Webp);
        assert_eq!(detect(b"RIFF\x00\x00\x00\x00WAVE"), ImageKind::Unknown);
        assert_eq!(detect(b"RIFF"), ImageKind::Unknown);
    }

    #[test]
    fn avif_brand_found_anywhere_in_head() {
        assert_eq!(detect(b"\x00\x00\x00\x1cftypavif\x00\x00"), ImageKind::Avif);
        assert_eq!(detect(b"\x00\x00\x00\x1cftypavis\x00\x00"), ImageKind::Avif);
        // Brand beyond the first 20 bytes does not count.
        let mut late = vec![0u8; 24];
        late.extend_from_slice(b"ftypavif");
        assert_eq!(detect(&late), ImageKind::Unknown);
    }

    #[test]
    fn recognizes_bmp_signature() {
        assert_eq!(detect(b"BM\x00\x00"), ImageKind::Bmp);
    }

    #[test]
    fn random_bytes_are_unknown() {
        assert_eq!(detect(&[0x01, 0x02, 0x03, 0x04]), ImageKind::Unknown);
        assert_eq!(detect(&[]), ImageKind::Unknown);
    }
}
