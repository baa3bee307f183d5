use clipstash_core::models::MediaKind;

/// Bytes needed to recognise every signature below.
pub const SNIFF_LEN: usize = 16;

/// Recognise well-known container and image signatures in the leading bytes.
///
/// Returns `None` for anything unrecognised, including ISO-BMFF image brands
/// (AVIF, HEIC) that share the MP4 container header.
pub fn sniff_kind(head: &[u8]) -> Option<MediaKind> {
    if head.starts_with(b"\x89PNG\r\n\x1a\n")
        || head.starts_with(&[0xFF, 0xD8, 0xFF])
        || head.starts_with(b"GIF87a")
        || head.starts_with(b"GIF89a")
        || (head.len() >= 12 && &head[..4] == b"RIFF" && &head[8..12] == b"WEBP")
    {
        return Some(MediaKind::Screenshot);
    }

    if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some(MediaKind::Video);
    }

    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        return match &head[8..12] {
            b"avif" | b"avis" | b"heic" | b"heix" | b"mif1" | b"msf1" => None,
            _ => Some(MediaKind::Video),
        };
    }

    None
}
