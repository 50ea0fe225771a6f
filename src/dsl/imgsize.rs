//! Picture dimension probing by header sniffing.
//!
//! The renderer only needs a width to decide whether a picture exceeds
//! the configured maximum; full image decoding stays out of the engine.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Probe `(width, height)` from the leading bytes of PNG, GIF, BMP or
/// JPEG data. Returns `None` for anything unrecognized (including SVG,
/// whose size is layout-dependent).
pub fn probe_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") && data.len() >= 24 {
        // IHDR is always the first chunk: width and height at bytes 16/20.
        return Some((
            BigEndian::read_u32(&data[16..20]),
            BigEndian::read_u32(&data[20..24]),
        ));
    }
    if (data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a")) && data.len() >= 10 {
        return Some((
            LittleEndian::read_u16(&data[6..8]) as u32,
            LittleEndian::read_u16(&data[8..10]) as u32,
        ));
    }
    if data.starts_with(b"BM") && data.len() >= 26 {
        return Some((
            LittleEndian::read_u32(&data[18..22]),
            LittleEndian::read_u32(&data[22..26]),
        ));
    }
    if data.starts_with(&[0xff, 0xd8]) {
        return probe_jpeg(data);
    }
    None
}

// Walk JPEG segments until a start-of-frame marker carries the dimensions.
fn probe_jpeg(data: &[u8]) -> Option<(u32, u32)> {
    let mut i = 2usize;
    while i + 4 <= data.len() {
        if data[i] != 0xff {
            return None;
        }
        let marker = data[i + 1];
        match marker {
            // Standalone markers without a length field.
            0xd8 | 0x01 | 0xd0..=0xd7 => {
                i += 2;
                continue;
            }
            _ => {}
        }
        let len = BigEndian::read_u16(&data[i + 2..i + 4]) as usize;
        // SOF0..SOF15, excluding DHT/JPG/DAC.
        if matches!(marker, 0xc0..=0xcf) && !matches!(marker, 0xc4 | 0xc8 | 0xcc) {
            if i + 9 <= data.len() {
                let height = BigEndian::read_u16(&data[i + 5..i + 7]) as u32;
                let width = BigEndian::read_u16(&data[i + 7..i + 9]) as u32;
                return Some((width, height));
            }
            return None;
        }
        i += 2 + len;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_dimensions() {
        let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
        data.extend_from_slice(&13u32.to_be_bytes());
        data.extend_from_slice(b"IHDR");
        data.extend_from_slice(&640u32.to_be_bytes());
        data.extend_from_slice(&480u32.to_be_bytes());
        assert_eq!(probe_dimensions(&data), Some((640, 480)));
    }

    #[test]
    fn gif_dimensions() {
        let mut data = b"GIF89a".to_vec();
        data.extend_from_slice(&320u16.to_le_bytes());
        data.extend_from_slice(&200u16.to_le_bytes());
        assert_eq!(probe_dimensions(&data), Some((320, 200)));
    }

    #[test]
    fn jpeg_dimensions_via_sof() {
        // SOI, APP0 (length 4, empty), SOF0 with 100x50.
        let mut data = vec![0xff, 0xd8, 0xff, 0xe0, 0x00, 0x04, 0x00, 0x00];
        data.extend_from_slice(&[0xff, 0xc0, 0x00, 0x0b, 0x08]);
        data.extend_from_slice(&50u16.to_be_bytes()); // height
        data.extend_from_slice(&100u16.to_be_bytes()); // width
        data.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]);
        assert_eq!(probe_dimensions(&data), Some((100, 50)));
    }

    #[test]
    fn unknown_data_yields_none() {
        assert_eq!(probe_dimensions(b"<svg/>"), None);
        assert_eq!(probe_dimensions(b""), None);
    }
}
