//! Builds small movie files tag by tag.

#![allow(dead_code)]

use std::io::Write;

use flate2::Compression as Level;
use flate2::write::ZlibEncoder;
use swf::tag::TagCode;

pub fn tag(code: TagCode, body: &[u8]) -> Vec<u8> {
    let code = code.to_u16();
    let mut bytes = Vec::with_capacity(body.len() + 6);
    if body.len() < 0x3F {
        bytes.extend_from_slice(&(code << 6 | body.len() as u16).to_le_bytes());
    } else {
        bytes.extend_from_slice(&(code << 6 | 0x3F).to_le_bytes());
        bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
    }
    bytes.extend_from_slice(body);
    bytes
}

pub fn zlib(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Level::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Shape with empty bounds and no edges.
pub fn shape_body(id: u16) -> Vec<u8> {
    let mut body = id.to_le_bytes().to_vec();
    body.extend_from_slice(&[0x00, 0, 0, 0x00, 0x00]);
    body
}

/// `PlaceObject2` with a character and an identity matrix.
pub fn place_body(depth: u16, id: u16) -> Vec<u8> {
    let mut body = vec![0x06];
    body.extend_from_slice(&depth.to_le_bytes());
    body.extend_from_slice(&id.to_le_bytes());
    body.push(0x00);
    body
}

/// Lossless 32-bit bitmap of `width` x `height` opaque pixels.
pub fn lossless_body(id: u16, width: u16, height: u16) -> Vec<u8> {
    let mut body = id.to_le_bytes().to_vec();
    body.push(5);
    body.extend_from_slice(&width.to_le_bytes());
    body.extend_from_slice(&height.to_le_bytes());
    let pixels: Vec<u8> = (0..u32::from(width) * u32::from(height))
        .flat_map(|_| [0xFF, 0x10, 0x20, 0x30])
        .collect();
    body.extend(zlib(&pixels));
    body
}

pub struct MovieWriter {
    version: u8,
    frame_count: u16,
    tags: Vec<u8>,
}

impl MovieWriter {
    pub fn new(version: u8) -> Self {
        Self {
            version,
            frame_count: 0,
            tags: Vec::new(),
        }
    }

    pub fn tag(&mut self, code: TagCode, body: &[u8]) -> &mut Self {
        self.tags.extend(tag(code, body));
        self
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.tags.extend_from_slice(bytes);
        self
    }

    pub fn shape(&mut self, id: u16) -> &mut Self {
        self.tag(TagCode::DefineShape, &shape_body(id))
    }

    pub fn place(&mut self, depth: u16, id: u16) -> &mut Self {
        self.tag(TagCode::PlaceObject2, &place_body(depth, id))
    }

    pub fn remove(&mut self, depth: u16) -> &mut Self {
        self.tag(TagCode::RemoveObject2, &depth.to_le_bytes())
    }

    pub fn show_frame(&mut self) -> &mut Self {
        self.frame_count += 1;
        self.tag(TagCode::ShowFrame, &[])
    }

    /// Uncompressed body after the prefix: header tail, tags, end tag.
    fn body(&self) -> Vec<u8> {
        // zero-bit rect, 24 fps
        let mut body = vec![0x00, 0x00, 24];
        body.extend_from_slice(&self.frame_count.to_le_bytes());
        body.extend_from_slice(&self.tags);
        body.extend(tag(TagCode::End, &[]));
        body
    }

    fn prefix(&self, magic: u8, body_len: usize) -> Vec<u8> {
        let mut file = vec![magic, b'W', b'S', self.version];
        file.extend_from_slice(&((body_len + 8) as u32).to_le_bytes());
        file
    }

    pub fn uncompressed(&self) -> Vec<u8> {
        let body = self.body();
        let mut file = self.prefix(b'F', body.len());
        file.extend(body);
        file
    }

    pub fn deflated(&self) -> Vec<u8> {
        let body = self.body();
        let mut file = self.prefix(b'C', body.len());
        file.extend(zlib(&body));
        file
    }

    /// `ZWS` file: compressed length, LZMA properties, then a stream that
    /// ends with an end marker.
    pub fn lzma(&self) -> Vec<u8> {
        let body = self.body();
        let mut packed = Vec::new();
        lzma_rs::lzma_compress(&mut &body[..], &mut packed).unwrap();
        let stream = &packed[13..];
        let mut file = self.prefix(b'Z', body.len());
        file.extend_from_slice(&(stream.len() as u32).to_le_bytes());
        file.extend_from_slice(&packed[..5]);
        file.extend_from_slice(stream);
        file
    }
}
