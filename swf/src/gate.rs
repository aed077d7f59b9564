//! Bookkeeping for asset data handed to external decoders.
//!
//! Images and sounds are decoded outside the library. The scanner queues
//! an [`AssetRequest`] for each one; the host decodes it and settles the
//! request with [`Movie::complete_asset`](crate::Movie::complete_asset) or
//! [`Movie::fail_asset`](crate::Movie::fail_asset). Root timeline
//! compilation waits until every request is settled.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::decoders::bitmap::{DecodedImage, ImageFormat};
use crate::decoders::sound::{DecodedSound, SoundHeader};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AssetKind {
    Image {
        format: ImageFormat,
        width: u32,
        height: u32,
    },
    Sound {
        header: SoundHeader,
        sample_count: u32,
    },
}

/// Encoded asset bytes for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetRequest {
    pub id: u16,
    pub kind: AssetKind,
    /// Image stream with any shared JPEG tables merged in, zlib-compressed
    /// pixels for lossless bitmaps, or raw sound data.
    pub data: Vec<u8>,
    /// Zlib-compressed alpha plane of JPEGs that carry one.
    pub alpha: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedAsset {
    Image(DecodedImage),
    Sound(DecodedSound),
}

/// A host-side codec. Errors are reported as plain messages and fail only
/// the requesting symbol.
pub trait AssetDecoder {
    fn decode(&mut self, request: &AssetRequest) -> Result<DecodedAsset, String>;
}

/// Counts outstanding requests. Success and failure both settle a request,
/// so a failing decoder cannot keep the gate closed.
#[derive(Debug, Default)]
pub struct DependencyGate {
    queued: Vec<AssetRequest>,
    outstanding: BTreeSet<u16>,
}

impl DependencyGate {
    pub fn request(&mut self, request: AssetRequest) {
        tracing::trace!(id = request.id, bytes = request.data.len(), "queueing asset request");
        self.outstanding.insert(request.id);
        self.queued.push(request);
    }

    /// Requests not yet handed to the host. Each is returned once.
    pub fn take_requests(&mut self) -> Vec<AssetRequest> {
        std::mem::take(&mut self.queued)
    }

    /// Mark `id` as settled. Returns `false` if it was not outstanding.
    pub fn settle(&mut self, id: u16) -> bool {
        self.queued.retain(|request| request.id != id);
        let settled = self.outstanding.remove(&id);
        if settled && self.outstanding.is_empty() {
            tracing::debug!("all asset requests settled");
        }
        settled
    }

    pub fn is_outstanding(&self, id: u16) -> bool {
        self.outstanding.contains(&id)
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_open(&self) -> bool {
        self.outstanding.is_empty()
    }
}
