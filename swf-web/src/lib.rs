//! WASM bindings for the SWF loader.
//!
//! Bytes are pushed as they download. Image and sound data is handed to
//! JavaScript through `pendingAssets()`; the page decodes it (for example
//! with `createImageBitmap` or `decodeAudioData`) and settles each request
//! with `completeAsset` or `failAsset`. Once `isReady` holds, the compiled
//! main timeline is available as a plain object.

use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

use swf::decoders::bitmap::DecodedImage;
use swf::decoders::sound::DecodedSound;
use swf::{AssetKind, AssetRequest, DecodedAsset, Movie, ParseOptions};

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsError> {
    serde_wasm_bindgen::to_value(value).map_err(|e| JsError::new(&e.to_string()))
}

/// Encoded asset data waiting for a browser codec.
#[wasm_bindgen]
pub struct PendingAsset {
    #[wasm_bindgen(readonly)]
    pub id: u16,
    request: AssetRequest,
}

#[wasm_bindgen]
impl PendingAsset {
    /// "image" or "sound".
    #[wasm_bindgen(getter)]
    pub fn kind(&self) -> String {
        match self.request.kind {
            AssetKind::Image { .. } => "image".to_string(),
            AssetKind::Sound { .. } => "sound".to_string(),
        }
    }

    /// Format, dimensions or sound header, as an object.
    #[wasm_bindgen(getter)]
    pub fn info(&self) -> Result<JsValue, JsError> {
        to_js(&self.request.kind)
    }

    /// Encoded bytes as Uint8Array.
    #[wasm_bindgen(getter)]
    pub fn data(&self) -> js_sys::Uint8Array {
        js_sys::Uint8Array::from(&self.request.data[..])
    }

    /// Zlib-compressed alpha plane, if the image has one.
    #[wasm_bindgen(getter)]
    pub fn alpha(&self) -> Option<js_sys::Uint8Array> {
        self.request
            .alpha
            .as_deref()
            .map(js_sys::Uint8Array::from)
    }
}

/// What JavaScript passes to `completeAsset`.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum AssetPayload {
    Image {
        width: u32,
        height: u32,
        rgba: Vec<u8>,
    },
    #[serde(rename_all = "camelCase")]
    Sound {
        sample_rate: u32,
        channels: u8,
        samples: Vec<i16>,
    },
}

impl From<AssetPayload> for DecodedAsset {
    fn from(payload: AssetPayload) -> Self {
        match payload {
            AssetPayload::Image {
                width,
                height,
                rgba,
            } => DecodedAsset::Image(DecodedImage {
                width,
                height,
                rgba,
            }),
            AssetPayload::Sound {
                sample_rate,
                channels,
                samples,
            } => DecodedAsset::Sound(DecodedSound {
                sample_rate,
                channels,
                samples,
            }),
        }
    }
}

/// A movie being loaded.
#[wasm_bindgen]
pub struct SwfLoader {
    inner: Movie,
}

#[wasm_bindgen]
impl SwfLoader {
    /// Start a new session. `maxLength` caps the uncompressed size.
    #[wasm_bindgen(constructor)]
    pub fn new(max_length: Option<u32>) -> SwfLoader {
        let mut options = ParseOptions::default();
        if let Some(max) = max_length {
            options.max_uncompressed_length = max;
        }
        SwfLoader {
            inner: Movie::new(options),
        }
    }

    /// Append the next downloaded chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), JsError> {
        self.inner
            .push(chunk)
            .map_err(|e| JsError::new(&e.to_string()))
    }

    /// Signal that the download finished.
    pub fn finish(&mut self) -> Result<(), JsError> {
        self.inner
            .finish()
            .map_err(|e| JsError::new(&e.to_string()))
    }

    #[wasm_bindgen(getter, js_name = "isScanComplete")]
    pub fn is_scan_complete(&self) -> bool {
        self.inner.is_scan_complete()
    }

    /// Scanning finished and every asset request was settled.
    #[wasm_bindgen(getter, js_name = "isReady")]
    pub fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    /// Header fields, or `undefined` before the header has arrived.
    pub fn header(&self) -> Result<JsValue, JsError> {
        match self.inner.header() {
            Some(header) => to_js(header),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    /// Asset requests queued since the last call.
    #[wasm_bindgen(js_name = "pendingAssets")]
    pub fn pending_assets(&mut self) -> Vec<PendingAsset> {
        self.inner
            .pending_assets()
            .into_iter()
            .map(|request| PendingAsset {
                id: request.id,
                request,
            })
            .collect()
    }

    /// Settle a request with decoded data:
    /// `{ type: "image", width, height, rgba }` or
    /// `{ type: "sound", sampleRate, channels, samples }`.
    #[wasm_bindgen(js_name = "completeAsset")]
    pub fn complete_asset(&mut self, id: u16, asset: JsValue) -> Result<(), JsError> {
        let payload: AssetPayload = match serde_wasm_bindgen::from_value(asset) {
            Ok(payload) => payload,
            Err(e) => {
                // settle anyway so the gate can still open
                let reason = format!("malformed asset payload: {e}");
                self.inner.fail_asset(id, reason.clone());
                return Err(JsError::new(&reason));
            }
        };
        self.inner
            .complete_asset(id, payload.into())
            .map_err(|e| JsError::new(&e.to_string()))
    }

    /// The browser could not decode the asset. Only that symbol fails.
    #[wasm_bindgen(js_name = "failAsset")]
    pub fn fail_asset(&mut self, id: u16, reason: String) {
        web_sys::console::warn_1(&format!("asset {id} failed: {reason}").into());
        self.inner.fail_asset(id, reason);
    }

    /// Kind of a dictionary entry ("shape", "sprite", ...).
    #[wasm_bindgen(js_name = "symbolKind")]
    pub fn symbol_kind(&self, id: u16) -> Option<String> {
        self.inner.dictionary().kind(id).map(|kind| kind.to_string())
    }

    /// Decode a symbol and return it as an object.
    pub fn symbol(&mut self, id: u16) -> Result<JsValue, JsError> {
        let symbol = self
            .inner
            .symbol(id)
            .map_err(|e| JsError::new(&e.to_string()))?;
        to_js(&*symbol)
    }

    /// The compiled main timeline. Fails until `isReady`.
    #[wasm_bindgen(js_name = "rootTimeline")]
    pub fn root_timeline(&mut self) -> Result<JsValue, JsError> {
        let timeline = self
            .inner
            .root_timeline()
            .map_err(|e| JsError::new(&e.to_string()))?;
        to_js(&*timeline)
    }

    /// Header, attributes, symbol table, fonts and class bindings.
    pub fn summary(&self) -> Result<JsValue, JsError> {
        match self.inner.summary() {
            Some(summary) => to_js(&summary),
            None => Ok(JsValue::UNDEFINED),
        }
    }
}
