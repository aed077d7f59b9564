//! Per-session configuration and shared state handed to decoders.

use std::cell::Cell;
use std::rc::Rc;

use serde::Serialize;

use crate::decoders::font::{FontDefinition, FontStyle};

/// Cooperative cancellation flag, checked each time a chunk is pushed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Upper bound on the uncompressed buffer, applied on top of the length
    /// declared in the file header.
    pub max_uncompressed_length: u32,
    /// Memory limit for the LZMA dictionary, in bytes.
    pub lzma_memlimit: Option<usize>,
    pub cancel: Option<CancelToken>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_uncompressed_length: 256 * 1024 * 1024,
            lzma_memlimit: None,
            cancel: None,
        }
    }
}

impl ParseOptions {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredFont {
    pub id: u16,
    pub name: String,
    pub style: FontStyle,
    pub is_device: bool,
}

/// Fonts defined by this file, in definition order. Text fields use it to
/// pair device fonts with embedded fonts of the same name.
#[derive(Debug, Clone, Default)]
pub struct FontRegistry {
    fonts: Vec<RegisteredFont>,
}

impl FontRegistry {
    /// Add or refresh the entry for `font.id`.
    pub fn register(&mut self, font: &FontDefinition) {
        let entry = RegisteredFont {
            id: font.id,
            name: font.name.clone(),
            style: font.style,
            is_device: font.is_device(),
        };
        match self.fonts.iter_mut().find(|f| f.id == font.id) {
            Some(existing) => *existing = entry,
            None => self.fonts.push(entry),
        }
    }

    /// First font with this name and style, preferring embedded outlines.
    pub fn find(&self, name: &str, style: FontStyle) -> Option<&RegisteredFont> {
        let mut matching = self
            .fonts
            .iter()
            .filter(|f| f.style == style && f.name == name);
        let first = matching.clone().next();
        matching.find(|f| !f.is_device).or(first)
    }

    pub fn get(&self, id: u16) -> Option<&RegisteredFont> {
        self.fonts.iter().find(|f| f.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredFont> {
        self.fonts.iter()
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }
}

/// What every decoder needs to read a tag: the uncompressed file, its
/// version and the fonts registered so far.
#[derive(Clone, Copy)]
pub(crate) struct DecodeEnv<'a> {
    pub data: &'a [u8],
    pub version: u8,
    pub fonts: &'a FontRegistry,
}
