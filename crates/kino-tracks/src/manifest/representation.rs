//! Representation - one encoded quality variant

use std::cell::Cell;

/// One concrete encoded quality of an [`Adaptation`](super::Adaptation)
///
/// Identity (`id`, `bitrate`, codec, resolution) never changes. Codec support
/// and decipherability can, as capabilities are probed and keys obtained.
#[derive(Debug)]
pub struct Representation {
    id: String,
    bitrate: u64,
    codec: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    codec_supported: Cell<bool>,
    /// `None` while unknown (keys not requested yet)
    decipherable: Cell<Option<bool>>,
}

impl Representation {
    pub fn new(id: impl Into<String>, bitrate: u64) -> Self {
        Self {
            id: id.into(),
            bitrate,
            codec: None,
            width: None,
            height: None,
            codec_supported: Cell::new(true),
            decipherable: Cell::new(None),
        }
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = Some(codec.into());
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_codec_supported(self, supported: bool) -> Self {
        self.codec_supported.set(supported);
        self
    }

    pub fn with_decipherable(self, decipherable: Option<bool>) -> Self {
        self.decipherable.set(decipherable);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bitrate(&self) -> u64 {
        self.bitrate
    }

    pub fn codec(&self) -> Option<&str> {
        self.codec.as_deref()
    }

    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.width.zip(self.height)
    }

    pub fn is_codec_supported(&self) -> bool {
        self.codec_supported.get()
    }

    pub fn decipherable(&self) -> Option<bool> {
        self.decipherable.get()
    }

    /// True if the client can currently decode and decrypt this quality.
    ///
    /// Unknown decipherability counts as playable.
    pub fn is_playable(&self) -> bool {
        self.codec_supported.get() && self.decipherable.get() != Some(false)
    }

    pub(crate) fn set_decipherable(&self, decipherable: Option<bool>) {
        self.decipherable.set(decipherable);
    }
}
