//! Serde description of a manifest tree
//!
//! Parsers (DASH, Smooth, HLS) live outside this crate. This is the plain
//! data shape they, fixtures and tests hand over to build a [`Manifest`](super::Manifest).

use super::{Adaptation, Period, Representation};
use crate::error::{Error, Result};
use crate::types::TrackType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestDescription {
    pub periods: Vec<PeriodDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodDescription {
    pub id: String,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: Option<f64>,
    #[serde(default)]
    pub adaptations: Vec<AdaptationDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationDescription {
    pub id: String,
    #[serde(rename = "type")]
    pub track_type: TrackType,
    #[serde(default)]
    pub language: Option<String>,
    pub representations: Vec<RepresentationDescription>,
    #[serde(default)]
    pub trick_mode_tracks: Vec<AdaptationDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepresentationDescription {
    pub id: String,
    pub bitrate: u64,
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default = "default_codec_supported")]
    pub codec_supported: bool,
    #[serde(default)]
    pub decipherable: Option<bool>,
}

fn default_codec_supported() -> bool {
    true
}

impl ManifestDescription {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validate and build the period list
    pub fn into_periods(self) -> Result<Vec<Period>> {
        let mut period_ids = HashSet::new();
        self.periods
            .into_iter()
            .map(|period| {
                if !period_ids.insert(period.id.clone()) {
                    return Err(Error::InvalidManifest(format!(
                        "duplicate period id {}",
                        period.id
                    )));
                }
                period.into_period()
            })
            .collect()
    }
}

impl PeriodDescription {
    pub fn into_period(self) -> Result<Period> {
        if let Some(end) = self.end {
            if end < self.start {
                return Err(Error::InvalidManifest(format!(
                    "period {} ends ({}) before it starts ({})",
                    self.id, end, self.start
                )));
            }
        }
        let mut adaptation_ids = HashSet::new();
        let adaptations = self
            .adaptations
            .into_iter()
            .map(|adaptation| {
                if !adaptation_ids.insert(adaptation.id.clone()) {
                    return Err(Error::InvalidManifest(format!(
                        "duplicate adaptation id {} in period {}",
                        adaptation.id, self.id
                    )));
                }
                adaptation.into_adaptation()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Period::new(self.id, self.start, self.end, adaptations))
    }
}

impl AdaptationDescription {
    pub fn into_adaptation(self) -> Result<Adaptation> {
        let mut representation_ids = HashSet::new();
        let mut representations = Vec::with_capacity(self.representations.len());
        for repr in self.representations {
            if !representation_ids.insert(repr.id.clone()) {
                return Err(Error::InvalidManifest(format!(
                    "duplicate representation id {} in adaptation {}",
                    repr.id, self.id
                )));
            }
            representations.push(repr.into_representation());
        }

        let trick_mode_tracks = self
            .trick_mode_tracks
            .into_iter()
            .map(AdaptationDescription::into_adaptation)
            .collect::<Result<Vec<_>>>()?;

        let mut adaptation = Adaptation::new(self.id, self.track_type, representations)
            .with_trick_mode_tracks(trick_mode_tracks);
        if let Some(language) = self.language {
            adaptation = adaptation.with_language(language);
        }
        Ok(adaptation)
    }
}

impl RepresentationDescription {
    pub fn into_representation(self) -> Representation {
        let mut repr = Representation::new(self.id, self.bitrate)
            .with_codec_supported(self.codec_supported)
            .with_decipherable(self.decipherable);
        if let Some(codec) = self.codec {
            repr = repr.with_codec(codec);
        }
        if let (Some(width), Some(height)) = (self.width, self.height) {
            repr = repr.with_resolution(width, height);
        }
        repr
    }
}
