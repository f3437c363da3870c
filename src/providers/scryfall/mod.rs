//! Scryfall catalog: card shapes shared by the bulk snapshot and point lookups,
//! plus the artwork selection policy both paths apply.

pub mod bulk;
pub mod client;
pub mod lookup;

use serde::{Deserialize, Serialize};

pub use bulk::{resolve_snapshot, ScryfallBulkSource, SnapshotResolution, SnapshotSource};
pub use client::{CardLookup, LookupOutcome, ScryfallClient};
pub use lookup::{LookupSummary, RateLimitedResolver};

/// Layout of art-only printings; these never become indexed cards.
pub const ART_SERIES_LAYOUT: &str = "art_series";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageUris {
    pub normal: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardFace {
    pub name: Option<String>,
    pub image_uris: Option<ImageUris>,
}

/// The subset of a Scryfall card object this crate reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScryfallCard {
    pub id: String,
    pub name: Option<String>,
    pub layout: Option<String>,
    pub image_uris: Option<ImageUris>,
    pub card_faces: Option<Vec<CardFace>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageResolution {
    Direct(String),
    FrontFace(String),
    ArtSeries,
    Missing(String),
}

impl ImageResolution {
    pub fn url(&self) -> Option<&str> {
        match self {
            ImageResolution::Direct(u) | ImageResolution::FrontFace(u) => Some(u),
            _ => None,
        }
    }
}

fn normal_url(uris: Option<&ImageUris>) -> Option<&str> {
    uris.and_then(|u| u.normal.as_deref())
        .filter(|s| !s.trim().is_empty())
}

impl ScryfallCard {
    /// Pick the artwork URL: the card's own image, else the first face's.
    pub fn resolve_image(&self) -> ImageResolution {
        if self.layout.as_deref() == Some(ART_SERIES_LAYOUT) {
            return ImageResolution::ArtSeries;
        }
        if let Some(url) = normal_url(self.image_uris.as_ref()) {
            return ImageResolution::Direct(url.to_string());
        }
        match self.card_faces.as_deref() {
            Some([front, ..]) => match normal_url(front.image_uris.as_ref()) {
                Some(url) => ImageResolution::FrontFace(url.to_string()),
                None => ImageResolution::Missing(format!(
                    "No image_uris in card_faces for ID: {}",
                    self.id
                )),
            },
            _ => ImageResolution::Missing(format!("No image_uris found for ID: {}", self.id)),
        }
    }
}
