// src/model.rs
use serde::{Deserialize, Serialize};

/// Unified announcement kinds across all sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnouncementKind {
    ListingSpot,
    ListingFutures,
    Delisting,
    #[serde(rename = "activities")]
    Activity,
    Maintenance,
    News,
    Other,
}

impl AnnouncementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnouncementKind::ListingSpot => "listing_spot",
            AnnouncementKind::ListingFutures => "listing_futures",
            AnnouncementKind::Delisting => "delisting",
            AnnouncementKind::Activity => "activities",
            AnnouncementKind::Maintenance => "maintenance",
            AnnouncementKind::News => "news",
            AnnouncementKind::Other => "other",
        }
    }

    /// Map a configured internal name onto a kind. Unknown names fold into
    /// `Other` so a config typo never aborts ingestion.
    pub fn from_internal(name: &str) -> Self {
        match name {
            "listing_spot" => AnnouncementKind::ListingSpot,
            "listing_futures" => AnnouncementKind::ListingFutures,
            "delisting" => AnnouncementKind::Delisting,
            "activities" | "activity" => AnnouncementKind::Activity,
            "maintenance" => AnnouncementKind::Maintenance,
            "news" => AnnouncementKind::News,
            _ => AnnouncementKind::Other,
        }
    }
}

/// One configured category mapping for a source: which origin-native ids
/// (or title pattern) map onto which internal classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMapping {
    pub internal_name: String,
    pub show_name: String,
    #[serde(default)]
    pub original_ids: Vec<String>,
    #[serde(default)]
    pub title_regex: Option<String>,
}

impl CategoryMapping {
    pub fn other() -> Self {
        Self {
            internal_name: "other".to_string(),
            show_name: "Other".to_string(),
            original_ids: Vec::new(),
            title_regex: None,
        }
    }

    pub fn kind(&self) -> AnnouncementKind {
        AnnouncementKind::from_internal(&self.internal_name)
    }
}

/// The canonical, source-agnostic announcement. `(source, source_id)` is the
/// sole identity key; `published_at_ms` only orders items within one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub source: String,
    pub source_id: String,
    pub tickers: Vec<String>,
    pub title: String,
    pub url: String,
    pub published_at_ms: i64,
    pub body_text: Option<String>,
    pub kind: AnnouncementKind,
    pub category: CategoryMapping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_internal_names() {
        for kind in [
            AnnouncementKind::ListingSpot,
            AnnouncementKind::ListingFutures,
            AnnouncementKind::Delisting,
            AnnouncementKind::Activity,
            AnnouncementKind::Maintenance,
            AnnouncementKind::News,
            AnnouncementKind::Other,
        ] {
            assert_eq!(AnnouncementKind::from_internal(kind.as_str()), kind);
        }
    }

    #[test]
    fn unknown_internal_name_folds_into_other() {
        assert_eq!(
            AnnouncementKind::from_internal("airdrop"),
            AnnouncementKind::Other
        );
    }

    #[test]
    fn wire_name_for_activity_is_plural() {
        let json = serde_json::to_string(&AnnouncementKind::Activity).unwrap();
        assert_eq!(json, "\"activities\"");
    }
}
