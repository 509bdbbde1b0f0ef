use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{DateKey, UtcDateTime, ValidationError};

/// Display category for a historical event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Birth,
    Death,
    War,
    Discovery,
    Disaster,
    Politics,
    Event,
}

impl EventCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Birth => "birth",
            Self::Death => "death",
            Self::War => "war",
            Self::Discovery => "discovery",
            Self::Disaster => "disaster",
            Self::Politics => "politics",
            Self::Event => "event",
        }
    }

    /// Icon rendered next to the event card.
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Birth => "👶",
            Self::Death => "⚰️",
            Self::War => "⚔️",
            Self::Discovery => "🔬",
            Self::Disaster => "🌋",
            Self::Politics => "👑",
            Self::Event => "📅",
        }
    }

    /// Accent colour used by the newspaper theme.
    pub const fn color(self) -> &'static str {
        match self {
            Self::Birth => "#228b22",
            Self::Death => "#696969",
            Self::War => "#cc4125",
            Self::Discovery => "#1f4e79",
            Self::Disaster => "#d2691e",
            Self::Politics => "#8b0000",
            Self::Event => "#2f4f4f",
        }
    }

    /// Keyword classification of free event text. First matching rule wins.
    pub fn classify(text: &str) -> Self {
        const RULES: &[(&[&str], EventCategory)] = &[
            (&["born", "birth"], EventCategory::Birth),
            (&["died", "death", "executed"], EventCategory::Death),
            (&["war", "battle", "invasion"], EventCategory::War),
            (&["discover", "invention", "patent"], EventCategory::Discovery),
            (&["earthquake", "volcano", "disaster"], EventCategory::Disaster),
            (
                &[
                    "king",
                    "queen",
                    "emperor",
                    "crowned",
                    "treaty",
                    "independence",
                    "revolution",
                ],
                EventCategory::Politics,
            ),
        ];

        let lower = text.to_lowercase();
        RULES
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|keyword| lower.contains(keyword)))
            .map(|(_, category)| *category)
            .unwrap_or(Self::Event)
    }
}

impl Display for EventCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Related article for an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLink {
    pub title: String,
    pub url: String,
}

/// One historical event. Construction validates the text fields and the
/// record is read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    id: String,
    year: i32,
    title: String,
    description: String,
    category: EventCategory,
    #[serde(default)]
    links: Vec<EventLink>,
}

impl EventRecord {
    pub fn new(
        year: i32,
        title: impl Into<String>,
        description: impl Into<String>,
        category: EventCategory,
    ) -> Result<Self, ValidationError> {
        let title = title.into();
        let description = description.into();

        if title.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "title" });
        }
        if description.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "description",
            });
        }

        Ok(Self {
            id: event_id(year, &description),
            year,
            title,
            description,
            category,
            links: Vec::new(),
        })
    }

    pub fn with_links(mut self, links: Vec<EventLink>) -> Self {
        self.links = links;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub const fn year(&self) -> i32 {
        self.year
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub const fn category(&self) -> EventCategory {
        self.category
    }

    pub fn links(&self) -> &[EventLink] {
        &self.links
    }

    /// Re-checks the invariants on records that bypassed [`EventRecord::new`],
    /// e.g. after deserialization.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "title" });
        }
        if self.description.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "description",
            });
        }
        Ok(())
    }
}

fn event_id(year: i32, description: &str) -> String {
    let slug: String = description
        .chars()
        .take(50)
        .filter(char::is_ascii_alphanumeric)
        .collect();
    format!("{year}-{slug}")
}

/// Where the events handed to the caller came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// Fetched from the upstream provider.
    Live,
    /// Stale cache served because the upstream could not be reached.
    Fallback,
}

impl EventSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Fallback => "fallback",
        }
    }
}

impl Display for EventSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a fetch, as handed to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventList {
    pub date_key: DateKey,
    pub events: Vec<EventRecord>,
    pub source: EventSource,
    pub fetched_at: UtcDateTime,
    /// True when served from the local cache without a live call.
    pub from_cache: bool,
}

impl EventList {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_uses_first_matching_rule() {
        assert_eq!(
            EventCategory::classify("Mozart is born in Salzburg"),
            EventCategory::Birth
        );
        assert_eq!(
            EventCategory::classify("The Battle of Hastings is fought"),
            EventCategory::War
        );
        assert_eq!(
            EventCategory::classify("The king signs a treaty"),
            EventCategory::Politics
        );
        assert_eq!(
            EventCategory::classify("Apollo 11 lands on the Moon"),
            EventCategory::Event
        );
        // "died" outranks "war"
        assert_eq!(
            EventCategory::classify("A general died during the war"),
            EventCategory::Death
        );
    }

    #[test]
    fn rejects_blank_title_or_description() {
        let err = EventRecord::new(1969, "  ", "desc", EventCategory::Event).expect_err("blank");
        assert_eq!(err, ValidationError::EmptyField { field: "title" });

        let err = EventRecord::new(1969, "title", "", EventCategory::Event).expect_err("empty");
        assert_eq!(err, ValidationError::EmptyField { field: "description" });
    }

    #[test]
    fn id_is_year_plus_alphanumeric_prefix() {
        let record = EventRecord::new(
            1969,
            "Apollo 11",
            "Apollo 11: the first crewed Moon landing.",
            EventCategory::Discovery,
        )
        .expect("valid");
        assert_eq!(record.id(), "1969-Apollo11thefirstcrewedMoonlanding");
    }

    #[test]
    fn getters_expose_validated_fields_and_links() {
        let link = EventLink {
            title: String::from("Apollo 11"),
            url: String::from("https://en.wikipedia.org/wiki/Apollo_11"),
        };
        let record = EventRecord::new(1969, "Moon", "Apollo 11 lands.", EventCategory::Discovery)
            .expect("valid")
            .with_links(vec![link.clone()]);

        assert_eq!(record.year(), 1969);
        assert_eq!(record.title(), "Moon");
        assert_eq!(record.description(), "Apollo 11 lands.");
        assert_eq!(record.category(), EventCategory::Discovery);
        assert_eq!(record.links(), [link]);
    }

    #[test]
    fn deserialized_record_is_rechecked_by_validate() {
        let json = r#"{
            "id": "1969-x", "year": 1969, "title": " ",
            "description": "d", "category": "event"
        }"#;
        let record: EventRecord = serde_json::from_str(json).expect("shape is valid");

        assert_eq!(
            record.validate(),
            Err(ValidationError::EmptyField { field: "title" })
        );
    }

    #[test]
    fn category_serializes_as_snake_case() {
        let json = serde_json::to_string(&EventCategory::Discovery).expect("serialize");
        assert_eq!(json, "\"discovery\"");
    }
}
