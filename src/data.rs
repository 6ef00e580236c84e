use serde::{Deserialize, Serialize};

/// A category tag from the upstream vocabulary (a Pokémon type).
pub type CategoryTag = String;

/// Listing reference returned by the collection endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntitySummary {
    pub name: String,
    pub url: String,
}

/// Enriched catalog entry. Built once during acquisition and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDetail {
    name: String,
    image_url: Option<String>,
    tags: Vec<CategoryTag>,
}

impl EntityDetail {
    pub fn new(
        name: impl Into<String>,
        image_url: Option<String>,
        tags: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            image_url,
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    pub fn tags(&self) -> &[CategoryTag] {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Tags joined the way cards display them.
    pub fn tag_line(&self) -> String {
        self.tags.join(", ")
    }

    /// Name with its first character upper-cased.
    pub fn display_name(&self) -> String {
        let mut chars = self.name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
pub(crate) struct NamedResourceList {
    pub results: Vec<EntitySummary>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
pub(crate) struct DetailRecord {
    pub name: String,
    pub sprites: SpriteRecord,
    pub types: Vec<TypeSlotRecord>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
pub(crate) struct SpriteRecord {
    pub front_default: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
pub(crate) struct TypeSlotRecord {
    #[serde(rename = "type")]
    pub kind: NamedRecord,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
pub(crate) struct NamedRecord {
    pub name: String,
}

impl From<DetailRecord> for EntityDetail {
    fn from(record: DetailRecord) -> Self {
        EntityDetail::new(
            record.name,
            record.sprites.front_default,
            record.types.into_iter().map(|slot| slot.kind.name),
        )
    }
}

#[allow(dead_code)]
impl NamedResourceList {
    pub fn names(self) -> Vec<CategoryTag> {
        self.results.into_iter().map(|item| item.name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_record_flattens_sprite_and_types() {
        let body = r#"{
            "id": 1,
            "name": "bulbasaur",
            "sprites": { "front_default": "https://img/1.png", "back_default": null },
            "types": [
                { "slot": 1, "type": { "name": "grass", "url": "https://x/type/12/" } },
                { "slot": 2, "type": { "name": "poison", "url": "https://x/type/4/" } }
            ]
        }"#;
        let record: DetailRecord = serde_json::from_str(body).unwrap();
        let detail = EntityDetail::from(record);
        assert_eq!(detail.name(), "bulbasaur");
        assert_eq!(detail.image_url(), Some("https://img/1.png"));
        assert_eq!(detail.tags(), ["grass", "poison"]);
        assert_eq!(detail.tag_line(), "grass, poison");
    }

    #[test]
    fn missing_sprite_maps_to_none() {
        let body = r#"{"name":"missingno","sprites":{"front_default":null},"types":[]}"#;
        let detail = EntityDetail::from(serde_json::from_str::<DetailRecord>(body).unwrap());
        assert!(detail.image_url().is_none());
        assert!(detail.tags().is_empty());
    }

    #[test]
    fn listing_keeps_upstream_order() {
        let body = r#"{"count":2,"next":null,"results":[
            {"name":"normal","url":"https://x/type/1/"},
            {"name":"fighting","url":"https://x/type/2/"}
        ]}"#;
        let list: NamedResourceList = serde_json::from_str(body).unwrap();
        assert_eq!(list.names(), vec!["normal", "fighting"]);
    }

    #[test]
    fn display_name_capitalises_first_letter() {
        let detail = EntityDetail::new("pikachu", None, ["electric"]);
        assert_eq!(detail.display_name(), "Pikachu");
        assert!(detail.has_tag("electric"));
        assert!(!detail.has_tag("Electric"));
    }
}
