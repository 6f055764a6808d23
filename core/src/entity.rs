use crate::rating::{self, DEFAULT_RATING};
use chrono::{Datelike, NaiveDate};
use derive_more::{Display, From, FromStr, Into};
use serde::{Deserialize, Serialize};

/// The identifier the host library assigns to an entity.
#[derive(
    Clone,
    Debug,
    Default,
    Display,
    From,
    FromStr,
    Into,
    Deserialize,
    Serialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The kind of library item being ranked.
///
/// All kinds are ranked by the same algorithm; the kind only decides which collection a repository
/// reads from and writes to.
#[derive(Clone, Copy, Debug, Display, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[default]
    #[display("performer")]
    Performer,
    #[display("scene")]
    Scene,
    #[display("image")]
    Image,
}

impl std::str::FromStr for EntityKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "performer" | "performers" => Ok(Self::Performer),
            "scene" | "scenes" => Ok(Self::Scene),
            "image" | "images" => Ok(Self::Image),
            _ => anyhow::bail!("unknown entity kind {s}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Display, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    #[display("female")]
    Female,
    #[display("male")]
    Male,
    #[display("transgender female")]
    TransgenderFemale,
    #[display("transgender male")]
    TransgenderMale,
    #[display("intersex")]
    Intersex,
    #[display("non-binary")]
    NonBinary,
}

impl std::str::FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "female" => Self::Female,
            "male" => Self::Male,
            "transgender_female" | "trans_female" => Self::TransgenderFemale,
            "transgender_male" | "trans_male" => Self::TransgenderMale,
            "intersex" => Self::Intersex,
            "non_binary" | "nonbinary" => Self::NonBinary,
            _ => anyhow::bail!("unknown gender {s}"),
        })
    }
}

/// A rateable library item.
///
/// The engine only cares about `id` and `rating100`; the remaining fields exist so filters can be
/// evaluated and front-ends have something to show.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Entity {
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rating100: Option<i32>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub ethnicity: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub birthdate: Option<NaiveDate>,
    #[serde(default)]
    pub image_path: Option<String>,
}

impl Entity {
    pub fn new(id: impl Into<EntityId>, name: impl Into<String>, rating100: Option<i32>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rating100,
            ..Default::default()
        }
    }

    /// The current rating, defaulted when the library has none and clamped into range.
    pub fn rating(&self) -> i32 {
        rating::clamp(self.rating100.unwrap_or(DEFAULT_RATING))
    }

    /// A copy of this entity carrying a new rating.
    pub fn with_rating(&self, rating: i32) -> Self {
        Self {
            rating100: Some(rating::clamp(rating)),
            ..self.clone()
        }
    }

    pub fn has_image(&self) -> bool {
        self.image_path.as_deref().is_some_and(|path| !path.is_empty())
    }

    /// Age in whole years on `today`, if the birthdate is known.
    pub fn age(&self, today: NaiveDate) -> Option<i32> {
        let birthdate = self.birthdate?;
        let mut age = today.year() - birthdate.year();
        if (today.month(), today.day()) < (birthdate.month(), birthdate.day()) {
            age -= 1;
        }
        Some(age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_rating_defaults() {
        let entity = Entity::new("1", "unrated", None);
        assert_eq!(entity.rating(), 50);
    }

    #[test]
    fn test_out_of_range_rating_is_clamped() {
        assert_eq!(Entity::new("1", "a", Some(140)).rating(), 100);
        assert_eq!(Entity::new("1", "a", Some(0)).rating(), 1);
        assert_eq!(Entity::new("1", "a", Some(30)).with_rating(-5).rating100, Some(1));
    }

    #[test]
    fn test_age_before_and_after_birthday() {
        let mut entity = Entity::new("1", "a", None);
        entity.birthdate = NaiveDate::from_ymd_opt(1990, 6, 15);
        assert_eq!(entity.age(NaiveDate::from_ymd_opt(2020, 6, 14).unwrap()), Some(29));
        assert_eq!(entity.age(NaiveDate::from_ymd_opt(2020, 6, 15).unwrap()), Some(30));
    }

    #[test]
    fn test_deserialize_stash_performer() {
        let entity: Entity = serde_json::from_value(serde_json::json!({
            "id": "42",
            "name": "Someone",
            "rating100": null,
            "gender": "TRANSGENDER_FEMALE",
            "image_path": "http://localhost:9999/performer/42/image",
        }))
        .unwrap();
        assert_eq!(entity.id, EntityId::from("42"));
        assert_eq!(entity.gender, Some(Gender::TransgenderFemale));
        assert_eq!(entity.rating(), 50);
        assert!(entity.has_image());
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("scenes".parse::<EntityKind>().unwrap(), EntityKind::Scene);
        assert!("galleries".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_parse_gender() {
        assert_eq!("Non-Binary".parse::<Gender>().unwrap(), Gender::NonBinary);
        assert_eq!(
            "transgender_female".parse::<Gender>().unwrap(),
            Gender::TransgenderFemale
        );
        assert!("robot".parse::<Gender>().is_err());
    }
}
