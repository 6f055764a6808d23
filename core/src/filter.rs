use crate::entity::{Entity, Gender};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An inclusive range with optional ends. An empty range matches everything.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Range {
    pub min: Option<i32>,
    pub max: Option<i32>,
}

impl Range {
    pub fn new(min: Option<i32>, max: Option<i32>) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn contains(&self, value: i32) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }
}

/// The set of inclusion predicates that decides which entities take part in a session.
///
/// Every predicate that is set must hold. Predicates that make no sense for an entity kind (gender
/// of a scene, say) are skipped by repositories for that kind, and an entity missing the data a
/// predicate needs does not match it.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Filter {
    /// Genders to include. Empty means any gender.
    pub genders: BTreeSet<Gender>,
    pub ethnicity: Option<String>,
    pub country: Option<String>,
    pub age: Range,
    pub rating: Range,
    /// Case-insensitive substring of the name.
    pub name: Option<String>,
    pub image_required: bool,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            genders: [Gender::Female].into(),
            ethnicity: None,
            country: None,
            age: Range::default(),
            rating: Range::default(),
            name: None,
            image_required: true,
        }
    }
}

impl Filter {
    /// A filter that admits every entity.
    pub fn any() -> Self {
        Self {
            genders: BTreeSet::new(),
            image_required: false,
            ..Default::default()
        }
    }

    /// Evaluate the filter against a performer-like entity.
    pub fn matches(&self, entity: &Entity, today: NaiveDate) -> bool {
        if !self.genders.is_empty()
            && !entity.gender.is_some_and(|gender| self.genders.contains(&gender))
        {
            return false;
        }
        if !matches_text(&self.ethnicity, entity.ethnicity.as_deref()) {
            return false;
        }
        if !matches_text(&self.country, entity.country.as_deref()) {
            return false;
        }
        if !self.age.is_empty() && !entity.age(today).is_some_and(|age| self.age.contains(age)) {
            return false;
        }
        if !self.rating.is_empty() && !self.rating.contains(entity.rating()) {
            return false;
        }
        if let Some(name) = &self.name {
            if !entity.name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        !self.image_required || entity.has_image()
    }

    /// Evaluate only the predicates that apply to scenes and images (rating, title, image).
    pub fn matches_media(&self, entity: &Entity) -> bool {
        Self {
            genders: BTreeSet::new(),
            ethnicity: None,
            country: None,
            age: Range::default(),
            ..self.clone()
        }
        .matches(entity, NaiveDate::MIN)
    }
}

fn matches_text(wanted: &Option<String>, actual: Option<&str>) -> bool {
    match wanted {
        None => true,
        Some(wanted) => actual.is_some_and(|actual| actual.eq_ignore_ascii_case(wanted)),
    }
}
