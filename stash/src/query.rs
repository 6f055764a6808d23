use anyhow::{bail, ensure, Context};
use hotornot_core::{
    filter::Range, matchmaker::rank, Entity, EntityId, EntityKind, Filter, Gender,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// How a kind of entity is exposed by the Stash schema.
#[derive(Clone, Copy, Debug)]
pub struct Collection {
    /// Name of the find query, which is also the key of its result.
    pub find: &'static str,
    /// Key of the item list inside a find result.
    pub items: &'static str,
    filter_arg: &'static str,
    filter_type: &'static str,
    fields: &'static str,
    update: &'static str,
    update_input: &'static str,
}

impl Collection {
    pub fn of(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Performer => Self {
                find: "findPerformers",
                items: "performers",
                filter_arg: "performer_filter",
                filter_type: "PerformerFilterType",
                fields: "id name rating100 gender ethnicity country birthdate image_path",
                update: "performerUpdate",
                update_input: "PerformerUpdateInput",
            },
            EntityKind::Scene => Self {
                find: "findScenes",
                items: "scenes",
                filter_arg: "scene_filter",
                filter_type: "SceneFilterType",
                fields: "id title rating100 paths { screenshot }",
                update: "sceneUpdate",
                update_input: "SceneUpdateInput",
            },
            EntityKind::Image => Self {
                find: "findImages",
                items: "images",
                filter_arg: "image_filter",
                filter_type: "ImageFilterType",
                fields: "id title rating100 paths { thumbnail }",
                update: "imageUpdate",
                update_input: "ImageUpdateInput",
            },
        }
    }

    /// A find query. Without `items` only the total count is requested.
    pub fn find_query(&self, items: bool) -> String {
        let selection = if items {
            format!("count {} {{ {} }}", self.items, self.fields)
        } else {
            "count".to_string()
        };
        format!(
            "query Find($filter: FindFilterType, $entity_filter: {}) {{ {}(filter: $filter, {}: $entity_filter) {{ {selection} }} }}",
            self.filter_type, self.find, self.filter_arg,
        )
    }

    pub fn update_mutation(&self) -> String {
        format!(
            "mutation Update($input: {}!) {{ {}(input: $input) {{ id }} }}",
            self.update_input, self.update,
        )
    }
}

/// Paging and ordering of a find query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Page {
    /// Only the count; no items.
    Count,
    /// Highest rated first, at most `limit` items (all of them if `None`).
    Sorted(Option<usize>),
    /// `limit` items in random order.
    Random(usize),
}

impl Page {
    pub fn variables(self) -> Value {
        match self {
            Self::Count => json!({ "per_page": 0 }),
            Self::Sorted(limit) => json!({
                "per_page": limit.map_or(-1, |limit| limit as i64),
                "sort": "rating",
                "direction": "DESC",
            }),
            Self::Random(limit) => json!({
                "per_page": limit,
                "sort": "random",
            }),
        }
    }
}

/// Translate a filter into the `*_filter` argument of a find query.
///
/// Performer-only predicates are dropped for scenes and images, and media is matched on title
/// rather than name. Scenes and images always carry a screenshot or thumbnail, so the image
/// requirement only constrains performers.
pub fn entity_filter(kind: EntityKind, filter: &Filter) -> Value {
    let mut criteria = Map::new();
    if let Some(rating) = int_criterion(&filter.rating) {
        criteria.insert("rating100".into(), rating);
    }
    let name_field = match kind {
        EntityKind::Performer => "name",
        EntityKind::Scene | EntityKind::Image => "title",
    };
    if let Some(name) = &filter.name {
        criteria.insert(
            name_field.into(),
            json!({ "value": name, "modifier": "INCLUDES" }),
        );
    }
    if kind != EntityKind::Performer {
        return Value::Object(criteria);
    }

    if !filter.genders.is_empty() {
        let genders: Vec<Value> = filter
            .genders
            .iter()
            .map(|gender| gender_value(*gender))
            .collect();
        criteria.insert(
            "gender".into(),
            json!({ "value_list": genders, "modifier": "INCLUDES" }),
        );
    }
    for (field, value) in [("ethnicity", &filter.ethnicity), ("country", &filter.country)] {
        if let Some(value) = value {
            criteria.insert(field.into(), json!({ "value": value, "modifier": "EQUALS" }));
        }
    }
    if let Some(age) = int_criterion(&filter.age) {
        criteria.insert("age".into(), age);
    }
    if filter.image_required {
        criteria.insert("NOT".into(), json!({ "is_missing": "image" }));
    }
    Value::Object(criteria)
}

fn int_criterion(range: &Range) -> Option<Value> {
    match (range.min, range.max) {
        (None, None) => None,
        (Some(min), Some(max)) => Some(json!({ "value": min, "value2": max, "modifier": "BETWEEN" })),
        (Some(min), None) => Some(json!({ "value": min.saturating_sub(1), "modifier": "GREATER_THAN" })),
        (None, Some(max)) => Some(json!({ "value": max.saturating_add(1), "modifier": "LESS_THAN" })),
    }
}

fn gender_value(gender: Gender) -> Value {
    serde_json::to_value(gender).unwrap_or(Value::Null)
}

/// Unwrap the `data` of a GraphQL response, turning reported errors into an error.
pub fn response_data(body: &[u8]) -> anyhow::Result<Map<String, Value>> {
    let mut response: Map<String, Value> = serde_json::from_slice(body)?;

    if let Some(errors) = response.remove("errors") {
        let errors = errors.as_array().context("malformed errors")?;
        if !errors.is_empty() {
            let messages = errors
                .iter()
                .map(|error| error["message"].as_str().unwrap_or("unknown error"))
                .collect::<Vec<_>>()
                .join("; ");
            bail!("graphql error: {messages}");
        }
    }

    match response.remove("data").context("missing data")? {
        Value::Object(data) => Ok(data),
        data => bail!("malformed data: {data}"),
    }
}

/// The count and (if requested) items of a find query's result.
pub fn find_result(
    collection: Collection,
    mut data: Map<String, Value>,
) -> anyhow::Result<(usize, Vec<Entity>)> {
    let mut result = data
        .remove(collection.find)
        .context(format!("missing {}", collection.find))?;
    let result = result
        .as_object_mut()
        .context(format!("{} is not an object", collection.find))?;

    let count = result
        .get("count")
        .and_then(Value::as_u64)
        .context("missing count")? as usize;
    let items = match result.remove(collection.items) {
        Some(items) => serde_json::from_value::<Vec<Item>>(items)?
            .into_iter()
            .map(Entity::from)
            .collect(),
        None => vec![],
    };
    Ok((count, items))
}

/// Items of a sorted find, in engine order.
///
/// Stash places unrated items by its own rules; the engine treats them as rated
/// [`DEFAULT_RATING`](hotornot_core::rating::DEFAULT_RATING) and breaks ties by id.
pub fn sorted(items: Vec<Entity>) -> Vec<Entity> {
    rank(items)
}

/// Check that an update mutation touched the entity it was meant to.
pub fn updated_id(collection: Collection, data: &Map<String, Value>) -> anyhow::Result<EntityId> {
    let id = data
        .get(collection.update)
        .and_then(|result| result["id"].as_str())
        .context(format!("missing {} result", collection.update))?;
    ensure!(!id.is_empty(), "empty id in {} result", collection.update);
    Ok(id.into())
}

/// An item as returned by any of the find queries.
#[derive(Debug, Deserialize)]
struct Item {
    id: String,
    #[serde(alias = "title", default)]
    name: Option<String>,
    rating100: Option<i32>,
    #[serde(default)]
    gender: Option<Gender>,
    #[serde(default)]
    ethnicity: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    birthdate: Option<String>,
    #[serde(default)]
    image_path: Option<String>,
    #[serde(default)]
    paths: Option<Paths>,
}

#[derive(Debug, Default, Deserialize)]
struct Paths {
    screenshot: Option<String>,
    thumbnail: Option<String>,
}

impl From<Item> for Entity {
    fn from(item: Item) -> Self {
        let paths = item.paths.unwrap_or_default();
        Entity {
            id: item.id.into(),
            name: item.name.unwrap_or_default(),
            rating100: item.rating100,
            gender: item.gender,
            ethnicity: item.ethnicity.filter(|s| !s.is_empty()),
            country: item.country.filter(|s| !s.is_empty()),
            // Stash accepts partial dates; those cannot be used for age filtering.
            birthdate: item.birthdate.and_then(|date| date.parse().ok()),
            image_path: item.image_path.or(paths.screenshot).or(paths.thumbnail),
        }
    }
}
