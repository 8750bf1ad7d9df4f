//! Structured post-ranking filters over document facets.
//!
//! A filter spec is a JSON object; every key maps to one [`Filter`] variant and
//! carries an explicit value type. Unknown keys and mistyped values are rejected
//! while parsing, before any scoring work. All keys combine with AND.

use crate::document::{parse_date, Facets};
use crate::error::FilterSyntaxError;
use crate::index::{DocMeta, Index};
use crate::rank::ScoredDoc;
use serde_json::Value;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericFacet {
    TotalMinutes,
    PrepMinutes,
    CookMinutes,
    Rating,
    ReviewCount,
    Calories,
    Protein,
    Carbs,
    Fat,
    Fiber,
    Sugar,
    Sodium,
    IngredientCount,
    InstructionCount,
    Yield,
    /// Unix seconds; bounds are given as date strings.
    PublicationDate,
}

/// How a range bound is written in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoundKind {
    Number,
    Count,
    Date,
}

impl NumericFacet {
    pub const ALL: [NumericFacet; 16] = [
        NumericFacet::TotalMinutes,
        NumericFacet::PrepMinutes,
        NumericFacet::CookMinutes,
        NumericFacet::Rating,
        NumericFacet::ReviewCount,
        NumericFacet::Calories,
        NumericFacet::Protein,
        NumericFacet::Carbs,
        NumericFacet::Fat,
        NumericFacet::Fiber,
        NumericFacet::Sugar,
        NumericFacet::Sodium,
        NumericFacet::IngredientCount,
        NumericFacet::InstructionCount,
        NumericFacet::Yield,
        NumericFacet::PublicationDate,
    ];

    /// Key suffix after `min_` / `max_`.
    pub fn name(self) -> &'static str {
        match self {
            NumericFacet::TotalMinutes => "total_minutes",
            NumericFacet::PrepMinutes => "prep_minutes",
            NumericFacet::CookMinutes => "cook_minutes",
            NumericFacet::Rating => "rating",
            NumericFacet::ReviewCount => "review_count",
            NumericFacet::Calories => "calories",
            NumericFacet::Protein => "protein",
            NumericFacet::Carbs => "carbs",
            NumericFacet::Fat => "fat",
            NumericFacet::Fiber => "fiber",
            NumericFacet::Sugar => "sugar",
            NumericFacet::Sodium => "sodium",
            NumericFacet::IngredientCount => "ingredients",
            NumericFacet::InstructionCount => "instructions",
            NumericFacet::Yield => "yield",
            NumericFacet::PublicationDate => "publication_date",
        }
    }

    fn kind(self) -> BoundKind {
        match self {
            NumericFacet::ReviewCount | NumericFacet::IngredientCount | NumericFacet::InstructionCount => {
                BoundKind::Count
            }
            NumericFacet::PublicationDate => BoundKind::Date,
            _ => BoundKind::Number,
        }
    }

    pub fn value(self, facets: &Facets) -> Option<f64> {
        let n = &facets.nutrition;
        match self {
            NumericFacet::TotalMinutes => facets.total_minutes,
            NumericFacet::PrepMinutes => facets.prep_minutes,
            NumericFacet::CookMinutes => facets.cook_minutes,
            NumericFacet::Rating => facets.rating,
            NumericFacet::ReviewCount => facets.review_count.map(|c| c as f64),
            NumericFacet::Calories => n.calories,
            NumericFacet::Protein => n.protein,
            NumericFacet::Carbs => n.carbs,
            NumericFacet::Fat => n.fat,
            NumericFacet::Fiber => n.fiber,
            NumericFacet::Sugar => n.sugar,
            NumericFacet::Sodium => n.sodium,
            NumericFacet::IngredientCount => Some(facets.ingredients.len() as f64),
            NumericFacet::InstructionCount => Some(f64::from(facets.instruction_count)),
            NumericFacet::Yield => facets.yield_amount,
            NumericFacet::PublicationDate => facets.published_at.map(|t| t as f64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Inclusive; a document without the facet fails.
    Range { facet: NumericFacet, bound: Bound, value: f64 },
    /// Any listed cuisine.
    Cuisines(Vec<String>),
    /// Any listed category.
    Categories(Vec<String>),
    /// Any listed difficulty.
    Difficulty(Vec<String>),
    /// Every entry must be a substring of some ingredient line.
    RequiredIngredients(Vec<String>),
    /// No entry may be a substring of any ingredient line.
    ExcludedIngredients(Vec<String>),
    /// Any entry is a substring of the author name.
    Author(Vec<String>),
    /// Any listed tool.
    Tools(Vec<String>),
    /// Any entry is a keyword, or appears in the title or description.
    Keywords(Vec<String>),
    /// Any entry appears in the title, description or keywords.
    MealType(Vec<String>),
    /// Any entry appears in the title, description, keywords or ingredients.
    Dietary(Vec<String>),
    /// Any entry appears in the title, description or instructions.
    CookingMethod(Vec<String>),
    HasImage(bool),
}

impl Filter {
    pub fn min(facet: NumericFacet, value: f64) -> Self { Filter::Range { facet, bound: Bound::Min, value } }

    pub fn max(facet: NumericFacet, value: f64) -> Self { Filter::Range { facet, bound: Bound::Max, value } }

    pub fn matches(&self, doc: &DocMeta) -> bool {
        let facets = &doc.facets;
        match self {
            Filter::Range { facet, bound, value } => match (facet.value(facets), bound) {
                (None, _) => false,
                (Some(v), Bound::Min) => v >= *value,
                (Some(v), Bound::Max) => v <= *value,
            },
            Filter::Cuisines(wanted) => any_equal(wanted, &facets.cuisines),
            Filter::Categories(wanted) => any_equal(wanted, &facets.categories),
            Filter::Difficulty(wanted) => any_equal(wanted, facets.difficulty.as_slice()),
            Filter::RequiredIngredients(required) => required
                .iter()
                .all(|r| facets.ingredients.iter().any(|ing| contains_ci(ing, r))),
            Filter::ExcludedIngredients(excluded) => !excluded
                .iter()
                .any(|x| facets.ingredients.iter().any(|ing| contains_ci(ing, x))),
            Filter::Author(wanted) => {
                wanted.is_empty()
                    || facets.author.as_deref().is_some_and(|a| wanted.iter().any(|w| contains_ci(a, w)))
            }
            Filter::Tools(wanted) => any_equal(wanted, &facets.tools),
            Filter::Keywords(wanted) => {
                any_equal(wanted, &facets.keywords)
                    || any_in_text(wanted, [doc.title.as_str(), doc.description.as_str()])
            }
            Filter::MealType(wanted) => any_in_text(
                wanted,
                [doc.title.as_str(), doc.description.as_str()]
                    .into_iter()
                    .chain(facets.keywords.iter().map(String::as_str)),
            ),
            Filter::Dietary(wanted) => any_in_text(
                wanted,
                [doc.title.as_str(), doc.description.as_str()]
                    .into_iter()
                    .chain(facets.keywords.iter().map(String::as_str))
                    .chain(facets.ingredients.iter().map(String::as_str)),
            ),
            Filter::CookingMethod(wanted) => any_in_text(
                wanted,
                [doc.title.as_str(), doc.description.as_str()]
                    .into_iter()
                    .chain(doc.instructions.iter().map(String::as_str)),
            ),
            Filter::HasImage(wanted) => facets.has_image == *wanted,
        }
    }
}

/// OR semantics; an empty wish list imposes nothing.
fn any_equal(wanted: &[String], have: &[String]) -> bool {
    wanted.is_empty()
        || wanted
            .iter()
            .any(|w| have.iter().any(|h| h.trim().to_lowercase() == w.trim().to_lowercase()))
}

/// OR semantics over substrings of the joined text.
fn any_in_text<'a>(wanted: &[String], parts: impl IntoIterator<Item = &'a str>) -> bool {
    if wanted.is_empty() {
        return true;
    }
    let text = parts.into_iter().collect::<Vec<_>>().join(" ").to_lowercase();
    wanted.iter().any(|w| text.contains(&w.to_lowercase()))
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    filters: Vec<Filter>,
}

impl FilterSpec {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Conjunction of two specs.
    pub fn and(mut self, other: FilterSpec) -> Self {
        self.filters.extend(other.filters);
        self
    }

    pub fn is_empty(&self) -> bool { self.filters.is_empty() }

    pub fn filters(&self) -> &[Filter] { &self.filters }

    pub fn from_value(value: &Value) -> Result<Self, FilterSyntaxError> {
        let obj = match value {
            Value::Object(obj) => obj,
            Value::Null => return Ok(Self::default()),
            _ => return Err(FilterSyntaxError::NotAnObject),
        };
        let filters = obj
            .iter()
            .map(|(key, value)| parse_entry(key, value))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { filters })
    }

    pub fn matches(&self, doc: &DocMeta) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Drop results whose document fails; order and scores are untouched.
    pub fn apply(&self, ranked: Vec<ScoredDoc>, index: &Index) -> Vec<ScoredDoc> {
        if self.is_empty() {
            return ranked;
        }
        ranked
            .into_iter()
            .filter(|s| index.doc(s.doc_id).is_some_and(|d| self.matches(d)))
            .collect()
    }
}

impl FromStr for FilterSpec {
    type Err = FilterSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_str(s).map_err(|e| FilterSyntaxError::InvalidJson(e.to_string()))?;
        Self::from_value(&value)
    }
}

fn parse_entry(key: &str, value: &Value) -> Result<Filter, FilterSyntaxError> {
    if let Some((facet, bound)) = range_key(key) {
        let value = bound_value(key, value, facet.kind())?;
        return Ok(Filter::Range { facet, bound, value });
    }
    let list = || string_list(key, value);
    match key {
        "cuisines" => Ok(Filter::Cuisines(list()?)),
        "categories" => Ok(Filter::Categories(list()?)),
        "difficulty" => Ok(Filter::Difficulty(list()?)),
        "required_ingredients" => Ok(Filter::RequiredIngredients(list()?)),
        "excluded_ingredients" => Ok(Filter::ExcludedIngredients(list()?)),
        "author" => Ok(Filter::Author(list()?)),
        "tools" => Ok(Filter::Tools(list()?)),
        "keywords" => Ok(Filter::Keywords(list()?)),
        "meal_type" => Ok(Filter::MealType(list()?)),
        "dietary" => Ok(Filter::Dietary(list()?)),
        "cooking_method" => Ok(Filter::CookingMethod(list()?)),
        "has_image" => value
            .as_bool()
            .map(Filter::HasImage)
            .ok_or_else(|| FilterSyntaxError::WrongType { key: key.to_owned(), expected: "a boolean" }),
        _ => Err(FilterSyntaxError::UnknownKey(key.to_owned())),
    }
}

fn range_key(key: &str) -> Option<(NumericFacet, Bound)> {
    let (bound, name) = if let Some(name) = key.strip_prefix("min_") {
        (Bound::Min, name)
    } else {
        (Bound::Max, key.strip_prefix("max_")?)
    };
    NumericFacet::ALL.into_iter().find(|f| f.name() == name).map(|f| (f, bound))
}

fn bound_value(key: &str, value: &Value, kind: BoundKind) -> Result<f64, FilterSyntaxError> {
    let (parsed, expected) = match kind {
        BoundKind::Number => (value.as_f64(), "a number"),
        BoundKind::Count => (value.as_u64().map(|n| n as f64), "a non-negative integer"),
        BoundKind::Date => (value.as_str().and_then(parse_date).map(|t| t as f64), "an ISO-8601 date"),
    };
    parsed.ok_or_else(|| FilterSyntaxError::WrongType { key: key.to_owned(), expected })
}

fn string_list(key: &str, value: &Value) -> Result<Vec<String>, FilterSyntaxError> {
    let wrong = || FilterSyntaxError::WrongType { key: key.to_owned(), expected: "a list of strings" };
    let items = value.as_array().ok_or_else(wrong)?;
    items
        .iter()
        .map(|v| v.as_str().map(|s| s.trim().to_lowercase()).ok_or_else(wrong))
        .filter(|r| !matches!(r, Ok(s) if s.is_empty()))
        .collect()
}
