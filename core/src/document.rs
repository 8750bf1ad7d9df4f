//! Upstream recipe documents and their structured facets.
//!
//! Decoding is lenient: a malformed field degrades to empty and is reported as a
//! [`ParseSkip`]; only a record without an id is dropped.

use crate::error::{InputError, ParseSkip};
use crate::index::Field;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};
use walkdir::WalkDir;

lazy_static! {
    static ref LEADING_NUMBER: Regex = Regex::new(r"^\s*(-?\d+(?:\.\d+)?)").expect("valid regex");
    static ref ANY_NUMBER: Regex = Regex::new(r"\d+(?:\.\d+)?").expect("valid regex");
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Nutrition {
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub fiber: Option<f64>,
    pub sugar: Option<f64>,
    pub sodium: Option<f64>,
}

/// Structured attributes used for filtering and display, never for ranking.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Facets {
    pub total_minutes: Option<f64>,
    pub prep_minutes: Option<f64>,
    pub cook_minutes: Option<f64>,
    pub rating: Option<f64>,
    pub review_count: Option<u64>,
    pub nutrition: Nutrition,
    pub cuisines: Vec<String>,
    pub categories: Vec<String>,
    /// Lowercased, whitespace-collapsed ingredient lines.
    pub ingredients: Vec<String>,
    pub difficulty: Option<String>,
    pub author: Option<String>,
    pub tools: Vec<String>,
    pub keywords: Vec<String>,
    /// First number in the recipe yield, e.g. 12 for "12 cookies".
    pub yield_amount: Option<f64>,
    pub instruction_count: u32,
    pub has_image: bool,
    /// Publication time as unix seconds (UTC).
    pub published_at: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub id: String,
    pub url: Option<String>,
    pub title: String,
    pub description: String,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    pub facets: Facets,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self { id: id.into(), title: title.into(), ..Self::default() }
    }

    pub fn with_ingredients<I, S>(mut self, ingredients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ingredients = ingredients.into_iter().map(Into::into).collect();
        self.facets.ingredients = normalize_ingredients(&self.ingredients);
        self
    }

    pub fn with_instructions<I, S>(mut self, instructions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instructions = instructions.into_iter().map(Into::into).collect();
        self.facets.instruction_count = self.instructions.len() as u32;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Replace the facets, keeping the ingredient list and instruction count
    /// derived from the document's own fields.
    pub fn with_facets(mut self, facets: Facets) -> Self {
        let ingredients = std::mem::take(&mut self.facets.ingredients);
        let instruction_count = self.facets.instruction_count;
        self.facets = Facets { ingredients, instruction_count, ..facets };
        self
    }

    /// Raw text of a document field. `Entities` is synthesized by the builder, not stored here.
    pub fn text(&self, field: Field) -> Cow<'_, str> {
        match field {
            Field::Title => Cow::Borrowed(&self.title),
            Field::Ingredients => Cow::Owned(self.ingredients.join(" ")),
            Field::Instructions => Cow::Owned(self.instructions.join(" ")),
            Field::Entities => Cow::Borrowed(""),
        }
    }
}

pub fn normalize_ingredients(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
        .filter(|l| !l.is_empty())
        .collect()
}

/// A decoded document together with the fields that had to be dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub document: Document,
    pub skipped: Vec<ParseSkip>,
}

/// Decode one upstream recipe record.
pub fn parse_document(value: &Value) -> Result<ParsedDocument, ParseSkip> {
    let obj = value
        .as_object()
        .ok_or_else(|| ParseSkip::document(None, "record is not a JSON object"))?;
    let id = match obj.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_owned(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(ParseSkip::document(None, "missing id")),
    };

    let mut p = FieldParser { id: &id, skipped: Vec::new() };
    let title = p.text(obj, "title");
    let description = p.text(obj, "description");
    let url = Some(p.text(obj, "url")).filter(|u| !u.is_empty());
    let ingredients = p.text_list(obj, "ingredients");
    let instructions = p.text_list(obj, "instructions");

    let times = p.object(obj, "times");
    let ratings = obj.get("ratings");
    let (rating, review_count) = match ratings {
        Some(Value::Object(r)) => (
            p.number_any(r, &["average", "rating", "score"], "ratings"),
            p.number_any(r, &["review_count", "count"], "ratings.review_count")
                .map(|c| c.max(0.0) as u64),
        ),
        Some(Value::Null) | None => (None, None),
        Some(v) => (p.number_value(v, "ratings"), None),
    };
    let nutrition = p.object(obj, "nutrition");
    let nutrition = Nutrition {
        calories: p.number_any(&nutrition, &["calories"], "nutrition.calories"),
        protein: p.number_any(&nutrition, &["protein"], "nutrition.protein"),
        carbs: p.number_any(&nutrition, &["carbs", "carbohydrates"], "nutrition.carbs"),
        fat: p.number_any(&nutrition, &["fat"], "nutrition.fat"),
        fiber: p.number_any(&nutrition, &["fiber"], "nutrition.fiber"),
        sugar: p.number_any(&nutrition, &["sugar"], "nutrition.sugar"),
        sodium: p.number_any(&nutrition, &["sodium"], "nutrition.sodium"),
    };

    let facets = Facets {
        total_minutes: p.number_any(&times, &["total"], "times.total"),
        prep_minutes: p.number_any(&times, &["prep"], "times.prep"),
        cook_minutes: p.number_any(&times, &["cook"], "times.cook"),
        rating,
        review_count,
        nutrition,
        cuisines: p.text_list(obj, "cuisine"),
        categories: p.text_list(obj, "category"),
        ingredients: normalize_ingredients(&ingredients),
        difficulty: Some(p.text(obj, "difficulty")).filter(|d| !d.is_empty()),
        author: p.author(obj),
        tools: p.text_list(obj, "tools"),
        keywords: p.keywords(obj),
        yield_amount: p.yield_amount(obj),
        instruction_count: instructions.len() as u32,
        has_image: p.has_image(obj),
        published_at: p.date(obj, &["date_published", "publication_date"]),
    };

    let document = Document { id: id.clone(), url, title, description, ingredients, instructions, facets };
    Ok(ParsedDocument { document, skipped: p.skipped })
}

struct FieldParser<'a> {
    id: &'a str,
    skipped: Vec<ParseSkip>,
}

impl FieldParser<'_> {
    fn skip(&mut self, field: &str, reason: &str) {
        tracing::warn!(doc_id = self.id, field, reason, "malformed field, using empty value");
        self.skipped.push(ParseSkip::field(self.id, field, reason));
    }

    fn text(&mut self, obj: &Map<String, Value>, key: &str) -> String {
        match obj.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.trim().to_owned(),
            Some(_) => {
                self.skip(key, "expected a string");
                String::new()
            }
        }
    }

    fn text_list(&mut self, obj: &Map<String, Value>, key: &str) -> Vec<String> {
        match obj.get(key) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(s)) if s.trim().is_empty() => Vec::new(),
            Some(Value::String(s)) => vec![s.trim().to_owned()],
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) if !s.trim().is_empty() => out.push(s.trim().to_owned()),
                        Value::String(_) | Value::Null => {}
                        _ => self.skip(key, "list item is not a string"),
                    }
                }
                out
            }
            Some(_) => {
                self.skip(key, "expected a string or a list of strings");
                Vec::new()
            }
        }
    }

    fn object(&mut self, obj: &Map<String, Value>, key: &str) -> Map<String, Value> {
        match obj.get(key) {
            Some(Value::Object(m)) => m.clone(),
            None | Some(Value::Null) => Map::new(),
            Some(_) => {
                self.skip(key, "expected an object");
                Map::new()
            }
        }
    }

    /// First present key wins.
    fn number_any(&mut self, obj: &Map<String, Value>, keys: &[&str], field: &str) -> Option<f64> {
        let value = keys.iter().find_map(|k| obj.get(*k).filter(|v| !v.is_null()))?;
        self.number_value(value, field)
    }

    fn number_value(&mut self, value: &Value, field: &str) -> Option<f64> {
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) if s.trim().is_empty() => return None,
            Value::String(s) => leading_number(s),
            _ => None,
        };
        match parsed {
            Some(n) if n.is_finite() => Some(n),
            _ => {
                self.skip(field, "expected a number");
                None
            }
        }
    }

    /// A plain string, or a schema.org person object with a `name`.
    fn author(&mut self, obj: &Map<String, Value>) -> Option<String> {
        let name = match obj.get("author") {
            Some(Value::Object(person)) => match person.get("name") {
                Some(Value::String(s)) => s.trim().to_owned(),
                _ => String::new(),
            },
            _ => self.text(obj, "author"),
        };
        Some(name).filter(|n| !n.is_empty())
    }

    /// A list, or one comma-separated string.
    fn keywords(&mut self, obj: &Map<String, Value>) -> Vec<String> {
        match obj.get("keywords") {
            Some(Value::String(s)) => s.split(',').map(str::trim).filter(|k| !k.is_empty()).map(str::to_owned).collect(),
            _ => self.text_list(obj, "keywords"),
        }
    }

    fn yield_amount(&mut self, obj: &Map<String, Value>) -> Option<f64> {
        let parsed = match obj.get("yield")? {
            Value::Null => return None,
            Value::Number(n) => n.as_f64(),
            Value::String(s) if s.trim().is_empty() => return None,
            Value::String(s) => first_number(s),
            Value::Array(items) => items.iter().find_map(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => first_number(s),
                _ => None,
            }),
            _ => None,
        };
        if parsed.is_none() {
            self.skip("yield", "no number in yield");
        }
        parsed
    }

    fn has_image(&mut self, obj: &Map<String, Value>) -> bool {
        match obj.get("image") {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(o)) => o.get("url").and_then(Value::as_str).is_some_and(|u| !u.trim().is_empty()),
            Some(_) => {
                self.skip("image", "expected a URL, list or image object");
                false
            }
        }
    }

    /// First present key wins.
    fn date(&mut self, obj: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
        let (key, value) = keys.iter().find_map(|k| obj.get(*k).filter(|v| !v.is_null()).map(|v| (*k, v)))?;
        match value {
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => {
                let parsed = parse_date(s);
                if parsed.is_none() {
                    self.skip(key, "unrecognised date");
                }
                parsed
            }
            _ => {
                self.skip(key, "expected a date string");
                None
            }
        }
    }
}

/// RFC 3339 timestamps, `YYYY-MM-DDTHH:MM:SS` (taken as UTC) or plain dates
/// (midnight UTC), as unix seconds.
pub fn parse_date(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(t) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(t.unix_timestamp());
    }
    if let Ok(t) = PrimitiveDateTime::parse(s, format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]")) {
        return Some(t.assume_utc().unix_timestamp());
    }
    let date = s.get(..10).unwrap_or(s);
    Date::parse(date, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|d| d.midnight().assume_utc().unix_timestamp())
}

/// `"12.5 g"` -> 12.5
fn leading_number(s: &str) -> Option<f64> {
    LEADING_NUMBER.captures(s).and_then(|c| c[1].parse().ok())
}

/// `"Makes 12 cookies"` -> 12
fn first_number(s: &str) -> Option<f64> {
    ANY_NUMBER.find(s).and_then(|m| m.as_str().parse().ok())
}

/// Documents read from upstream files plus everything that was skipped along the way.
#[derive(Debug, Default)]
pub struct Ingest {
    pub documents: Vec<Document>,
    pub skipped: Vec<ParseSkip>,
}

/// Read documents from a `.jsonl`/`.json` file or a directory of them (walked in sorted order).
pub fn read_documents(path: &Path) -> Result<Ingest, InputError> {
    let mut files: Vec<PathBuf> = Vec::new();
    if path.is_dir() {
        for entry in WalkDir::new(path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else if path.is_file() {
        files.push(path.to_path_buf());
    } else {
        return Err(InputError::Missing(path.to_path_buf()));
    }

    let mut ingest = Ingest::default();
    for file in files {
        let io_err = |source| InputError::Io { path: file.clone(), source };
        let f = File::open(&file).map_err(io_err)?;
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            for (line_num, line) in BufReader::new(f).lines().enumerate() {
                let line = line.map_err(io_err)?;
                if line.trim().is_empty() { continue; }
                match serde_json::from_str::<Value>(&line) {
                    Ok(v) => ingest.push(parse_document(&v)),
                    Err(e) => ingest.push(Err(ParseSkip::document(None, format!("{}:{}: {e}", file.display(), line_num + 1)))),
                }
            }
        } else {
            match serde_json::from_reader::<_, Value>(BufReader::new(f)) {
                Ok(Value::Array(arr)) => arr.iter().for_each(|v| ingest.push(parse_document(v))),
                Ok(v) => ingest.push(parse_document(&v)),
                Err(e) => ingest.push(Err(ParseSkip::document(None, format!("{}: {e}", file.display())))),
            }
        }
    }
    tracing::info!(documents = ingest.documents.len(), skipped = ingest.skipped.len(), "read input documents");
    Ok(ingest)
}

impl Ingest {
    fn push(&mut self, parsed: Result<ParsedDocument, ParseSkip>) {
        match parsed {
            Ok(p) => {
                self.skipped.extend(p.skipped);
                self.documents.push(p.document);
            }
            Err(skip) => {
                tracing::warn!(%skip, "skipping record");
                self.skipped.push(skip);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_full_record() {
        let v = json!({
            "id": "r1",
            "url": "https://example.com/r1",
            "title": " Garlic Chicken ",
            "ingredients": ["2  Chicken Breasts", "1 clove garlic"],
            "instructions": "Fry it.",
            "times": {"prep": 10, "cook": "25 min", "total": 35},
            "ratings": {"average": "4.5", "count": 12},
            "nutrition": {"calories": "350 kcal", "carbohydrates": 20},
            "cuisine": ["Italian"],
            "category": "Dinner"
        });
        let p = parse_document(&v).unwrap();
        assert!(p.skipped.is_empty());
        let d = p.document;
        assert_eq!(d.title, "Garlic Chicken");
        assert_eq!(d.instructions, vec!["Fry it."]);
        assert_eq!(d.facets.ingredients, vec!["2 chicken breasts", "1 clove garlic"]);
        assert_eq!(d.facets.cook_minutes, Some(25.0));
        assert_eq!(d.facets.rating, Some(4.5));
        assert_eq!(d.facets.review_count, Some(12));
        assert_eq!(d.facets.nutrition.calories, Some(350.0));
        assert_eq!(d.facets.nutrition.carbs, Some(20.0));
        assert_eq!(d.facets.categories, vec!["Dinner"]);
    }

    #[test]
    fn parses_secondary_facets() {
        let v = json!({
            "id": "r3",
            "title": "Stir Fry",
            "description": "A quick weeknight dinner.",
            "instructions": ["Chop.", "Fry.", "Serve."],
            "author": {"@type": "Person", "name": "Jane Doe"},
            "tools": ["Wok", "knife"],
            "keywords": "quick, easy ,, vegan",
            "yield": "Serves 4 people",
            "image": {"url": "https://example.com/a.jpg"},
            "date_published": "2021-03-04T10:00:00Z"
        });
        let p = parse_document(&v).unwrap();
        assert!(p.skipped.is_empty());
        let d = p.document;
        assert_eq!(d.description, "A quick weeknight dinner.");
        assert_eq!(d.facets.author.as_deref(), Some("Jane Doe"));
        assert_eq!(d.facets.tools, vec!["Wok", "knife"]);
        assert_eq!(d.facets.keywords, vec!["quick", "easy", "vegan"]);
        assert_eq!(d.facets.yield_amount, Some(4.0));
        assert_eq!(d.facets.instruction_count, 3);
        assert!(d.facets.has_image);
        assert_eq!(d.facets.published_at, parse_date("2021-03-04T10:00:00+00:00"));
    }

    #[test]
    fn date_formats() {
        assert_eq!(parse_date("1970-01-02"), Some(86_400));
        assert_eq!(parse_date("1970-01-01T01:00:00"), Some(3_600));
        assert_eq!(parse_date("1970-01-01T00:00:00-01:00"), Some(3_600));
        assert_eq!(parse_date("last tuesday"), None);

        let p = parse_document(&json!({"id": "r4", "date_published": "soon", "yield": "a few"})).unwrap();
        assert_eq!(p.document.facets.published_at, None);
        assert_eq!(p.document.facets.yield_amount, None);
        assert_eq!(p.skipped.len(), 2);
    }

    #[test]
    fn malformed_fields_degrade_to_empty() {
        let v = json!({"id": "r2", "title": 42, "ingredients": {"a": 1}, "nutrition": {"fat": "lots"}});
        let p = parse_document(&v).unwrap();
        assert_eq!(p.document.title, "");
        assert!(p.document.ingredients.is_empty());
        assert_eq!(p.document.facets.nutrition.fat, None);
        let fields: Vec<_> = p.skipped.iter().map(|s| s.field.as_str()).collect();
        assert_eq!(fields, vec!["title", "ingredients", "nutrition.fat"]);
    }

    #[test]
    fn missing_id_skips_document() {
        let err = parse_document(&json!({"title": "No id"})).unwrap_err();
        assert_eq!(err.field, "document");
        assert!(parse_document(&json!(["not", "an", "object"])).is_err());
    }

    #[test]
    fn reads_jsonl_and_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recipes.jsonl");
        std::fs::write(&path, "{\"id\":\"a\",\"title\":\"Soup\"}\nnot json\n\n{\"title\":\"no id\"}\n").unwrap();
        let ingest = read_documents(&path).unwrap();
        assert_eq!(ingest.documents.len(), 1);
        assert_eq!(ingest.skipped.len(), 2);
        assert!(matches!(read_documents(&dir.path().join("missing")), Err(InputError::Missing(_))));
    }
}
