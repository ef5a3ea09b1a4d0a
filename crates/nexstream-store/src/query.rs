//! Query descriptions evaluated by the store.
//!
//! A [`Query`] is a plain value: collection name, at most one equality
//! filter, one ordering field, and a result limit. The client derives one
//! query per logical stream and never composes anything richer, so the
//! surface stays deliberately small.

use std::cmp::Ordering;

use serde_json::Value;

use crate::models::Document;

/// Sort direction for the ordering field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Equality filter on a single document field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub equals: Value,
}

/// An ordered, filtered, limited read over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filter: Option<Filter>,
    pub order_field: String,
    pub direction: Direction,
    pub limit: u32,
}

impl Query {
    /// Start a query over `collection`, ordered by `created_at` descending
    /// with no filter. Callers refine with the builder methods below.
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filter: None,
            order_field: "created_at".to_string(),
            direction: Direction::Descending,
            limit: u32::MAX,
        }
    }

    /// Keep only documents whose `field` equals `value`.
    pub fn filter_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter = Some(Filter {
            field: field.into(),
            equals: value.into(),
        });
        self
    }

    /// Order by `field` descending.
    pub fn order_desc(mut self, field: impl Into<String>) -> Self {
        self.order_field = field.into();
        self.direction = Direction::Descending;
        self
    }

    /// Order by `field` ascending.
    pub fn order_asc(mut self, field: impl Into<String>) -> Self {
        self.order_field = field.into();
        self.direction = Direction::Ascending;
        self
    }

    /// Cap the snapshot at `limit` documents.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Whether `doc` passes the filter (if any).
    pub fn matches(&self, doc: &Document) -> bool {
        match &self.filter {
            Some(f) => doc.get(&f.field) == Some(&f.equals),
            None => true,
        }
    }

    /// Evaluate the query against a full collection, producing the
    /// snapshot the store pushes to subscribers. The sort is stable, so
    /// insertion order breaks ties deterministically.
    pub fn evaluate(&self, docs: &[Document]) -> Vec<Document> {
        let mut hits: Vec<Document> = docs.iter().filter(|d| self.matches(d)).cloned().collect();
        hits.sort_by(|a, b| {
            let ord = value_cmp(a.get(&self.order_field), b.get(&self.order_field));
            match self.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        });
        hits.truncate(self.limit as usize);
        hits
    }
}

/// Total order over the JSON values the store sorts on.
///
/// Numbers compare numerically, strings lexically (RFC 3339 timestamps
/// sort correctly this way), and a missing field sorts before everything
/// present.
fn value_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                let x = x.as_f64().unwrap_or(0.0);
                let y = y.as_f64().unwrap_or(0.0);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => Ordering::Equal,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(pairs: &[(&str, Value)]) -> Document {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn orders_descending_and_limits() {
        let docs = vec![
            doc(&[("id", json!("a")), ("views", json!(5))]),
            doc(&[("id", json!("b")), ("views", json!(9))]),
            doc(&[("id", json!("c")), ("views", json!(1))]),
        ];
        let q = Query::collection("videos").order_desc("views").limit(2);
        let out = q.evaluate(&docs);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("id"), Some(&json!("b")));
        assert_eq!(out[1].get("id"), Some(&json!("a")));
    }

    #[test]
    fn equality_filter_selects_subset() {
        let docs = vec![
            doc(&[("id", json!("a")), ("uploader_id", json!("u1"))]),
            doc(&[("id", json!("b")), ("uploader_id", json!("u2"))]),
        ];
        let q = Query::collection("videos").filter_eq("uploader_id", "u1");
        let out = q.evaluate(&docs);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("id"), Some(&json!("a")));
    }

    #[test]
    fn missing_order_field_sorts_last_when_descending() {
        let docs = vec![
            doc(&[("id", json!("a"))]),
            doc(&[("id", json!("b")), ("views", json!(3))]),
        ];
        let q = Query::collection("videos").order_desc("views");
        let out = q.evaluate(&docs);
        assert_eq!(out[0].get("id"), Some(&json!("b")));
    }
}
