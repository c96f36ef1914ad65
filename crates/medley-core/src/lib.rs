//! Normalization of catalog XML element trees into generic value trees.
//!
//! XML has no native notion of whether a field is a scalar, an object or a
//! list; that shape must be inferred from the document. The rules live in
//! [`normalize`]: leaves without attributes collapse to scalars, attributes
//! force object form, and a repeated tag under one parent promotes the field
//! to a list in document order.

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use thiserror::Error;
use tracing::trace;

pub use medley_xml::{Element, ParseOptions, XmlError};

/// Reserved field holding the character data of a leaf once attributes or
/// extra text runs force object form.
pub const VALUE_KEY: &str = "value";

/// Error type produced by normalization.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The supplied document could not be parsed into an element tree.
    #[error("malformed input: {0}")]
    MalformedInput(#[from] XmlError),
    /// An internal shape invariant was broken; callers cannot recover.
    #[error("normalizer contract violated: {0}")]
    ContractViolation(String),
}

/// Normalized XML content: a bare text value, a set of named fields, or
/// repeated occurrences of one field name.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(String),
    Object(Fields),
    List(Vec<Value>),
}

impl Value {
    /// Variant name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "scalar",
            Value::Object(_) => "object",
            Value::List(_) => "list",
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Value::Scalar(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Fields> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Unwrap object shape, failing fast when the value is anything else.
    pub fn into_fields(self) -> Result<Fields, NormalizeError> {
        match self {
            Value::Object(fields) => Ok(fields),
            other => Err(NormalizeError::ContractViolation(format!(
                "expected an object, found {}",
                other.kind()
            ))),
        }
    }
}

/// Insertion-ordered field mapping.
///
/// [`Fields::insert`] is last-write-wins: a repeated name replaces the stored
/// value but keeps its original position. Equality is order-sensitive, so two
/// mappings with the same entries in a different order are not equal.
#[derive(Debug, Clone, Default)]
pub struct Fields {
    inner: IndexMap<String, Value>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.inner.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.inner.get_mut(name)
    }

    /// Insert a field, replacing any previous value under the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.inner.insert(name.into(), value);
    }

    /// Remove a field, preserving the order of the remaining entries.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.inner.shift_remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.inner.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Field names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(String::as_str)
    }
}

impl PartialEq for Fields {
    fn eq(&self, other: &Self) -> bool {
        self.inner.len() == other.inner.len()
            && self
                .inner
                .iter()
                .zip(other.inner.iter())
                .all(|(left, right)| left == right)
    }
}

impl Serialize for Fields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Scalar(text) => serializer.serialize_str(text),
            Value::Object(fields) => fields.serialize(serializer),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

/// Parse a raw XML response body and normalize it in one step.
pub fn parse(xml: &str) -> Result<Fields, NormalizeError> {
    parse_with(xml, &ParseOptions::default())
}

/// Parse a raw XML response body with explicit options.
///
/// Parser failures surface as [`NormalizeError::MalformedInput`] with the
/// underlying error preserved as the cause.
pub fn parse_with(xml: &str, options: &ParseOptions) -> Result<Fields, NormalizeError> {
    let root = medley_xml::parse_with(xml, options)?;
    Ok(normalize(&root))
}

/// Normalize a parsed element tree into a field mapping.
///
/// The root is handled like any branch node: its children become fields and
/// its own attributes fold into the resulting object afterwards. The output
/// is deterministic; byte-identical input yields structurally identical
/// output on every call.
pub fn normalize(root: &Element) -> Fields {
    let mut fields = normalize_children(root);
    fold_attributes(&mut fields, root);
    fields
}

fn normalize_children(node: &Element) -> Fields {
    let mut out = Fields::new();
    for child in &node.children {
        if child.has_children() {
            let mut object = normalize_children(child);
            fold_attributes(&mut object, child);
            accumulate(&mut out, &child.tag, Value::Object(object));
        } else if !child.attributes.is_empty() {
            let mut object = Fields::new();
            for (name, value) in &child.attributes {
                object.insert(name.clone(), Value::Scalar(value.clone()));
            }
            let text = child.text();
            if !text.is_empty() {
                object.insert(VALUE_KEY, Value::Scalar(text));
            }
            accumulate(&mut out, &child.tag, Value::Object(object));
        } else if child.texts.len() > 1 {
            // several character data runs: the first keeps the reserved
            // name, later runs keep their positions
            let mut object = Fields::new();
            for (position, run) in child.texts.iter().enumerate() {
                if position == 0 {
                    object.insert(VALUE_KEY, Value::Scalar(run.clone()));
                } else {
                    object.insert(position.to_string(), Value::Scalar(run.clone()));
                }
            }
            accumulate(&mut out, &child.tag, Value::Object(object));
        } else {
            // bare leaf: terminal scalar, a repeat overwrites instead of
            // accumulating
            let text = child.texts.first().cloned().unwrap_or_default();
            out.insert(child.tag.clone(), Value::Scalar(text));
        }
    }
    out
}

// Attributes fold in after child-derived fields; on a name collision the
// attribute wins.
fn fold_attributes(fields: &mut Fields, element: &Element) {
    for (name, value) in &element.attributes {
        fields.insert(name.clone(), Value::Scalar(value.clone()));
    }
}

/// Store `value` under `tag`. The first occurrence keeps its bare shape; a
/// repeated occurrence promotes the existing entry to a list in place and
/// appends in document order.
fn accumulate(fields: &mut Fields, tag: &str, value: Value) {
    match fields.get_mut(tag) {
        Some(Value::List(items)) => items.push(value),
        Some(existing) => {
            trace!(tag, "repeated element, promoting field to list");
            let first = std::mem::replace(existing, Value::List(Vec::with_capacity(2)));
            if let Value::List(items) = existing {
                items.push(first);
                items.push(value);
            }
        }
        None => fields.insert(tag, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CATALOG_FIXTURE: &str = r#"
        <ContentTypes date="2016-02-01">
            <ContentType ID="67">Polyphonic</ContentType>
            <ContentType ID="68">Truetone</ContentType>
            <Count>2</Count>
        </ContentTypes>
    "#;

    #[test]
    fn normalization_is_deterministic() {
        let first = parse(CATALOG_FIXTURE).expect("parse fixture");
        let second = parse(CATALOG_FIXTURE).expect("parse fixture again");
        assert_eq!(first, second);
    }

    #[test]
    fn scalar_collapse() {
        let fields = parse("<Doc><Age>42</Age></Doc>").expect("parse");
        assert_eq!(fields.get("Age"), Some(&Value::Scalar("42".into())));
    }

    #[test]
    fn empty_leaf_collapses_to_empty_scalar() {
        let fields = parse("<Doc><Age/></Doc>").expect("parse");
        assert_eq!(fields.get("Age"), Some(&Value::Scalar(String::new())));
    }

    #[test]
    fn attribute_folding_forces_object_form() {
        let fields = parse(r#"<Doc><Item id="7">Name</Item></Doc>"#).expect("parse");
        let item = fields.get("Item").and_then(Value::as_object).expect("object");
        assert_eq!(item.get("id"), Some(&Value::Scalar("7".into())));
        assert_eq!(item.get(VALUE_KEY), Some(&Value::Scalar("Name".into())));
        let names: Vec<&str> = item.names().collect();
        assert_eq!(names, ["id", VALUE_KEY], "text lands after the attributes");
    }

    #[test]
    fn attributed_leaf_without_text_stays_an_object() {
        let fields = parse(r#"<Doc><Item id="7"/></Doc>"#).expect("parse");
        let item = fields.get("Item").and_then(Value::as_object).expect("object");
        assert_eq!(item.len(), 1);
        assert!(!item.contains(VALUE_KEY));
    }

    #[test]
    fn single_branch_collapses_to_bare_object() {
        let fields = parse("<A><B><C>1</C></B></A>").expect("parse");
        let b = fields.get("B").expect("field B");
        let object = b.as_object().expect("bare object, not a one-element list");
        assert_eq!(object.get("C"), Some(&Value::Scalar("1".into())));
    }

    #[test]
    fn repeated_tags_accumulate_into_a_list() {
        // Policy under test: repetition of the tag decides list shape. The
        // first occurrence stays bare until a second one arrives, at which
        // point the field becomes a list holding every occurrence in
        // document order.
        let fields = parse("<A><B><C>1</C></B><B><C>2</C></B></A>").expect("parse");
        let items = fields.get("B").and_then(Value::as_list).expect("list");
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].as_object().and_then(|o| o.get("C")),
            Some(&Value::Scalar("1".into()))
        );
        assert_eq!(
            items[1].as_object().and_then(|o| o.get("C")),
            Some(&Value::Scalar("2".into()))
        );
    }

    #[test]
    fn repeated_attributed_leaves_accumulate() {
        let fields = parse(CATALOG_FIXTURE).expect("parse fixture");
        let types = fields.get("ContentType").and_then(Value::as_list).expect("list");
        assert_eq!(types.len(), 2);
        let first = types[0].as_object().expect("object");
        assert_eq!(first.get("ID"), Some(&Value::Scalar("67".into())));
        assert_eq!(first.get(VALUE_KEY), Some(&Value::Scalar("Polyphonic".into())));
        assert_eq!(fields.get("Count"), Some(&Value::Scalar("2".into())));
    }

    #[test]
    fn bare_scalar_leaves_are_terminal() {
        // A leaf without attributes never joins a list; the last occurrence
        // wins.
        let fields = parse("<A><X>1</X><X>2</X></A>").expect("parse");
        assert_eq!(fields.get("X"), Some(&Value::Scalar("2".into())));
    }

    #[test]
    fn root_attributes_fold_into_top_level_object() {
        let fields = parse(CATALOG_FIXTURE).expect("parse fixture");
        assert_eq!(fields.get("date"), Some(&Value::Scalar("2016-02-01".into())));
    }

    #[test]
    fn branch_attribute_shadows_child_field() {
        let fields =
            parse(r#"<Doc><B name="attr"><name>child</name><x>1</x></B></Doc>"#).expect("parse");
        let b = fields.get("B").and_then(Value::as_object).expect("object");
        assert_eq!(b.get("name"), Some(&Value::Scalar("attr".into())));
        assert_eq!(b.get("x"), Some(&Value::Scalar("1".into())));
    }

    #[test]
    fn split_text_runs_keep_positions_behind_the_value_key() {
        let fields = parse("<Doc><Note>one<!-- cut -->two</Note></Doc>").expect("parse");
        let note = fields.get("Note").and_then(Value::as_object).expect("object");
        assert_eq!(note.get(VALUE_KEY), Some(&Value::Scalar("one".into())));
        assert_eq!(note.get("1"), Some(&Value::Scalar("two".into())));
    }

    #[test]
    fn malformed_markup_keeps_the_parser_cause() {
        let err = parse("<a><b></a>").unwrap_err();
        let NormalizeError::MalformedInput(cause) = &err else {
            panic!("expected MalformedInput, got {err:?}");
        };
        assert!(matches!(cause, XmlError::Syntax(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn depth_bound_propagates() {
        let options = ParseOptions { max_depth: Some(2) };
        let err = parse_with("<a><b><c>1</c></b></a>", &options).unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::MalformedInput(XmlError::TooDeep(2))
        ));
    }

    #[test]
    fn into_fields_rejects_non_objects() {
        let err = Value::Scalar("1".into()).into_fields().unwrap_err();
        assert!(matches!(err, NormalizeError::ContractViolation(_)));
        assert!(Value::Object(Fields::new()).into_fields().is_ok());
    }

    #[test]
    fn field_equality_is_order_sensitive() {
        let mut left = Fields::new();
        left.insert("a", Value::Scalar("1".into()));
        left.insert("b", Value::Scalar("2".into()));
        let mut right = Fields::new();
        right.insert("b", Value::Scalar("2".into()));
        right.insert("a", Value::Scalar("1".into()));
        assert_ne!(left, right);
    }

    #[test]
    fn insert_is_last_write_wins_in_place() {
        let mut fields = Fields::new();
        fields.insert("a", Value::Scalar("1".into()));
        fields.insert("b", Value::Scalar("2".into()));
        fields.insert("a", Value::Scalar("3".into()));
        assert_eq!(fields.get("a"), Some(&Value::Scalar("3".into())));
        let names: Vec<&str> = fields.names().collect();
        assert_eq!(names, ["a", "b"], "replaced field keeps its position");
    }

    #[test]
    fn values_serialize_like_json_trees() {
        let fields = parse(CATALOG_FIXTURE).expect("parse fixture");
        let encoded = serde_json::to_value(&fields).expect("serialize");
        assert_eq!(
            encoded,
            json!({
                "ContentType": [
                    {"ID": "67", "value": "Polyphonic"},
                    {"ID": "68", "value": "Truetone"},
                ],
                "Count": "2",
                "date": "2016-02-01",
            })
        );
    }
}
