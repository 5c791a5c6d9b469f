//! Tolerant lookups into schema-less JSON documents.
//!
//! An absent key and a key holding the wrong JSON type are the same thing to
//! callers: both come back as `None`.

use serde_json::Value;

/// Walks `path` through nested objects.
pub fn at<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(doc, |current, key| current.as_object()?.get(*key))
}

pub fn f64_at(doc: &Value, path: &[&str]) -> Option<f64> {
    at(doc, path)?.as_f64().filter(|v| v.is_finite())
}

pub fn bool_at(doc: &Value, path: &[&str]) -> Option<bool> {
    at(doc, path)?.as_bool()
}

pub fn str_at<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a str> {
    at(doc, path)?.as_str()
}
