// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Enhanced monitoring payload, decoded into a tree walked by the enhanced collector.
//!
//! The upstream document grows new sections and fields over time, so nothing here is tied to a
//! fixed schema: unknown keys simply become nodes nobody asks for.

use std::collections::BTreeMap;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A numeric field
    Leaf(f64),
    Text(String),
    Section(BTreeMap<String, Node>),
    List(Vec<Node>),
    /// `null` and booleans carry no metric value
    Ignored,
}

impl Node {
    /// Decodes a payload. The document root must be an object.
    pub fn parse(message: &str) -> Result<Node, String> {
        let value: Value = serde_json::from_str(message).map_err(|e| e.to_string())?;
        match Node::from(value) {
            node @ Node::Section(_) => Ok(node),
            _ => Err("payload root is not an object".to_string()),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Section(fields) => fields.get(key),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Node::Leaf(value) if value.is_finite() => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(entries) => Some(entries),
            _ => None,
        }
    }

    /// Renders an identity field as a label value. Integral numbers print without a fraction,
    /// so a pid of `42` becomes `"42"`.
    pub fn as_label(&self) -> Option<String> {
        match self {
            Node::Text(text) if !text.is_empty() => Some(text.clone()),
            Node::Leaf(value) if value.is_finite() => Some(value.to_string()),
            _ => None,
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::Number(number) => number.as_f64().map_or(Node::Ignored, Node::Leaf),
            Value::String(text) => Node::Text(text),
            Value::Object(fields) => Node::Section(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, Node::from(value)))
                    .collect(),
            ),
            Value::Array(entries) => Node::List(entries.into_iter().map(Node::from).collect()),
            Value::Null | Value::Bool(_) => Node::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tree() {
        let node = Node::parse(
            r#"{"engine":"POSTGRES","numVCPUs":2,"memory":{"free":10.5},"network":[{"interface":"eth0","rx":1}],"uptime":null}"#,
        )
        .unwrap();
        assert_eq!(node.get("numVCPUs").and_then(Node::as_f64), Some(2.0));
        assert_eq!(
            node.get("memory").and_then(|m| m.get("free")).and_then(Node::as_f64),
            Some(10.5)
        );
        assert_eq!(node.get("engine").and_then(Node::as_str), Some("POSTGRES"));
        assert_eq!(node.get("uptime"), Some(&Node::Ignored));
        assert_eq!(node.get("network").and_then(Node::as_list).map(|l| l.len()), Some(1));
        assert!(node.get("missing").is_none());
    }

    #[test]
    fn test_root_must_be_object() {
        assert!(Node::parse("[1,2]").is_err());
        assert!(Node::parse("42").is_err());
        assert!(Node::parse("{not json").is_err());
    }

    #[test]
    fn test_as_label() {
        assert_eq!(Node::Leaf(42.0).as_label().as_deref(), Some("42"));
        assert_eq!(Node::Leaf(1.5).as_label().as_deref(), Some("1.5"));
        assert_eq!(Node::Text("sda".into()).as_label().as_deref(), Some("sda"));
        assert_eq!(Node::Text(String::new()).as_label(), None);
        assert_eq!(Node::Ignored.as_label(), None);
    }

    #[test]
    fn test_text_is_not_a_value() {
        assert_eq!(Node::Text("1".into()).as_f64(), None);
        assert_eq!(Node::Section(BTreeMap::new()).as_f64(), None);
    }
}
