//! Decoding of device response bodies: ISAPI XML documents and Dahua `key=value` text.

use crate::error::{CameraError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;

/// Collects every leaf element of an XML document as `local name -> text`.
/// Later duplicates overwrite earlier ones.
pub fn xml_fields(xml: &str) -> Result<BTreeMap<String, String>> {
    let mut fields = BTreeMap::new();
    walk_xml(xml, |name, text| {
        fields.insert(name.to_string(), text);
    })?;
    Ok(fields)
}

/// Collects the leaf fields found under each `record_tag` element.
pub fn xml_records(xml: &str, record_tag: &str) -> Result<Vec<BTreeMap<String, String>>> {
    let mut records = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut current: Option<BTreeMap<String, String>> = None;
    let mut stack: Vec<String> = Vec::new();
    let mut text: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == record_tag {
                    current = Some(BTreeMap::new());
                }
                stack.push(name);
                text = None;
            }
            Ok(Event::Text(t)) => {
                let value = t
                    .unescape()
                    .map_err(|e| CameraError::invalid_response(format!("malformed xml text: {}", e)))?;
                text = Some(value.into_owned());
            }
            Ok(Event::End(_)) => {
                let name = stack.pop().unwrap_or_default();
                if name == record_tag {
                    if let Some(record) = current.take() {
                        records.push(record);
                    }
                } else if let (Some(record), Some(value)) = (current.as_mut(), text.take()) {
                    record.insert(name, value);
                }
                text = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(CameraError::invalid_response(format!(
                    "malformed xml at {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(records)
}

fn walk_xml(xml: &str, mut on_leaf: impl FnMut(&str, String)) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut text: Option<String> = None;
    let mut saw_element = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                saw_element = true;
                stack.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                text = None;
            }
            Ok(Event::Empty(_)) => saw_element = true,
            Ok(Event::Text(t)) => {
                let value = t
                    .unescape()
                    .map_err(|e| CameraError::invalid_response(format!("malformed xml text: {}", e)))?;
                text = Some(value.into_owned());
            }
            Ok(Event::End(_)) => {
                let name = stack.pop().unwrap_or_default();
                if let Some(value) = text.take() {
                    on_leaf(&name, value);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(CameraError::invalid_response(format!(
                    "malformed xml at {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    if !saw_element {
        return Err(CameraError::invalid_response("expected an xml document"));
    }
    Ok(())
}

/// Parses CGI `key=value` lines. Blank lines and lines without `=` are skipped.
pub fn key_values(body: &str) -> BTreeMap<String, String> {
    body.lines()
        .filter_map(|line| {
            let (key, value) = line.trim().split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Groups `items[N].Field=value` entries into one map per index, in index order.
pub fn indexed_items(fields: &BTreeMap<String, String>, prefix: &str) -> Vec<BTreeMap<String, String>> {
    let mut items: BTreeMap<usize, BTreeMap<String, String>> = BTreeMap::new();
    let open = format!("{}[", prefix);

    for (key, value) in fields {
        let Some(rest) = key.strip_prefix(&open) else {
            continue;
        };
        let Some((index, field)) = rest.split_once("].") else {
            continue;
        };
        let Ok(index) = index.parse::<usize>() else {
            continue;
        };
        items
            .entry(index)
            .or_default()
            .insert(field.to_string(), value.clone());
    }

    items.into_values().collect()
}
