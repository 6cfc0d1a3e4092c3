//! Format descriptors ("caps") attached to pads.
//!
//! A [`Caps`] is an ordered set of [`Structure`]s, each naming a media type
//! (`video/x-h264`, `audio/x-raw`, ...) plus typed fields. Caps are immutable
//! once built and cheap to clone.
//!
//! The text form mirrors what the profiles file uses:
//!
//! ```text
//! video/x-raw, width=[1, 1920], framerate=30/1; video/x-h264, stream-format=avc
//! ```

use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid caps {input:?}: {reason}")]
pub struct ParseCapsError {
    input: String,
    reason: String,
}

impl ParseCapsError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Coarse media classification, derived from a structure name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Subtitle,
    Other,
}

impl MediaKind {
    pub fn from_media_type(name: &str) -> Self {
        if name.starts_with("audio/") {
            MediaKind::Audio
        } else if name.starts_with("video/") || name.starts_with("image/") {
            MediaKind::Video
        } else if name.starts_with("text/")
            || name.starts_with("subpicture/")
            || name.contains("subtitle")
            || name == "application/x-ass"
            || name == "application/x-ssa"
        {
            MediaKind::Subtitle
        } else {
            MediaKind::Other
        }
    }

    /// Media type of decoded data for this kind.
    pub fn raw_media_type(self) -> Option<&'static str> {
        match self {
            MediaKind::Audio => Some("audio/x-raw"),
            MediaKind::Video => Some("video/x-raw"),
            MediaKind::Subtitle => Some("text/x-raw"),
            MediaKind::Other => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Subtitle => "subtitle",
            MediaKind::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    /// Inclusive on both ends.
    IntRange(i64, i64),
    Fraction(i32, i32),
    Bool(bool),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    pub fn intersect(&self, other: &Value) -> Option<Value> {
        match (self, other) {
            (Value::List(items), _) => {
                collapse(items.iter().filter_map(|v| v.intersect(other)).collect())
            }
            (_, Value::List(_)) => other.intersect(self),
            (Value::Int(a), Value::Int(b)) => (a == b).then_some(Value::Int(*a)),
            (Value::Int(v), Value::IntRange(lo, hi)) | (Value::IntRange(lo, hi), Value::Int(v)) => {
                (lo <= v && v <= hi).then_some(Value::Int(*v))
            }
            (Value::IntRange(a_lo, a_hi), Value::IntRange(b_lo, b_hi)) => {
                let lo = *a_lo.max(b_lo);
                let hi = *a_hi.min(b_hi);
                match lo.cmp(&hi) {
                    std::cmp::Ordering::Greater => None,
                    std::cmp::Ordering::Equal => Some(Value::Int(lo)),
                    std::cmp::Ordering::Less => Some(Value::IntRange(lo, hi)),
                }
            }
            (Value::Fraction(an, ad), Value::Fraction(bn, bd)) => {
                (*an as i64 * *bd as i64 == *bn as i64 * *ad as i64)
                    .then_some(Value::Fraction(*an, *ad))
            }
            (Value::Bool(a), Value::Bool(b)) => (a == b).then_some(Value::Bool(*a)),
            (Value::Str(a), Value::Str(b)) => (a == b).then(|| Value::Str(a.clone())),
            _ => None,
        }
    }
}

fn collapse(mut values: Vec<Value>) -> Option<Value> {
    match values.len() {
        0 => None,
        1 => values.pop(),
        _ => Some(Value::List(values)),
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::IntRange(lo, hi) => write!(f, "[{}, {}]", lo, hi),
            Value::Fraction(n, d) => write!(f, "{}/{}", n, d),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Str(s) => {
                if is_bare_word(s) {
                    f.write_str(s)
                } else {
                    write!(f, "\"{}\"", s)
                }
            }
            Value::List(items) => {
                f.write_str("{ ")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(" }")
            }
        }
    }
}

// Strings that would re-parse as something else get quoted.
fn is_bare_word(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && s.parse::<i64>().is_err()
        && s != "true"
        && s != "false"
}

#[derive(Clone, Debug, PartialEq)]
pub struct Structure {
    name: String,
    fields: BTreeMap<String, Value>,
}

impl Structure {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn media_kind(&self) -> MediaKind {
        MediaKind::from_media_type(&self.name)
    }

    pub fn is_raw(&self) -> bool {
        self.name.ends_with("/x-raw")
    }

    /// Fields present on only one side are unconstrained by the other.
    pub fn intersect(&self, other: &Structure) -> Option<Structure> {
        if self.name != other.name {
            return None;
        }
        let mut fields = self.fields.clone();
        for (key, value) in &other.fields {
            let merged = match self.fields.get(key) {
                Some(mine) => mine.intersect(value)?,
                None => value.clone(),
            };
            fields.insert(key.clone(), merged);
        }
        Some(Structure {
            name: self.name.clone(),
            fields,
        })
    }

    pub fn can_intersect(&self, other: &Structure) -> bool {
        self.name == other.name
            && self.fields.iter().all(|(key, value)| match other.fields.get(key) {
                Some(theirs) => value.intersect(theirs).is_some(),
                None => true,
            })
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (key, value) in &self.fields {
            write!(f, ", {}={}", key, value)?;
        }
        Ok(())
    }
}

/// Immutable capability set. `Caps::any()` matches everything, an empty caps
/// matches nothing.
#[derive(Clone, Debug, PartialEq)]
pub struct Caps {
    any: bool,
    structures: Arc<[Structure]>,
}

impl Caps {
    pub fn any() -> Self {
        Self {
            any: true,
            structures: Arc::from(Vec::new()),
        }
    }

    pub fn new_empty() -> Self {
        Self {
            any: false,
            structures: Arc::from(Vec::new()),
        }
    }

    /// Caps with a single structure that has no fields.
    pub fn new_simple(media_type: &str) -> Self {
        Self::from_structures(vec![Structure::new(media_type)])
    }

    pub fn from_structures(structures: Vec<Structure>) -> Self {
        Self {
            any: false,
            structures: Arc::from(structures),
        }
    }

    pub fn is_any(&self) -> bool {
        self.any
    }

    pub fn is_empty(&self) -> bool {
        !self.any && self.structures.is_empty()
    }

    pub fn structures(&self) -> &[Structure] {
        &self.structures
    }

    pub fn is_raw(&self) -> bool {
        !self.any && !self.structures.is_empty() && self.structures.iter().all(Structure::is_raw)
    }

    /// Kind of the first structure; `Other` for any/empty caps.
    pub fn media_kind(&self) -> MediaKind {
        self.structures
            .first()
            .map(Structure::media_kind)
            .unwrap_or(MediaKind::Other)
    }

    pub fn can_intersect(&self, other: &Caps) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        if self.any || other.any {
            return true;
        }
        self.structures
            .iter()
            .any(|a| other.structures.iter().any(|b| a.can_intersect(b)))
    }

    pub fn intersect(&self, other: &Caps) -> Caps {
        if self.any {
            return other.clone();
        }
        if other.any {
            return self.clone();
        }
        let mut out = Vec::new();
        for a in self.structures.iter() {
            for b in other.structures.iter() {
                if let Some(s) = a.intersect(b) {
                    if !out.contains(&s) {
                        out.push(s);
                    }
                }
            }
        }
        Caps::from_structures(out)
    }

    /// Appends the structures of `other` that are not already present.
    pub fn merge(&self, other: &Caps) -> Caps {
        if self.any || other.any {
            return Caps::any();
        }
        let mut out = self.structures.to_vec();
        for s in other.structures.iter() {
            if !out.contains(s) {
                out.push(s.clone());
            }
        }
        Caps::from_structures(out)
    }
}

impl From<Structure> for Caps {
    fn from(s: Structure) -> Self {
        Caps::from_structures(vec![s])
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.any {
            return f.write_str("ANY");
        }
        if self.structures.is_empty() {
            return f.write_str("EMPTY");
        }
        for (i, s) in self.structures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", s)?;
        }
        Ok(())
    }
}

impl FromStr for Caps {
    type Err = ParseCapsError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        match trimmed {
            "ANY" => return Ok(Caps::any()),
            "" | "EMPTY" => return Ok(Caps::new_empty()),
            _ => {}
        }
        let mut structures = Vec::new();
        for part in split_top_level(trimmed, ';').map_err(|r| ParseCapsError::new(input, r))? {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            structures.push(parse_structure(part).map_err(|r| ParseCapsError::new(input, r))?);
        }
        Ok(Caps::from_structures(structures))
    }
}

fn parse_structure(text: &str) -> Result<Structure, String> {
    let mut parts = split_top_level(text, ',')?.into_iter();
    let name = parts.next().map(str::trim).unwrap_or_default();
    if name.is_empty() || !name.contains('/') {
        return Err(format!("bad media type {:?}", name));
    }
    let mut structure = Structure::new(name);
    for field in parts {
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| format!("field {:?} has no value", field.trim()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err("empty field name".to_string());
        }
        structure = structure.with_field(key, parse_value(value.trim())?);
    }
    Ok(structure)
}

fn parse_value(text: &str) -> Result<Value, String> {
    // optional "(int)" style cast, only "(string)" changes the outcome
    let (cast, text) = match text.strip_prefix('(').and_then(|t| t.split_once(')')) {
        Some((cast, rest)) => (Some(cast.trim()), rest.trim()),
        None => (None, text),
    };
    if cast == Some("string") || cast == Some("str") {
        return Ok(Value::Str(unquote(text).to_string()));
    }
    if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        let (lo, hi) = inner
            .split_once(',')
            .ok_or_else(|| format!("range {:?} needs two bounds", text))?;
        let lo = lo.trim().parse::<i64>().map_err(|e| e.to_string())?;
        let hi = hi.trim().parse::<i64>().map_err(|e| e.to_string())?;
        if lo > hi {
            return Err(format!("empty range {:?}", text));
        }
        return Ok(Value::IntRange(lo, hi));
    }
    if let Some(inner) = text.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
        let items = split_top_level(inner, ',')?
            .into_iter()
            .map(|item| parse_value(item.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        if items.is_empty() {
            return Err("empty list".to_string());
        }
        return Ok(Value::List(items));
    }
    if text.starts_with('"') {
        return Ok(Value::Str(unquote(text).to_string()));
    }
    match text {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        _ => {}
    }
    if let Ok(v) = text.parse::<i64>() {
        return Ok(Value::Int(v));
    }
    if let Some((n, d)) = text.split_once('/') {
        if let (Ok(n), Ok(d)) = (n.trim().parse::<i32>(), d.trim().parse::<i32>()) {
            if d == 0 {
                return Err(format!("fraction {:?} has zero denominator", text));
            }
            return Ok(Value::Fraction(n, d));
        }
    }
    if text.is_empty() {
        return Err("empty value".to_string());
    }
    Ok(Value::Str(text.to_string()))
}

fn unquote(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
}

/// Splits on `sep` outside of quotes, `[...]` and `{...}`.
fn split_top_level(text: &str, sep: char) -> Result<Vec<&str>, String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '[' | '{' if !quoted => depth += 1,
            ']' | '}' if !quoted => {
                depth -= 1;
                if depth < 0 {
                    return Err(format!("unbalanced {:?}", c));
                }
            }
            c if c == sep && depth == 0 && !quoted => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    if quoted {
        return Err("unterminated quote".to_string());
    }
    if depth != 0 {
        return Err("unbalanced brackets".to_string());
    }
    parts.push(&text[start..]);
    Ok(parts)
}

impl Serialize for Caps {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Caps {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "caps_test.rs"]
mod caps_test;
