//! Target encoding profiles.
//!
//! A profile names an optional container format and the streams it carries.
//! Profiles are plain serde types so candidate lists can live in JSON files.

use serde::{Deserialize, Serialize};

use crate::{
    caps::{Caps, MediaKind},
    error::{Error, Result},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncodingProfile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Container format; `None` produces a single elementary stream.
    #[serde(default)]
    pub container: Option<Caps>,
    pub streams: Vec<StreamProfile>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamProfile {
    #[serde(default)]
    pub name: String,
    /// Encoded format this stream ends up in.
    pub format: Caps,
    /// Constraint on raw input before encoding, e.g. a maximum resolution.
    #[serde(default)]
    pub restriction: Option<Caps>,
    /// How many inputs this stream may take; 0 means no limit. A presence of
    /// exactly one is exposed as an always-present input.
    #[serde(default)]
    pub presence: u32,
}

impl EncodingProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            container: None,
            streams: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_container(mut self, container: Caps) -> Self {
        self.container = Some(container);
        self
    }

    pub fn with_stream(mut self, stream: StreamProfile) -> Self {
        self.streams.push(stream);
        self
    }

    /// Caps of the muxed (or single elementary) output.
    pub fn output_caps(&self) -> Caps {
        match (&self.container, self.streams.as_slice()) {
            (Some(container), _) => container.clone(),
            (None, [only]) => only.format.clone(),
            (None, _) => Caps::any(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.streams.is_empty() {
            return Err(Error::invalid_profile(&self.name, "no streams"));
        }
        if self.container.is_none() && self.streams.len() > 1 {
            return Err(Error::invalid_profile(
                &self.name,
                "several streams need a container",
            ));
        }
        if let Some(container) = &self.container {
            if container.is_any() || container.is_empty() {
                return Err(Error::invalid_profile(&self.name, "container format is not specific"));
            }
        }
        for stream in &self.streams {
            if stream.format.is_any() || stream.format.is_empty() {
                return Err(Error::invalid_profile(
                    &self.name,
                    format!("stream '{}' has no concrete format", stream.name),
                ));
            }
            if stream.format.media_kind() == MediaKind::Other {
                return Err(Error::invalid_profile(
                    &self.name,
                    format!("stream '{}' format {} is not audio, video or subtitle", stream.name, stream.format),
                ));
            }
        }
        Ok(())
    }
}

impl StreamProfile {
    pub fn new(format: Caps) -> Self {
        Self {
            name: String::new(),
            format,
            restriction: None,
            presence: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_restriction(mut self, restriction: Caps) -> Self {
        self.restriction = Some(restriction);
        self
    }

    pub fn with_presence(mut self, presence: u32) -> Self {
        self.presence = presence;
        self
    }

    pub fn kind(&self) -> MediaKind {
        self.format.media_kind()
    }

    /// Everything an input for this stream accepts: the target format itself
    /// (passed through) plus raw data of the same kind, narrowed by the
    /// restriction when one is set.
    pub fn accepted_caps(&self) -> Caps {
        let raw = match &self.restriction {
            Some(restriction) => restriction.clone(),
            None => self
                .kind()
                .raw_media_type()
                .map(Caps::new_simple)
                .unwrap_or_else(Caps::new_empty),
        };
        self.format.merge(&raw)
    }

    pub fn accepts(&self, caps: &Caps) -> bool {
        caps.can_intersect(&self.accepted_caps())
    }

    pub fn is_unlimited(&self) -> bool {
        self.presence == 0
    }
}

#[cfg(test)]
#[path = "profile_test.rs"]
mod profile_test;
