use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use transcode_bus::{Caps, DecodeSummary, EncodingProfile, LinkedInput, decode::StreamReport};

/// Where each stream of one input went for one profile.
#[derive(Debug, Serialize)]
pub struct RoutingPlan {
    pub input: String,
    pub profile: String,
    pub output_caps: Caps,
    pub inputs: Vec<LinkedInput>,
    pub provisioned: usize,
    pub streams: Vec<StreamReport>,
}

impl RoutingPlan {
    pub fn new(
        input: &str,
        profile: &EncodingProfile,
        inputs: Vec<LinkedInput>,
        provisioned: usize,
        summary: DecodeSummary,
    ) -> Self {
        Self {
            input: input.to_string(),
            profile: profile.name.clone(),
            output_caps: profile.output_caps(),
            inputs,
            provisioned,
            streams: summary.streams,
        }
    }

    pub fn write(&self, dir: &Path, n: usize) -> anyhow::Result<PathBuf> {
        let path = dir.join(plan_file_name(&self.input, n));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

/// `<input-stem>-<n>.json`; URLs use their last path segment.
pub fn plan_file_name(input: &str, n: usize) -> String {
    let last = input
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(input);
    let stem = Path::new(last)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string());
    format!("{}-{}.json", stem, n)
}

#[cfg(test)]
#[path = "plan_test.rs"]
mod plan_test;
