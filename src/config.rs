use std::path::PathBuf;

use clap::Parser;
use transcode_bus::EncodingProfile;

#[derive(Parser, Debug)]
#[command(name = "transcode-test")]
#[command(about = "Autoplugs an input into every candidate encoding profile and writes the routing plans")]
pub struct Config {
    /// Media file or URL to transcode
    #[arg(short, long, required_unless_present = "list_elements")]
    pub input: Option<String>,

    /// JSON file with candidate encoding profiles (built-in list if omitted)
    #[arg(short, long)]
    pub profiles: Option<PathBuf>,

    /// Directory the routing plans are written to
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Only try the profile with this name (repeatable)
    #[arg(long = "profile")]
    pub only: Vec<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: log::LevelFilter,

    /// List registered elements and exit
    #[arg(long)]
    pub list_elements: bool,
}

impl Config {
    /// Whether the profile named `name` was selected on the command line.
    pub fn wants(&self, name: &str) -> bool {
        self.only.is_empty() || self.only.iter().any(|n| n == name)
    }

    /// Selected profiles with their position in the candidate list, so plan
    /// numbering does not shift when earlier profiles are skipped or fail.
    pub fn selected<'a>(
        &'a self,
        candidates: &'a [EncodingProfile],
    ) -> impl Iterator<Item = (usize, &'a EncodingProfile)> + 'a {
        candidates
            .iter()
            .enumerate()
            .filter(|(_, p)| self.wants(&p.name))
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
