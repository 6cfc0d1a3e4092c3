//! Process-wide element factories.

use std::{
    collections::HashMap,
    sync::{Arc, LazyLock, PoisonError, RwLock},
};

use serde::Serialize;

use crate::{
    decode::DecodeBin,
    element::Element,
    encode::EncodeBin,
    error::{Error, Result},
    shell::{DECODE_BIN, ENCODE_BIN, TranscodeBin},
};

pub const TRANSCODE_BIN: &str = "transcodebin";

/// Autoplugging priority. Elements ranked `None` are only built by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    None,
    Marginal,
    Secondary,
    Primary,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FactoryMetadata {
    pub name: String,
    pub rank: Rank,
    pub long_name: String,
    pub klass: String,
    pub description: String,
}

type Constructor = Arc<dyn Fn(&str) -> Result<Element> + Send + Sync>;

struct Factory {
    metadata: FactoryMetadata,
    constructor: Constructor,
}

static FACTORIES: LazyLock<RwLock<HashMap<String, Factory>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

pub fn register<F>(metadata: FactoryMetadata, constructor: F) -> Result<()>
where
    F: Fn(&str) -> Result<Element> + Send + Sync + 'static,
{
    let mut factories = FACTORIES.write().unwrap_or_else(PoisonError::into_inner);
    if factories.contains_key(&metadata.name) {
        return Err(Error::DuplicateFactory(metadata.name));
    }
    log::debug!("registered element factory {}", metadata.name);
    factories.insert(
        metadata.name.clone(),
        Factory {
            metadata,
            constructor: Arc::new(constructor),
        },
    );
    Ok(())
}

/// Builds an element named after its factory.
pub fn make(factory: &str) -> Result<Element> {
    make_named(factory, factory)
}

pub fn make_named(factory: &str, name: &str) -> Result<Element> {
    // Constructors may build other elements, so the lock is not held while
    // they run.
    let constructor = FACTORIES
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(factory)
        .map(|f| Arc::clone(&f.constructor))
        .ok_or_else(|| Error::MissingElement(factory.to_string()))?;
    constructor(name)
}

/// Metadata of every registered factory, sorted by name.
pub fn factories() -> Vec<FactoryMetadata> {
    let mut list: Vec<_> = FACTORIES
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .values()
        .map(|f| f.metadata.clone())
        .collect();
    list.sort_by(|a, b| a.name.cmp(&b.name));
    list
}

pub fn find(factory: &str) -> Option<FactoryMetadata> {
    FACTORIES
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(factory)
        .map(|f| f.metadata.clone())
}

fn metadata(name: &str, long_name: &str, klass: &str, description: &str) -> FactoryMetadata {
    FactoryMetadata {
        name: name.to_string(),
        rank: Rank::None,
        long_name: long_name.to_string(),
        klass: klass.to_string(),
        description: description.to_string(),
    }
}

/// Registers `decodebin`, `encodebin` and `transcodebin`. Factories that are
/// already present are left alone.
pub fn register_defaults() {
    let defaults: [(FactoryMetadata, Constructor); 3] = [
        (
            metadata(
                DECODE_BIN,
                "Decoder Bin",
                "Generic/Bin/Decoder",
                "Discovers and autoplugs the elementary streams of an input",
            ),
            Arc::new(|name: &str| Ok(Element::Decoder(Box::new(DecodeBin::new(name))))),
        ),
        (
            metadata(
                ENCODE_BIN,
                "Encoder Bin",
                "Generic/Bin/Encoder",
                "Encodes and muxes streams according to an encoding profile",
            ),
            Arc::new(|name: &str| Ok(Element::Encoder(Box::new(EncodeBin::new(name))))),
        ),
        (
            metadata(
                TRANSCODE_BIN,
                "Automatic Transcoder",
                "Generic/Bin/Transcoder",
                "Autoplugged transcoder to a target encoding profile",
            ),
            Arc::new(|name: &str| TranscodeBin::new(name).map(Element::Transcoder)),
        ),
    ];

    let mut factories = FACTORIES.write().unwrap_or_else(PoisonError::into_inner);
    for (metadata, constructor) in defaults {
        factories
            .entry(metadata.name.clone())
            .or_insert(Factory {
                metadata,
                constructor,
            });
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_test;
