//! Reading, summarizing, and re-encoding palette container files.

use std::fmt;
use std::path::{Path, PathBuf};

use nebula_config::{Config, Domain};
use nebula_palette::{
    LayoutPolicy, PackingLayout, PaletteContainer, PaletteError, PalettizedCuboid,
};
use tracing::{debug, warn};

/// Errors raised by the inspection tool.
#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    /// Reading or writing a container file failed.
    #[error("failed to access {path}: {source}")]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file extension does not name a supported format.
    #[error("unsupported container format for {0} (expected .json or .ron)")]
    UnknownFormat(PathBuf),

    /// JSON encoding or decoding failed.
    #[error("invalid JSON container: {0}")]
    Json(#[from] serde_json::Error),

    /// RON decoding failed.
    #[error("invalid RON container: {0}")]
    RonParse(#[from] ron::error::SpannedError),

    /// RON encoding failed.
    #[error("failed to encode RON container: {0}")]
    RonWrite(#[from] ron::Error),

    /// The container could not be decoded or re-encoded.
    #[error(transparent)]
    Palette(#[from] PaletteError),
}

/// Serialization formats for container files, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// `.json`, via serde_json.
    Json,
    /// `.ron`, via ron.
    Ron,
}

impl FileFormat {
    /// Picks the format from `path`'s extension.
    pub fn from_path(path: &Path) -> Result<Self, InspectError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(FileFormat::Json),
            Some(ext) if ext.eq_ignore_ascii_case("ron") => Ok(FileFormat::Ron),
            _ => Err(InspectError::UnknownFormat(path.to_path_buf())),
        }
    }
}

/// Reads a string-keyed container from a `.json` or `.ron` file.
pub fn read_container(path: &Path) -> Result<PaletteContainer<String>, InspectError> {
    let format = FileFormat::from_path(path)?;
    let text = std::fs::read_to_string(path).map_err(|source| InspectError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let container = match format {
        FileFormat::Json => serde_json::from_str(&text)?,
        FileFormat::Ron => ron::from_str(&text)?,
    };
    Ok(container)
}

/// Writes `container` to `path` in the format its extension names.
pub fn write_container(
    path: &Path,
    container: &PaletteContainer<String>,
) -> Result<(), InspectError> {
    let text = match FileFormat::from_path(path)? {
        FileFormat::Json => serde_json::to_string_pretty(container)?,
        FileFormat::Ron => ron::ser::to_string_pretty(container, ron::ser::PrettyConfig::new())?,
    };
    std::fs::write(path, text).map_err(|source| InspectError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Summary of a decoded section.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Section kind the container was decoded as.
    pub domain: Domain,
    /// Format version the container was decoded at.
    pub version: u32,
    /// Layout of the decoded index words.
    pub layout: PackingLayout,
    /// Index width in bits.
    pub bits: u8,
    /// Number of index words.
    pub words: usize,
    /// Palette entries in index order with the number of cells using each.
    pub entries: Vec<(String, usize)>,
}

impl Report {
    /// Summarizes `cuboid` as decoded at `version`.
    pub fn new(cuboid: &PalettizedCuboid<String>, domain: Domain, version: u32) -> Self {
        let entries = cuboid
            .palette_values()
            .map(|value| (value.clone(), cuboid.count(value)))
            .collect();
        Self {
            domain,
            version,
            layout: cuboid.layout(),
            bits: cuboid.bits(),
            words: cuboid.indices().words().len(),
            entries,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "domain:  {}", self.domain)?;
        writeln!(f, "version: {}", self.version)?;
        writeln!(f, "layout:  {:?}", self.layout)?;
        writeln!(f, "bits:    {}", self.bits)?;
        writeln!(f, "words:   {}", self.words)?;
        writeln!(f, "palette: {} entries", self.entries.len())?;
        for (index, (value, cells)) in self.entries.iter().enumerate() {
            writeln!(f, "  [{index:>3}] {value} x{cells}")?;
        }
        Ok(())
    }
}

/// Decodes `container` as a `domain` section written at `version`.
///
/// Duplicate palette entries and data attached to a single-entry palette are
/// accepted with a warning.
pub fn decode(
    container: PaletteContainer<String>,
    domain: Domain,
    version: u32,
    config: &Config,
) -> Result<PalettizedCuboid<String>, InspectError> {
    if container.is_uniform() && container.data.is_some() {
        warn!("single-entry palette carries index data; ignoring it");
    }
    let distinct = {
        let mut names: Vec<&String> = container.palette.iter().collect();
        names.sort();
        names.dedup();
        names.len()
    };
    if distinct != container.palette.len() {
        warn!(
            "palette has {} duplicate entries",
            container.palette.len() - distinct
        );
    }

    let layout = config.format.layout_for(version);
    debug!("decoding {} section at version {} ({:?})", domain, version, layout);
    let cuboid = PalettizedCuboid::from_container(
        container,
        config.domains.edge(domain),
        config.domains.min_bits(domain),
        &config.format,
        version,
    )?;
    Ok(cuboid)
}

/// Re-encodes `cuboid` for the configured target version.
pub fn reencode(
    cuboid: &mut PalettizedCuboid<String>,
    domain: Domain,
    config: &Config,
) -> Result<PaletteContainer<String>, InspectError> {
    let container = cuboid.to_container(
        &config.format,
        config.format.target_version,
        config.domains.min_bits(domain),
    )?;
    Ok(container)
}
