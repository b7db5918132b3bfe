//! Configuration structs with sensible defaults and RON persistence.

use std::fmt;
use std::path::{Path, PathBuf};

use nebula_palette::{
    BIOME_EDGE, BIOME_MIN_BITS, BLOCK_EDGE, BLOCK_MIN_BITS, Geometry, HEIGHTMAP_MIN_BITS,
    LayoutPolicy, PackedArray, PackingLayout, VersionThreshold,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Format version policy.
    pub format: FormatConfig,
    /// Section parameters per data domain.
    pub domains: DomainConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Which format versions use which packing layout, and which version to write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FormatConfig {
    /// First format version whose index words are aligned. Older versions
    /// pack values across word boundaries.
    pub aligned_since: u32,
    /// Format version used when re-encoding.
    pub target_version: u32,
}

/// Section kinds stored as palettized cuboids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Block states in a 16³ section.
    #[default]
    Blocks,
    /// Biomes in a 4³ section.
    Biomes,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Blocks => f.write_str("blocks"),
            Domain::Biomes => f.write_str("biomes"),
        }
    }
}

/// Section geometry and index width floors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DomainConfig {
    /// Edge length of a block section.
    pub block_edge: usize,
    /// Minimum index width for block palettes.
    pub block_min_bits: u8,
    /// Edge length of a biome section.
    pub biome_edge: usize,
    /// Minimum index width for biome palettes.
    pub biome_min_bits: u8,
    /// Edge length of a height map.
    pub heightmap_edge: usize,
    /// Minimum value width for height maps.
    pub heightmap_min_bits: u8,
    /// Added to every stored height.
    pub heightmap_offset: i64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            aligned_since: 2529,
            target_version: 3700,
        }
    }
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            block_edge: BLOCK_EDGE,
            block_min_bits: BLOCK_MIN_BITS,
            biome_edge: BIOME_EDGE,
            biome_min_bits: BIOME_MIN_BITS,
            heightmap_edge: 16,
            heightmap_min_bits: HEIGHTMAP_MIN_BITS,
            heightmap_offset: 0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Policy and domain helpers ---

impl FormatConfig {
    /// Layout that index words written at `target_version` use.
    pub fn target_layout(&self) -> PackingLayout {
        self.layout_for(self.target_version)
    }
}

impl LayoutPolicy for FormatConfig {
    fn layout_for(&self, version: u32) -> PackingLayout {
        VersionThreshold::new(self.aligned_since).layout_for(version)
    }
}

impl DomainConfig {
    /// Section edge length for `domain`.
    pub fn edge(&self, domain: Domain) -> usize {
        match domain {
            Domain::Blocks => self.block_edge,
            Domain::Biomes => self.biome_edge,
        }
    }

    /// Minimum index width for `domain`.
    pub fn min_bits(&self, domain: Domain) -> u8 {
        match domain {
            Domain::Blocks => self.block_min_bits,
            Domain::Biomes => self.biome_min_bits,
        }
    }

    /// An empty height map packed for `layout`.
    pub fn heightmap(&self, layout: PackingLayout) -> Result<PackedArray, ConfigError> {
        let geometry = Geometry::square(self.heightmap_edge).map_err(|source| {
            ConfigError::InvalidDomain {
                domain: "heightmap",
                source,
            }
        })?;
        Ok(PackedArray::new(geometry, layout, self.heightmap_min_bits)
            .with_offset(self.heightmap_offset))
    }
}

/// Default directory for `config.ron`, under the platform config dir.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("nebula-palette"))
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Returns `Some(new_config)` if the file on disk differs, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
