//! The serialized shape of a palettized cuboid.
//!
//! A container has two named children:
//!
//! | Key | Contents |
//! |-----|----------|
//! | `palette` | Ordered list of distinct entries (length ≥ 1) |
//! | `data` | Packed index words, present only when `palette` has more than one entry |
//!
//! The tree format the container is embedded in is someone else's concern;
//! anything with a serde data format (NBT, JSON, RON) can carry it.

use serde::{Deserialize, Serialize};

use crate::error::{PaletteError, Result};

/// Palette list plus packed index words, ready to embed in a save file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteContainer<E> {
    /// Distinct palette entries, indexed by the packed words.
    #[serde(default)]
    pub palette: Vec<E>,
    /// Packed palette indices. Omitted for a single-entry palette.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u64>>,
}

impl<E> PaletteContainer<E> {
    /// Creates a container from its parts.
    pub fn new(palette: Vec<E>, data: Option<Vec<u64>>) -> Self {
        Self { palette, data }
    }

    /// A container whose every cell is `value`.
    pub fn uniform(value: E) -> Self {
        Self {
            palette: vec![value],
            data: None,
        }
    }

    /// Returns `true` if the palette has exactly one entry.
    pub fn is_uniform(&self) -> bool {
        self.palette.len() == 1
    }

    /// Checks the shape rule: a non-empty palette, with `data` present exactly
    /// when the palette has more than one entry.
    pub fn validate(&self) -> Result<()> {
        match (self.palette.len(), &self.data) {
            (0, _) => Err(PaletteError::malformed("palette is missing or empty")),
            (1, Some(_)) => Err(PaletteError::malformed(
                "data present for a single-entry palette",
            )),
            (n, None) if n > 1 => Err(PaletteError::malformed(format!(
                "data missing for a palette of {n} entries"
            ))),
            _ => Ok(()),
        }
    }

    /// Packed words reinterpreted as signed longs, as tree formats with only
    /// signed 64-bit arrays store them.
    pub fn data_as_i64(&self) -> Option<Vec<i64>> {
        self.data
            .as_ref()
            .map(|words| words.iter().map(|&w| w as i64).collect())
    }

    /// Builds a container from signed-long words.
    pub fn from_i64_data(palette: Vec<E>, data: Option<Vec<i64>>) -> Self {
        Self {
            palette,
            data: data.map(|longs| longs.into_iter().map(|l| l as u64).collect()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_container_omits_data_key() {
        let container = PaletteContainer::uniform("minecraft:plains".to_string());
        let json = serde_json::to_string(&container).unwrap();
        assert_eq!(json, r#"{"palette":["minecraft:plains"]}"#);
        assert!(container.validate().is_ok());
    }

    #[test]
    fn test_missing_keys_deserialize_to_empty() {
        let container: PaletteContainer<String> = serde_json::from_str("{}").unwrap();
        assert!(container.palette.is_empty());
        assert!(container.data.is_none());
        assert!(container.validate().unwrap_err().is_data_error());
    }

    #[test]
    fn test_validate_shape_rules() {
        let missing = PaletteContainer::new(vec![1, 2], None);
        assert!(matches!(
            missing.validate(),
            Err(PaletteError::MalformedContainer(_))
        ));
        let extra = PaletteContainer::new(vec![1], Some(vec![0]));
        assert!(extra.validate().is_err());
        let ok = PaletteContainer::new(vec![1, 2], Some(vec![0; 256]));
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_signed_long_conversion() {
        let container = PaletteContainer::from_i64_data(vec!["a", "b"], Some(vec![-1, 5]));
        assert_eq!(container.data, Some(vec![u64::MAX, 5]));
        assert_eq!(container.data_as_i64(), Some(vec![-1, 5]));
    }

    #[test]
    fn test_ron_roundtrip() {
        let container = PaletteContainer::new(
            vec!["stone".to_string(), "dirt".to_string()],
            Some(vec![0x1111, 0]),
        );
        let text = ron::to_string(&container).unwrap();
        let back: PaletteContainer<String> = ron::from_str(&text).unwrap();
        assert_eq!(back, container);
    }
}
