//! Model settings: free-space policy and validation tolerance.

use std::path::{Path, PathBuf};

use hexweave_primitives::MAX_POINTER_SPAN;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading settings or project metadata.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax or shape.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// Error writing TOML.
	#[error("TOML write error: {0}")]
	TomlWrite(#[from] toml::ser::Error),

	/// Error reading or writing a file.
	#[error("I/O error on {path}: {error}")]
	Io {
		/// Path of the file.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// A setting holds a value outside its domain.
	#[error("invalid setting {name}: {reason}")]
	Invalid {
		/// Setting name.
		name: &'static str,
		/// Why the value was rejected.
		reason: String,
	},
}

/// Tunables for allocation and validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelSettings {
	/// Address where the free-space search begins.
	pub free_space_start: usize,
	/// Bytes of erased space to leave after relocated data.
	pub free_space_buffer: usize,
	/// Alignment of relocated runs.
	pub alignment: usize,
	/// Share of a stream's leading elements that must validate before a format is accepted.
	pub match_tolerance: f64,
	/// Largest size the buffer may grow to.
	pub max_length: usize,
}

impl Default for ModelSettings {
	fn default() -> Self {
		Self {
			free_space_start: 0,
			free_space_buffer: 0x100,
			alignment: 4,
			match_tolerance: 0.9,
			max_length: MAX_POINTER_SPAN,
		}
	}
}

impl ModelSettings {
	/// Parses settings from TOML and validates them.
	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		let settings: Self = toml::from_str(text)?;
		settings.validate()?;
		Ok(settings)
	}

	/// Reads settings from a TOML file.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&text)
	}

	/// Checks every setting against its domain.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !(self.match_tolerance > 0.0 && self.match_tolerance <= 1.0) {
			return Err(ConfigError::Invalid {
				name: "match_tolerance",
				reason: format!("{} is not in (0, 1]", self.match_tolerance),
			});
		}
		if self.alignment == 0 || !self.alignment.is_power_of_two() {
			return Err(ConfigError::Invalid {
				name: "alignment",
				reason: format!("{} is not a power of two", self.alignment),
			});
		}
		if self.max_length > MAX_POINTER_SPAN {
			return Err(ConfigError::Invalid {
				name: "max_length",
				reason: format!("{:#X} exceeds the pointer window {MAX_POINTER_SPAN:#X}", self.max_length),
			});
		}
		Ok(())
	}

	/// Number of leading elements that must validate out of `count`.
	pub fn required_matches(&self, count: usize) -> usize {
		(count as f64 * self.match_tolerance).ceil() as usize
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_fill_missing_keys() {
		let settings = ModelSettings::from_toml_str("free_space_start = 0x1000").unwrap();
		assert_eq!(settings.free_space_start, 0x1000);
		assert_eq!(settings.alignment, 4);
		assert_eq!(settings.match_tolerance, 0.9);
	}

	#[test]
	fn rejects_bad_tolerance() {
		let err = ModelSettings::from_toml_str("match_tolerance = 1.5").unwrap_err();
		assert!(matches!(err, ConfigError::Invalid { name: "match_tolerance", .. }));
	}

	#[test]
	fn rejects_unaligned_alignment() {
		let err = ModelSettings::from_toml_str("alignment = 3").unwrap_err();
		assert!(matches!(err, ConfigError::Invalid { name: "alignment", .. }));
	}

	#[test]
	fn rejects_unknown_keys() {
		assert!(matches!(
			ModelSettings::from_toml_str("free_space = 1"),
			Err(ConfigError::Toml(_))
		));
	}

	#[test]
	fn required_matches_rounds_up() {
		let settings = ModelSettings::default();
		assert_eq!(settings.required_matches(10), 9);
		assert_eq!(settings.required_matches(5), 5);
		assert_eq!(settings.required_matches(0), 0);
	}
}
