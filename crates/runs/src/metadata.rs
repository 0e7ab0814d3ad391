//! Project metadata: settings and named anchors persisted beside a buffer.
//!
//! ```toml
//! [Settings]
//! free_space_start = 0x100
//!
//! [[NamedAnchors]]
//! Name = "names"
//! Address = 0x40
//! Format = '[name""8]4'
//! ```

use std::path::Path;

use hexweave_primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ConfigError, ModelSettings};
use crate::error::{FormatError, Result};
use crate::factory::apply_format;
use crate::model::{DataModel, Model, Token};
use crate::run::{NoInfoRun, Run};

/// Everything saved about a buffer besides its bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Metadata {
	/// Settings to install before anchors are applied.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub settings: Option<ModelSettings>,
	/// Anchors in the order they are applied.
	#[serde(default)]
	pub named_anchors: Vec<NamedAnchor>,
}

/// One anchor and the format of the run it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NamedAnchor {
	pub name: String,
	pub address: Address,
	/// Empty for anchors without a format.
	#[serde(default)]
	pub format: String,
}

impl Metadata {
	/// Parses metadata TOML, validating any settings it carries.
	pub fn from_toml_str(text: &str) -> std::result::Result<Self, ConfigError> {
		let metadata: Self = toml::from_str(text)?;
		if let Some(settings) = &metadata.settings {
			settings.validate()?;
		}
		Ok(metadata)
	}

	pub fn load(path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&text)
	}

	pub fn to_toml_string(&self) -> std::result::Result<String, ConfigError> {
		Ok(toml::to_string(self)?)
	}

	/// Captures the settings and every anchor of `model`.
	pub fn export(model: &dyn DataModel) -> Self {
		let named_anchors = model
			.anchors()
			.into_iter()
			.map(|(name, address)| NamedAnchor {
				format: model.run_at(address).map(|run| run.format().into_owned()).unwrap_or_default(),
				name,
				address,
			})
			.collect();
		Self {
			settings: Some(model.settings().clone()),
			named_anchors,
		}
	}

	/// Installs the settings and applies every anchor to `model`.
	///
	/// Anchors that fail are retried once after the rest, since an enum or
	/// bit-array source may be declared later in the file. Returns the anchors
	/// that still failed, with their errors.
	pub fn apply(&self, model: &mut Model, token: &mut Token) -> Vec<(NamedAnchor, FormatError)> {
		if let Some(settings) = &self.settings {
			model.set_settings(settings.clone());
		}

		let mut pending: Vec<&NamedAnchor> = Vec::new();
		for anchor in &self.named_anchors {
			if apply_anchor(model, token, anchor).is_err() {
				pending.push(anchor);
			}
		}
		if !pending.is_empty() {
			debug!(count = pending.len(), "retrying anchors that failed on the first pass");
		}

		let mut failed = Vec::new();
		for anchor in pending {
			if let Err(err) = apply_anchor(model, token, anchor) {
				warn!(name = %anchor.name, address = anchor.address, %err, "anchor not applied");
				failed.push((anchor.clone(), err));
			}
		}
		failed
	}
}

fn apply_anchor(model: &mut Model, token: &mut Token, anchor: &NamedAnchor) -> Result<Run> {
	if anchor.address >= model.len() {
		return Err(FormatError::Mismatch {
			format: anchor.format.clone(),
			address: anchor.address,
		});
	}
	if !anchor.format.is_empty() {
		return apply_format(model, token, &anchor.name, anchor.address, &anchor.format);
	}
	let sources = model
		.run_at(anchor.address)
		.map(|run| run.pointer_sources().clone())
		.unwrap_or_default();
	let run = Run::NoInfo(NoInfoRun {
		start: anchor.address,
		sources,
	});
	model.observe_anchor_written(token, &anchor.name, run.clone())?;
	Ok(run)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reads_hex_addresses_and_pascal_case_keys() {
		let metadata = Metadata::from_toml_str(
			r#"
			[Settings]
			free_space_start = 0x100

			[[NamedAnchors]]
			Name = "names"
			Address = 0x40
			Format = '[name""8]4'

			[[NamedAnchors]]
			Name = "blank"
			Address = 0x80
			"#,
		)
		.unwrap();
		assert_eq!(metadata.settings.map(|s| s.free_space_start), Some(0x100));
		assert_eq!(metadata.named_anchors.len(), 2);
		assert_eq!(metadata.named_anchors[0].address, 0x40);
		assert_eq!(metadata.named_anchors[0].format, "[name\"\"8]4");
		assert_eq!(metadata.named_anchors[1].format, "");
	}

	#[test]
	fn invalid_settings_are_rejected() {
		let err = Metadata::from_toml_str("[Settings]\nalignment = 6").unwrap_err();
		assert!(matches!(err, ConfigError::Invalid { name: "alignment", .. }));
	}

	#[test]
	fn anchors_past_the_buffer_fail() {
		let mut model = Model::new(vec![0xFF; 0x10]);
		let mut token = Token::new();
		let metadata = Metadata {
			settings: None,
			named_anchors: vec![NamedAnchor {
				name: "far".into(),
				address: 0x100,
				format: String::new(),
			}],
		};
		let failed = metadata.apply(&mut model, &mut token);
		assert_eq!(failed.len(), 1);
		assert_eq!(model.address_of_anchor("far"), None);
	}
}
