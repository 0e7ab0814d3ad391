//! Typed runs over a raw byte buffer.
//!
//! A [`Model`] holds the bytes of a cartridge image and an index of runs:
//! typed regions such as strings, sprites and table streams. Table streams are
//! described by a small format language (see [`format`]) and can be rendered to
//! record text, edited from it, and grown in place or by relocation. Every
//! mutation is recorded on a [`Token`] so it can be reverted.

pub mod config;
pub mod data_format;
pub mod edit;
pub mod end;
pub mod error;
pub mod factory;
pub mod format;
pub mod metadata;
pub mod model;
pub mod refactor;
pub mod run;
pub mod segment;
pub mod table;
pub mod tokenize;

pub use config::{ConfigError, ModelSettings};
pub use data_format::{DataFormat, FieldPosition};
pub use end::{EndStrategy, ParentLink};
pub use error::{FormatError, Result};
pub use factory::{RunStrategy, apply_format};
pub use format::TableFormat;
pub use metadata::{Metadata, NamedAnchor};
pub use model::{DataModel, Model, Token};
pub use run::Run;
pub use segment::{Segment, SegmentKind};
pub use table::{AutocompleteItem, TableStreamRun};
