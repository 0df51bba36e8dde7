//! Configuration of a signing invocation.

mod builder;
mod core;
mod mapping;

pub use builder::SettingsBuilder;
pub use core::{DEFAULT_SCRATCH_DIR, SigningSettings};
pub use mapping::{DestinationMapper, MappingStrategy, builder_dir_file_name, signed_file_name};
