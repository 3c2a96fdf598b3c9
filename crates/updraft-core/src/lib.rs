mod config;
mod error;
mod manifest;
mod release;
mod request;
mod shortcut;
mod store;
mod version;

pub use config::{UpdaterConfig, CONFIG_FILE_NAME};
pub use error::UpdateError;
pub use manifest::{PackageMetadata, PACKAGE_METADATA_FILE};
pub use release::{
    parse_package_filename, ReleaseEntry, DELTA_SUFFIX, FULL_SUFFIX, PACKAGE_EXTENSION,
};
pub use request::UpdateRequest;
pub use shortcut::{ShortcutLocation, ShortcutLocations, ShortcutRecord};
pub use store::{
    list_package_files, manifest_path, read_release_set, rebuild_release_set,
    write_release_set, ReleaseSet, MANIFEST_FILE_NAME,
};
pub use version::ReleaseVersion;

#[cfg(test)]
mod tests;
