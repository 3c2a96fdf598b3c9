mod archive;
mod chain;
mod delta;

pub use archive::{
    read_package_entries, write_package_entries, PackageEntries, PackageFile, DEFAULT_FILE_MODE,
    EXECUTABLE_FILE_MODE,
};
pub use chain::resolve_delta_chain;
pub use delta::{DeltaBuilder, ZstdDeltaBuilder};

#[cfg(test)]
mod tests;
