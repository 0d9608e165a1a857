use std::cell::Cell;

use minipool_core::Error;

use super::PoolingMode;

/// Key under which the pooling mode is stored.
pub const MODE_KEY: &str = "pooling_type";

/// Somewhere a pooling layer's mode can be saved to and loaded back from.
/// A pooling layer has no weights, so the mode is its only parameter.
pub trait ModeStore {
    fn save_mode(&self, mode: PoolingMode) -> Result<(), Error>;
    fn load_mode(&self) -> Result<PoolingMode, Error>;
}

/// Keeps the mode in memory. Loading before anything was saved fails with
/// [Error::MissingMetadata].
#[derive(Debug, Default)]
pub struct MemoryModeStore {
    mode: Cell<Option<PoolingMode>>,
}

impl ModeStore for MemoryModeStore {
    fn save_mode(&self, mode: PoolingMode) -> Result<(), Error> {
        self.mode.set(Some(mode));
        Ok(())
    }

    fn load_mode(&self) -> Result<PoolingMode, Error> {
        self.mode.get().ok_or(Error::MissingMetadata(MODE_KEY))
    }
}

#[cfg(feature = "safetensors")]
pub use safetensors_store::SafeTensorsModeStore;

#[cfg(feature = "safetensors")]
mod safetensors_store {
    use super::*;
    use memmap2::MmapOptions;
    use safetensors::{serialize_to_file, tensor::TensorView, SafeTensors};
    use std::{
        collections::HashMap,
        path::{Path, PathBuf},
    };

    /// Stores the mode in the header metadata of a `.safetensors` file that
    /// holds no tensors.
    ///
    /// Example:
    /// ```ignore
    /// # use minipool::prelude::*;
    /// let store = SafeTensorsModeStore::init("checkpoints", "pool1");
    /// // checkpoints/pool1_init.safetensors
    /// layer.save_parameters(&store).unwrap();
    /// ```
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SafeTensorsModeStore {
        path: PathBuf,
    }

    impl SafeTensorsModeStore {
        pub fn new<P: AsRef<Path>>(path: P) -> Self {
            Self {
                path: path.as_ref().to_path_buf(),
            }
        }

        /// The store for layer `name` under `folder`: `<folder>/<name>_init.safetensors`.
        pub fn init<P: AsRef<Path>>(folder: P, name: &str) -> Self {
            Self::new(folder.as_ref().join(format!("{name}_init.safetensors")))
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl ModeStore for SafeTensorsModeStore {
        fn save_mode(&self, mode: PoolingMode) -> Result<(), Error> {
            let mut metadata = HashMap::new();
            metadata.insert(MODE_KEY.to_string(), mode.to_string());
            let tensors: Vec<(String, &TensorView)> = Vec::new();
            serialize_to_file(tensors, &Some(metadata), &self.path)?;
            Ok(())
        }

        fn load_mode(&self) -> Result<PoolingMode, Error> {
            let f = std::fs::File::open(&self.path)?;
            let buffer = unsafe { MmapOptions::new().map(&f)? };
            let (_, metadata) = SafeTensors::read_metadata(&buffer)?;
            metadata
                .metadata()
                .as_ref()
                .and_then(|m| m.get(MODE_KEY))
                .ok_or(Error::MissingMetadata(MODE_KEY))?
                .parse()
        }
    }

}
