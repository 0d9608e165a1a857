/// Represents a number of different errors that can occur from creating tensors,
/// launching pooling kernels, or driving a pooling layer out of order.
#[non_exhaustive]
#[derive(Debug)]
pub enum Error {
    /// A tensor did not have the shape an operation required
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    /// Not enough elements were provided when creating a tensor
    WrongNumElements,
    /// A pooling configuration that would produce an empty or negative output
    InvalidConfig(&'static str),
    /// A layer was driven out of its forward/backward order
    StateMisuse(&'static str),
    /// A pooling mode name that has no kernel
    UnsupportedMode(String),
    /// A persisted file was missing the named entry
    MissingMetadata(&'static str),
    IoError(std::io::Error),
    #[cfg(feature = "safetensors")]
    SafeTensorError(safetensors::SafeTensorError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShapeMismatch { expected, found } => {
                write!(f, "shape mismatch: expected {expected:?}, found {found:?}")
            }
            Self::UnsupportedMode(mode) => write!(f, "unsupported pooling mode {mode:?}"),
            Self::IoError(err) => write!(f, "{err}"),
            _ => write!(f, "{self:?}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value)
    }
}

#[cfg(feature = "safetensors")]
impl From<safetensors::SafeTensorError> for Error {
    fn from(value: safetensors::SafeTensorError) -> Self {
        Self::SafeTensorError(value)
    }
}
