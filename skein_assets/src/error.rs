use skein_gpu::GpuError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error(transparent)]
    Gltf(#[from] gltf::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("Malformed KTX container: {0}")]
    Ktx(String),

    #[error("Data URI could not be decoded")]
    InvalidDataUri,

    #[error("Asset has no scene to load")]
    NoScene,

    #[error("Primitive {primitive} of mesh {mesh} has no POSITION attribute")]
    MissingPosition { mesh: usize, primitive: usize },

    #[error("Index accessor {accessor} uses {data_type:?}, indices must be unsigned integers")]
    UnsupportedIndexType {
        accessor: usize,
        data_type: gltf::accessor::DataType,
    },

    #[error("Accessor {accessor} uses unsupported component type {data_type:?}")]
    UnsupportedComponentType {
        accessor: usize,
        data_type: gltf::accessor::DataType,
    },

    #[error("Buffer {0} has no data")]
    MissingBuffer(usize),

    #[error("Accessor {0} reads outside of its buffer")]
    AccessorOutOfBounds(usize),

    #[error("Node {0} is referenced but is not part of the loaded scene tree")]
    InvalidNodeReference(usize),

    #[error("Node hierarchy is deeper than the configured maximum of {0}")]
    NodeDepthExceeded(usize),

    #[error(transparent)]
    Gpu(#[from] GpuError),
}

pub type Result<T, E = AssetError> = std::result::Result<T, E>;
