pub mod normalize;
pub mod index;
pub mod search;
pub mod handle;

pub use handle::IndexHandle;
pub use index::NgramIndex;
