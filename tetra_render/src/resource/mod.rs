/// Resource module - shared, refcounted GPU resource handles

pub mod gpu_resource;
pub mod buffer;
pub mod texture;
pub mod shader;
pub mod tracker;
pub mod host_data;
pub mod ring_cursor;

pub use gpu_resource::*;
pub use buffer::*;
pub use texture::*;
pub use shader::*;
pub use tracker::*;
pub use host_data::*;
pub use ring_cursor::*;
