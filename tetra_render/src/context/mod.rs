/// Context module - the RenderContext contract and its shared state helpers

pub mod render_context;
pub mod pass_scope;

pub use render_context::*;
pub use pass_scope::*;
