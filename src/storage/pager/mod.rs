pub mod evict;
pub mod pager;

pub use pager::Pager;
