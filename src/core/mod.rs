pub mod dag;
pub mod engine;
pub mod links;
pub mod pipeline;
pub mod scp;
pub mod var;

pub use crate::domain::model::{Link, Links, Realization};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
