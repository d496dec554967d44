mod path;
mod subscription;
mod types;

pub use self::{
    path::get_path,
    types::{PoolOption, PoolType, QueryResult},
};
