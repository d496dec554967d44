mod subscription;
mod table;

pub use subscription::Subscription;
pub use table::Table;
