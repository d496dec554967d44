use std::marker::PhantomData;

use crate::dao::PoolType;

/// Typed handle over the shared connection pool. The subscription
/// registry hangs its queries off `Table<Subscription>` in the dao
/// layer, so each row type gets its own namespace without owning a
/// separate pool.
#[derive(Debug)]
pub struct Table<T> {
    pub pool: PoolType,
    _row: PhantomData<T>,
}

impl<T> Table<T> {
    pub fn new(pool: PoolType) -> Self {
        Table {
            pool,
            _row: PhantomData,
        }
    }
}
