//! Canonical table persistence and the load-once cache.
//!
//! - **Persistence**: Parquet files written by the build, read at load time
//! - **Cache**: explicit [`TableCache`] handing out a shared [`LoadedTable`]

mod cache;
mod parquet;

pub use cache::{LoadedTable, TableCache, user_data_dir};
pub use parquet::{read_parquet, write_parquet, write_parquet_to};
