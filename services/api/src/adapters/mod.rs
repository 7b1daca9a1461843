pub mod db;
pub mod gotrue;
pub mod storage;

pub use db::DbAdapter;
pub use gotrue::GoTrueAdapter;
pub use storage::ObjectStorageAdapter;
