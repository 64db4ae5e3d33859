pub mod bulk;
pub mod catalog;
pub mod db;
pub mod reports;

pub use db::Db;
