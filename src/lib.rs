pub mod clone;
pub mod db;
pub mod model;
pub mod store;
