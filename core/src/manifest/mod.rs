pub mod db;
pub mod yaml;
