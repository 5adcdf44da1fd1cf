pub mod days;
pub mod error;
pub mod external;
pub mod manual;
pub mod models;
pub mod packer;
pub mod preferences;
