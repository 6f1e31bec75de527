pub mod ip;
pub mod paths;
pub mod system;
