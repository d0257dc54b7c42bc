pub mod manifest;
pub mod plist;
