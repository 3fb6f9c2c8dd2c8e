pub mod canonical;
pub mod error;
pub mod json;
pub mod layout;
pub mod manifest;
pub mod search_index;
