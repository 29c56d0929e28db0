pub mod content;
pub mod html;
pub mod matcher;
pub mod query;
