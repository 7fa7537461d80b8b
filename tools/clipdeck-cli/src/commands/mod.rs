pub mod export;
pub mod info;
pub mod record;
pub mod segments;
pub mod validate;
