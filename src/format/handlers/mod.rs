pub mod compress;
pub mod encode;
pub mod extract;
pub mod merge;
pub mod multipart;
pub mod serialize;
pub mod split;
pub mod template;
