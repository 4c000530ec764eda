pub mod completions;
pub mod curate;
pub mod verify;
