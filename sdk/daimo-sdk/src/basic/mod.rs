pub mod actions;
pub mod note;
pub mod wallet;
