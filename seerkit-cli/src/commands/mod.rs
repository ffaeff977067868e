pub mod detect;
pub mod extract;
pub mod list;
pub mod update;
