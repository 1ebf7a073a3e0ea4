pub mod manager;
pub mod room;
pub mod tier;
