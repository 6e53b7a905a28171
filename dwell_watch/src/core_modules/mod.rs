pub mod detection;
pub mod event;
pub mod region;
pub mod tracker;
