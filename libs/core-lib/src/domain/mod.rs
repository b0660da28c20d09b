pub mod audit;
pub mod command;
pub mod tenant;
