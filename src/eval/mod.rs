pub mod font;
pub mod predict;
pub mod render;
