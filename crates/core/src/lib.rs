// Core types shared by the macro sandbox, the query channel and the renderer

pub mod result;
pub mod width;

pub use result::{CellValue, ResultSet, Row, ShapeError};
pub use width::display_width;
