//! Pipeline stages for the structured conversion path.
//!
//! Stage order: [`input`] resolves the source, [`raster`] renders pages to
//! PNG, [`ocr`] extracts text, [`analyze`] splits text into blocks. The
//! driver in [`crate::convert`] sequences them and hands the result to the
//! persistence gateway and renderer.

pub mod analyze;
pub mod input;
pub mod ocr;
pub mod raster;
