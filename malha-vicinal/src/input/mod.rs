//! Lecture des couches d'entrée

pub mod decode;
pub mod layer;
pub mod population;

pub use decode::{read_text, InputFile};
pub use layer::{read_layer, Converted, Layer};
pub use population::read_population;
