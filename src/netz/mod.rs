pub mod bitmap;
pub mod data;
pub mod dump;

pub use bitmap::{argmax, parse_bitmap, Bitmap, LABELS};
pub use data::{decode_fp_le, NetzwerkData, NeuronData};
pub use dump::{format_network_dump, parse_network_dump};
