use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::Value;

/// Floating-point type used for weights, activations and outputs.
pub type Fp = f32;

pub const BYTE: usize = 1;
pub const KBYTE: usize = 1024 * BYTE;

/// Size of the single-port byte memory.
pub const MEMSIZE: usize = 64 * KBYTE;

/// Master ports on the memory controller.
pub const MEM_MAX_CONNECTIONS: usize = 2;

// Memory map. The I/O block sits at the bottom: one flags byte, then the
// output block (count byte plus up to 255 floats). Inputs and the
// serialised network follow directly above it.
pub const IO_RSVD_MEMORY_BASE_ADDR: u16 = 0x0000;
pub const IO_RSVD_MEMORY_SIZE: u16 = 1026;
pub const IO_FLAGS_ADDR: u16 = IO_RSVD_MEMORY_BASE_ADDR;
pub const IO_OUTPUTS_BASE_ADDR: u16 = IO_FLAGS_ADDR + 1;
pub const IO_READY_BIT: u8 = 1 << 0;

pub const INPUT_PICTURE_WIDTH: usize = 7;
pub const INPUT_PICTURE_HEIGHT: usize = 7;
pub const INPUT_COUNT: usize = INPUT_PICTURE_WIDTH * INPUT_PICTURE_HEIGHT;

pub const INPUTS_OFFSET: u16 = IO_RSVD_MEMORY_BASE_ADDR + IO_RSVD_MEMORY_SIZE;
pub const NETZ_DATA_OFFSET: u16 = INPUTS_OFFSET + INPUT_COUNT as u16;

pub const MAX_NEURONS: usize = 255;
pub const MAX_OUTPUTS: usize = 3;

// Bus master ids. Port 0 of the controller belongs to the in/out
// controller, port 1 to the dispatch unit.
pub const IOC_MASTER_ID: u8 = 1;
pub const CDU_MASTER_ID: u8 = 2;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NetzpConfig {
    pub core_count: usize,
    pub timeout: u64,
    pub log_level: String,
}

pub trait Config: DeserializeOwned + Default {
    fn from_section(section: Option<&Value>) -> Self {
        match section {
            Some(value) => value.clone().try_into().expect("cannot deserialize config"),
            None => {
                warn!("config section not found");
                Self::default()
            }
        }
    }
}

impl Config for NetzpConfig {}

impl Default for NetzpConfig {
    fn default() -> Self {
        Self {
            core_count: 4,
            timeout: 200_000,
            log_level: "warn".to_string(),
        }
    }
}
