pub mod batch;
pub mod config;
pub mod error;

pub use batch::*;
pub use config::{EngineConfig, load_dotenv};
pub use error::*;
