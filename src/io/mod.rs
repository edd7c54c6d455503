mod imprint;
pub(crate) mod settings;

pub use imprint::{write_footer, write_header};
pub use settings::{Configuration, ModelConfig, ModelKind, ScanConfig};
