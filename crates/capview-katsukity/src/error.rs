use thiserror::Error;

#[derive(Debug, Error)]
pub enum KatsukityError {
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    #[error("capture board not found ({0})")]
    NotFound(String),

    #[error("capture board did not re-enumerate after firmware upload")]
    ReenumerationTimeout,

    #[error("FPGA configuration failed: {0}")]
    Fpga(String),

    #[error("short frame: {len} bytes, expected at least {expected}")]
    ShortFrame { len: usize, expected: usize },

    #[error("bad {what} buffer: {len} bytes, expected {expected}")]
    BadBuffer {
        what: &'static str,
        len: usize,
        expected: usize,
    },
}

pub type Result<T> = std::result::Result<T, KatsukityError>;
