use thiserror::Error;

#[derive(Error, Debug)]
pub enum DnsError {
    #[error("Failed to read system resolver configuration: {0}")]
    SystemConf(String),
}

pub type Result<T> = std::result::Result<T, DnsError>;
