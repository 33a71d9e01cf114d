use thiserror::Error;

use se_crypto::CryptoError;

#[derive(Debug, Error)]
pub enum ChannelError {
    /// Transport-layer failure, propagated as-is. Never retried here.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Bad sync byte, impossible length, malformed secured body. Rejected
    /// before any crypto touches the buffer; channel state unaffected.
    #[error("Framing error: {0}")]
    Framing(String),

    /// Outer or inner frame CRC mismatch. Aborts the exchange only.
    #[error("CRC mismatch")]
    CrcMismatch,

    /// MAC/tag verification failed. Closes the channel.
    #[error("Secure channel integrity failure")]
    Integrity,

    /// A crypto primitive failed. Closes the channel when it happens inside
    /// establishment, secure, or verify.
    #[error("Crypto failure: {0}")]
    Crypto(#[from] CryptoError),

    /// Operation requires an active channel.
    #[error("Secure channel is closed")]
    ChannelClosed,

    /// Caller passed secrets or a challenge that do not fit the mode.
    #[error("Wrong parameter: {0}")]
    WrongParameter(String),
}
