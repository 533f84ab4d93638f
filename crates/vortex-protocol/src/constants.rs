//! Wire tags of the Vortex upper-layer protocol.
//!
//! Queries use the `VX?` prefix, commands and responses use `VX!`.

// ============================================================================
// Queries (controller → device)
// ============================================================================

/// Query the upper layer firmware version.
pub const QUERY_UPPER_VERSION: &str = "VX?UVER";
/// Query the lower layer firmware version.
pub const QUERY_LOWER_VERSION: &str = "VX?LVER";
/// Query transfer progress and link quality.
pub const QUERY_INFO: &str = "VX?INFO";
/// Query the statistics table.
pub const QUERY_STAT: &str = "VX?STAT";
/// Query the image balance bitmap.
pub const QUERY_IMAGE_BALANCE: &str = "VX?IMBL";

// ============================================================================
// Commands (controller → device)
// ============================================================================

/// Modem identifier.
pub const TAG_ID: &str = "VX!ID";
/// Modem name.
pub const TAG_NAME: &str = "VX!NAME";
/// Operating mode.
pub const TAG_MODE: &str = "VX!MODE";
/// Robustness class.
pub const TAG_ROB: &str = "VX!ROB";
/// Modulation.
pub const TAG_MDL: &str = "VX!MDL";
/// Code rate.
pub const TAG_RATE: &str = "VX!RATE";
/// Block size.
pub const TAG_BLOCK_SIZE: &str = "VX!BLOCKSIZE";
/// Transaction size.
pub const TAG_TRANS_SIZE: &str = "VX!TRANSSIZE";
/// Transmit power level.
pub const TAG_POWER_LEVEL: &str = "VX!POWERLEVEL";
/// Start transmitting the uploaded data.
pub const TAG_START: &str = "VX!START";
/// Stop the transfer.
pub const TAG_STOP: &str = "VX!STOP";
/// Bulk data chunk (variable length).
pub const TAG_DATA: &str = "VX!DATA";

// ============================================================================
// Responses (device → controller)
// ============================================================================

/// Acknowledgment.
pub const TAG_OK: &str = "VX!OK";
/// Upper layer version.
pub const TAG_UPPER_VERSION: &str = "VX!UVER";
/// Lower layer version.
pub const TAG_LOWER_VERSION: &str = "VX!LVER";
/// Progress and link quality.
pub const TAG_INFO: &str = "VX!INFO";
/// Statistics table (variable length).
pub const TAG_STAT: &str = "VX!STAT";
/// Image balance bitmap (variable length).
pub const TAG_IMAGE_BALANCE: &str = "VX!IMBL";

/// Complete acknowledgment frame.
pub const ACK_FRAME: &[u8] = b"VX!OK\n";
