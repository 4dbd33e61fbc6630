//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes.

use jsonrpsee::types::ErrorObjectOwned;
use rankflow_core::error::AppError;

/// RPC Error Codes
pub mod code {
    pub const INVALID_PAYLOAD: i32 = 4000;
    pub const INVALID_SIGNATURE: i32 = 4001;
    pub const NOT_FOUND: i32 = 4004;
    pub const DUPLICATE_SUBJECT: i32 = 4009;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const DB_ERROR: i32 = 5001;
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    let message = err.to_string();
    let code = match err {
        AppError::InvalidPayload(_)
        | AppError::Validation(_)
        | AppError::Domain(_)
        | AppError::Serialization(_) => code::INVALID_PAYLOAD,
        AppError::InvalidSignature => code::INVALID_SIGNATURE,
        AppError::NotFound(_) | AppError::UnknownJob(_) => code::NOT_FOUND,
        AppError::DuplicateSubject(_) | AppError::InvalidState(_) => code::DUPLICATE_SUBJECT,
        AppError::Database(_) => code::DB_ERROR,
        AppError::Config(_) | AppError::Internal(_) => code::INTERNAL_ERROR,
    };
    ErrorObjectOwned::owned(code, message, None::<()>)
}
