use serde::Serialize;
use utoipa::ToSchema;

use crate::error::FieldError;

/// 错误响应体 `{ "success": false, "error": ApiError }`
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    /// 字段级校验错误，仅 VALIDATION_ERROR 时出现
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
    /// 已被占用的号码，仅 ELEMENT_ALREADY_TAKEN 时出现
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elements: Option<Vec<String>>,
}
